//! The ordered correction phases and the gate between them.
//!
//! The navigator only knows which phase is current; completeness is always
//! evaluated against the shared [`MappingState`].

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::mapping::MappingState;
use crate::model::{Entity, PhaseBucket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MappingPhase {
    Individuals,
    Spinners,
    Finalize,
    Review,
}

impl MappingPhase {
    pub const ALL: [MappingPhase; 4] = [
        MappingPhase::Individuals,
        MappingPhase::Spinners,
        MappingPhase::Finalize,
        MappingPhase::Review,
    ];

    pub fn next(self) -> Option<MappingPhase> {
        match self {
            MappingPhase::Individuals => Some(MappingPhase::Spinners),
            MappingPhase::Spinners => Some(MappingPhase::Finalize),
            MappingPhase::Finalize => Some(MappingPhase::Review),
            MappingPhase::Review => None,
        }
    }

    pub fn previous(self) -> Option<MappingPhase> {
        match self {
            MappingPhase::Individuals => None,
            MappingPhase::Spinners => Some(MappingPhase::Individuals),
            MappingPhase::Finalize => Some(MappingPhase::Spinners),
            MappingPhase::Review => Some(MappingPhase::Finalize),
        }
    }

    pub fn config(self) -> &'static PhaseConfig {
        match self {
            MappingPhase::Individuals => &PHASES[0],
            MappingPhase::Spinners => &PHASES[1],
            MappingPhase::Finalize => &PHASES[2],
            MappingPhase::Review => &PHASES[3],
        }
    }
}

impl fmt::Display for MappingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config().label)
    }
}

// ── Static phase table ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseScope {
    Buckets(&'static [PhaseBucket]),
    /// Every source not yet skipped, whatever its bucket.
    NotSkipped,
    Everything,
}

/// Immutable description of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseConfig {
    pub phase: MappingPhase,
    pub order: u8,
    pub label: &'static str,
    pub description: &'static str,
    pub scope: PhaseScope,
}

impl PhaseConfig {
    pub fn in_scope(&self, entity: &Entity, state: &MappingState) -> bool {
        match self.scope {
            PhaseScope::Buckets(buckets) => buckets.contains(&entity.phase_bucket()),
            PhaseScope::NotSkipped => !state.is_skipped(entity.name()),
            PhaseScope::Everything => true,
        }
    }
}

pub static PHASES: [PhaseConfig; 4] = [
    PhaseConfig {
        phase: MappingPhase::Individuals,
        order: 0,
        label: "Individuals",
        description: "Models and groups",
        scope: PhaseScope::Buckets(&[PhaseBucket::Model, PhaseBucket::Group]),
    },
    PhaseConfig {
        phase: MappingPhase::Spinners,
        order: 1,
        label: "Spinners",
        description: "Submodel groups such as spinner arms and rings",
        scope: PhaseScope::Buckets(&[PhaseBucket::Spinner]),
    },
    PhaseConfig {
        phase: MappingPhase::Finalize,
        order: 2,
        label: "Finalize",
        description: "Sweep for anything still unmapped",
        scope: PhaseScope::NotSkipped,
    },
    PhaseConfig {
        phase: MappingPhase::Review,
        order: 3,
        label: "Review",
        description: "Final review before export",
        scope: PhaseScope::Everything,
    },
];

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// The phase still has sources that are neither mapped nor skipped.
    Incomplete {
        phase: MappingPhase,
        remaining: Vec<String>,
    },
    AtFirstPhase,
    AtTerminalPhase,
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseError::Incomplete { phase, remaining } => write!(
                f,
                "{phase} still has {} unresolved item(s)",
                remaining.len()
            ),
            PhaseError::AtFirstPhase => write!(f, "Already at the first phase"),
            PhaseError::AtTerminalPhase => write!(f, "Review is the last phase"),
        }
    }
}

impl std::error::Error for PhaseError {}

// ── Progress ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct PhaseProgress {
    pub phase: MappingPhase,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

// ── Navigator ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseNavigator {
    current: MappingPhase,
}

impl Default for PhaseNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseNavigator {
    pub fn new() -> Self {
        Self {
            current: MappingPhase::Individuals,
        }
    }

    /// Start at a given phase without checking the gates (session restore).
    pub fn at(phase: MappingPhase) -> Self {
        Self { current: phase }
    }

    pub fn current(&self) -> MappingPhase {
        self.current
    }

    /// Sources of `phase` that are neither assigned nor skipped, in layout order.
    pub fn remaining<'a>(phase: MappingPhase, sources: &'a [Entity], state: &MappingState) -> Vec<&'a str> {
        let config = phase.config();
        sources
            .iter()
            .filter(|e| config.in_scope(e, state) && !state.is_resolved(e.name()))
            .map(Entity::name)
            .collect()
    }

    pub fn is_complete(phase: MappingPhase, sources: &[Entity], state: &MappingState) -> bool {
        let config = phase.config();
        sources
            .iter()
            .filter(|e| config.in_scope(e, state))
            .all(|e| state.is_resolved(e.name()))
    }

    pub fn progress(phase: MappingPhase, sources: &[Entity], state: &MappingState) -> PhaseProgress {
        let config = phase.config();
        let (mut completed, mut total) = (0usize, 0usize);
        for entity in sources.iter().filter(|e| config.in_scope(e, state)) {
            total += 1;
            if state.is_resolved(entity.name()) {
                completed += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        PhaseProgress {
            phase,
            completed,
            total,
            percent,
        }
    }

    pub fn all_progress(sources: &[Entity], state: &MappingState) -> Vec<PhaseProgress> {
        MappingPhase::ALL
            .iter()
            .map(|p| Self::progress(*p, sources, state))
            .collect()
    }

    /// Advance one phase, if the current one is complete.
    pub fn go_to_next_phase(&mut self, sources: &[Entity], state: &MappingState) -> Result<MappingPhase, PhaseError> {
        let next = self.current.next().ok_or(PhaseError::AtTerminalPhase)?;
        self.ensure_complete(self.current, sources, state)?;
        tracing::info!(from = %self.current, to = %next, "phase advanced");
        self.current = next;
        Ok(next)
    }

    pub fn go_to_previous_phase(&mut self) -> Result<MappingPhase, PhaseError> {
        let previous = self.current.previous().ok_or(PhaseError::AtFirstPhase)?;
        self.current = previous;
        Ok(previous)
    }

    /// Jump straight to a phase. Backward jumps always succeed; forward jumps
    /// need the current phase and every phase in between to be complete.
    pub fn jump_to(
        &mut self,
        target: MappingPhase,
        sources: &[Entity],
        state: &MappingState,
    ) -> Result<MappingPhase, PhaseError> {
        if target > self.current {
            for phase in MappingPhase::ALL.iter().filter(|p| **p >= self.current && **p < target) {
                self.ensure_complete(*phase, sources, state)?;
            }
        }
        self.current = target;
        Ok(target)
    }

    fn ensure_complete(&self, phase: MappingPhase, sources: &[Entity], state: &MappingState) -> Result<(), PhaseError> {
        let remaining = Self::remaining(phase, sources, state);
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(PhaseError::Incomplete {
                phase,
                remaining: remaining.into_iter().map(ToString::to_string).collect(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::progress::ignore_progress;
    use crate::scoring::ScoreTable;

    fn setup() -> (Vec<Entity>, MappingState) {
        let sources = vec![
            Entity::model("Arch 1", 50),
            Entity::group("Arches GRP", ["Arch 1"]),
            Entity::group("Spinner Arms", ["Spinner/Arm 1", "Spinner/Arm 2"]),
        ];
        let dests = vec![
            Entity::model("Arch 1", 50),
            Entity::group("Arches GRP", ["Arch 1"]),
            Entity::group("Spinner Arms", ["Spinner/Arm 1", "Spinner/Arm 2"]),
        ];
        let table = ScoreTable::build(&sources, &dests, &mut ignore_progress);
        (sources, MappingState::new(Arc::new(table)))
    }

    #[test]
    fn table_is_ordered() {
        for (i, config) in PHASES.iter().enumerate() {
            assert_eq!(usize::from(config.order), i);
            assert_eq!(config.phase.config(), config);
            assert_eq!(MappingPhase::ALL[i], config.phase);
        }
    }

    #[test]
    fn next_is_gated_on_individuals() {
        let (sources, mut state) = setup();
        let mut nav = PhaseNavigator::new();

        let err = nav.go_to_next_phase(&sources, &state).unwrap_err();
        assert_eq!(
            err,
            PhaseError::Incomplete {
                phase: MappingPhase::Individuals,
                remaining: vec!["Arch 1".into(), "Arches GRP".into()],
            }
        );

        state.assign("Arch 1", "Arch 1");
        assert!(nav.go_to_next_phase(&sources, &state).is_err());
        state.skip("Arches GRP");
        // The spinner is still unmapped but belongs to the next phase.
        assert_eq!(nav.go_to_next_phase(&sources, &state), Ok(MappingPhase::Spinners));
    }

    #[test]
    fn finalize_sweeps_everything_not_skipped() {
        let (sources, mut state) = setup();
        state.skip("Arch 1");
        let remaining = PhaseNavigator::remaining(MappingPhase::Finalize, &sources, &state);
        assert_eq!(remaining, vec!["Arches GRP", "Spinner Arms"]);
    }

    #[test]
    fn previous_refused_only_at_start() {
        let mut nav = PhaseNavigator::new();
        assert_eq!(nav.go_to_previous_phase(), Err(PhaseError::AtFirstPhase));
        let mut nav = PhaseNavigator::at(MappingPhase::Review);
        assert_eq!(nav.go_to_previous_phase(), Ok(MappingPhase::Finalize));
    }

    #[test]
    fn review_is_terminal() {
        let (sources, state) = setup();
        let mut nav = PhaseNavigator::at(MappingPhase::Review);
        assert_eq!(nav.go_to_next_phase(&sources, &state), Err(PhaseError::AtTerminalPhase));
    }

    #[test]
    fn jump_forward_checks_intermediate_phases() {
        let (sources, mut state) = setup();
        let mut nav = PhaseNavigator::new();
        state.assign("Arch 1", "Arch 1");
        state.assign("Arches GRP", "Arches GRP");
        let err = nav.jump_to(MappingPhase::Review, &sources, &state).unwrap_err();
        assert!(matches!(err, PhaseError::Incomplete { phase: MappingPhase::Spinners, .. }));
        state.assign("Spinner Arms", "Spinner Arms");
        assert_eq!(nav.jump_to(MappingPhase::Review, &sources, &state), Ok(MappingPhase::Review));
        assert_eq!(nav.jump_to(MappingPhase::Individuals, &sources, &state), Ok(MappingPhase::Individuals));
    }

    #[test]
    fn progress_counts_in_scope_sources() {
        let (sources, mut state) = setup();
        state.assign("Arch 1", "Arch 1");
        let p = PhaseNavigator::progress(MappingPhase::Individuals, &sources, &state);
        assert_eq!((p.completed, p.total), (1, 2));
        assert!((p.percent - 50.0).abs() < 1e-9);
        let spinners = PhaseNavigator::progress(MappingPhase::Spinners, &sources, &state);
        assert_eq!(spinners.total, 1);
    }
}
