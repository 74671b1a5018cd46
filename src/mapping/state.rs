use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use ts_rs::TS;

use crate::model::{AssignMethod, Assignment, SacrificeInfo};
use crate::scoring::{ScoreMatrix, ScoreTable};
use crate::solver;

/// Score differences at or below this are ties, not sacrifices.
const SACRIFICE_EPSILON: f64 = 1e-9;

// ── Events ──────────────────────────────────────────────────────────

/// What a command did. Every mutation returns one; the host decides how to
/// surface it.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum MappingEvent {
    Assigned {
        source: String,
        dest: String,
        method: AssignMethod,
        /// The destination `source` held before, if any.
        previous_dest: Option<String>,
        /// The source that held `dest` before and lost it.
        evicted_source: Option<String>,
        /// True when the assignment cleared a skip on `source`.
        unskipped: bool,
    },
    Unassigned {
        source: String,
        dest: String,
    },
    Skipped {
        source: String,
        released_dest: Option<String>,
    },
    Unskipped {
        source: String,
    },
    Swapped {
        source_a: String,
        source_b: String,
        /// Destination `source_a` holds after the swap.
        dest_a: Option<String>,
        dest_b: Option<String>,
    },
    Rematched {
        assigned: usize,
    },
    Batch {
        description: String,
        events: Vec<MappingEvent>,
    },
    NoOp {
        reason: String,
    },
}

impl MappingEvent {
    fn noop(reason: impl Into<String>) -> Self {
        MappingEvent::NoOp {
            reason: reason.into(),
        }
    }

    /// True when the command left the state untouched.
    pub fn is_noop(&self) -> bool {
        match self {
            MappingEvent::NoOp { .. } => true,
            MappingEvent::Batch { events, .. } => events.iter().all(MappingEvent::is_noop),
            _ => false,
        }
    }
}

// ── MappingState ────────────────────────────────────────────────────

/// The single owned record of a mapping session: active assignments, skipped
/// and manually overridden sources, and the derived sacrifice list.
///
/// Each source and each destination appears in at most one assignment.
/// Skipped sources never hold an assignment. Every effective mutation bumps
/// [`MappingState::version`] and recomputes sacrifices.
#[derive(Debug, Clone)]
pub struct MappingState {
    scores: Arc<ScoreTable>,
    assignments: IndexMap<String, Assignment>,
    dest_holders: HashMap<String, String>,
    skipped: IndexSet<String>,
    overridden: IndexSet<String>,
    sacrifices: Vec<SacrificeInfo>,
    /// Best matches scoring below this are not worth reporting as sacrificed.
    sacrifice_floor: f64,
    version: u64,
}

impl MappingState {
    /// An empty state over the given score table.
    pub fn new(scores: Arc<ScoreTable>) -> Self {
        Self {
            scores,
            assignments: IndexMap::new(),
            dest_holders: HashMap::new(),
            skipped: IndexSet::new(),
            overridden: IndexSet::new(),
            sacrifices: Vec::new(),
            sacrifice_floor: 0.0,
            version: 0,
        }
    }

    /// Seed from the solver: every optimal pair scoring at or above
    /// `auto_accept` becomes an automatic assignment.
    pub fn seed(scores: Arc<ScoreTable>, auto_accept: f64) -> Self {
        let mut state = Self::new(scores);
        state.sacrifice_floor = auto_accept;
        let pairs = solver::solve(state.scores.matrix());
        let mut accepted = 0usize;
        for (row, col) in &pairs {
            let score = state.scores.matrix().get(*row, *col);
            if score < auto_accept {
                continue;
            }
            let (Some(source), Some(dest)) = (state.scores.source_name(*row), state.scores.dest_name(*col)) else {
                continue;
            };
            let (source, dest) = (source.to_string(), dest.to_string());
            state.insert(source, dest, score, AssignMethod::Auto);
            accepted += 1;
        }
        state.refresh_sacrifices();
        tracing::info!(
            solved = pairs.len(),
            accepted,
            threshold = auto_accept,
            "seeded mapping from solver"
        );
        state
    }

    /// Rebuild a state from stored lists. Names unknown to the score table are
    /// dropped; a skip wins over an assignment of the same source; the first
    /// assignment claiming a destination keeps it.
    pub fn restore(
        scores: Arc<ScoreTable>,
        assignments: &[Assignment],
        skipped: &[String],
        overridden: &[String],
        auto_accept: f64,
    ) -> Self {
        let mut state = Self::new(scores);
        state.sacrifice_floor = auto_accept;
        for source in skipped {
            if state.scores.has_source(source) {
                state.skipped.insert(source.clone());
            }
        }
        for source in overridden {
            if state.scores.has_source(source) {
                state.overridden.insert(source.clone());
            }
        }
        for a in assignments {
            let known = state.scores.has_source(&a.source) && state.scores.has_dest(&a.dest);
            if !known
                || state.skipped.contains(&a.source)
                || state.assignments.contains_key(&a.source)
                || state.dest_holders.contains_key(&a.dest)
            {
                continue;
            }
            let score = state.scores.score(&a.source, &a.dest);
            state.insert(a.source.clone(), a.dest.clone(), score, a.method);
        }
        state.refresh_sacrifices();
        state
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    /// Monotonic counter bumped by every effective mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.values()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn assignment_for(&self, source: &str) -> Option<&Assignment> {
        self.assignments.get(source)
    }

    pub fn dest_of(&self, source: &str) -> Option<&str> {
        self.assignments.get(source).map(|a| a.dest.as_str())
    }

    pub fn source_for_dest(&self, dest: &str) -> Option<&str> {
        self.dest_holders.get(dest).map(String::as_str)
    }

    pub fn is_dest_taken(&self, dest: &str) -> bool {
        self.dest_holders.contains_key(dest)
    }

    pub fn is_assigned(&self, source: &str) -> bool {
        self.assignments.contains_key(source)
    }

    pub fn is_skipped(&self, source: &str) -> bool {
        self.skipped.contains(source)
    }

    pub fn is_overridden(&self, source: &str) -> bool {
        self.overridden.contains(source)
    }

    /// Assigned or skipped.
    pub fn is_resolved(&self, source: &str) -> bool {
        self.is_assigned(source) || self.is_skipped(source)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.skipped.iter().map(String::as_str)
    }

    pub fn overridden(&self) -> impl Iterator<Item = &str> {
        self.overridden.iter().map(String::as_str)
    }

    pub fn sacrifices(&self) -> &[SacrificeInfo] {
        &self.sacrifices
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Manually map `source` to `dest`, evicting whichever source held `dest`.
    pub fn assign(&mut self, source: &str, dest: &str) -> MappingEvent {
        self.assign_with(source, dest, AssignMethod::Manual)
    }

    pub(crate) fn assign_with(&mut self, source: &str, dest: &str, method: AssignMethod) -> MappingEvent {
        if !self.scores.has_source(source) {
            return MappingEvent::noop(format!("unknown source '{source}'"));
        }
        if !self.scores.has_dest(dest) {
            return MappingEvent::noop(format!("unknown destination '{dest}'"));
        }
        if self.dest_of(source) == Some(dest) && self.is_overridden(source) {
            return MappingEvent::noop(format!("'{source}' is already mapped to '{dest}'"));
        }

        let previous_dest = self.remove_assignment(source).map(|a| a.dest);
        let evicted_source = self.dest_holders.get(dest).cloned();
        if let Some(holder) = &evicted_source {
            self.remove_assignment(holder);
        }
        let unskipped = self.skipped.shift_remove(source);
        let score = self.scores.score(source, dest);
        self.insert(source.to_string(), dest.to_string(), score, method);
        self.overridden.insert(source.to_string());
        self.touch();

        MappingEvent::Assigned {
            source: source.to_string(),
            dest: dest.to_string(),
            method,
            previous_dest,
            evicted_source,
            unskipped,
        }
    }

    pub fn unassign(&mut self, source: &str) -> MappingEvent {
        let Some(removed) = self.remove_assignment(source) else {
            return MappingEvent::noop(format!("'{source}' is not mapped"));
        };
        self.overridden.insert(source.to_string());
        self.touch();
        MappingEvent::Unassigned {
            source: removed.source,
            dest: removed.dest,
        }
    }

    /// Mark a source as intentionally unmapped, releasing its destination.
    pub fn skip(&mut self, source: &str) -> MappingEvent {
        if !self.scores.has_source(source) {
            return MappingEvent::noop(format!("unknown source '{source}'"));
        }
        if self.is_skipped(source) {
            return MappingEvent::noop(format!("'{source}' is already skipped"));
        }
        let released_dest = self.remove_assignment(source).map(|a| a.dest);
        self.skipped.insert(source.to_string());
        self.overridden.insert(source.to_string());
        self.touch();
        MappingEvent::Skipped {
            source: source.to_string(),
            released_dest,
        }
    }

    pub fn unskip(&mut self, source: &str) -> MappingEvent {
        if !self.skipped.shift_remove(source) {
            return MappingEvent::noop(format!("'{source}' is not skipped"));
        }
        self.touch();
        MappingEvent::Unskipped {
            source: source.to_string(),
        }
    }

    /// Exchange the destinations of two sources. Either side may be unmapped,
    /// in which case the other side's destination simply moves over.
    pub fn swap(&mut self, source_a: &str, source_b: &str) -> MappingEvent {
        if source_a == source_b {
            return MappingEvent::noop("cannot swap a source with itself");
        }
        for source in [source_a, source_b] {
            if !self.scores.has_source(source) {
                return MappingEvent::noop(format!("unknown source '{source}'"));
            }
        }
        let dest_a = self.remove_assignment(source_a);
        let dest_b = self.remove_assignment(source_b);
        if dest_a.is_none() && dest_b.is_none() {
            return MappingEvent::noop("neither source is mapped");
        }

        let new_a = dest_b.map(|a| a.dest);
        let new_b = dest_a.map(|a| a.dest);
        for (source, dest) in [(source_a, &new_a), (source_b, &new_b)] {
            if let Some(dest) = dest {
                self.skipped.shift_remove(source);
                let score = self.scores.score(source, dest);
                self.insert(source.to_string(), dest.clone(), score, AssignMethod::Manual);
            }
            self.overridden.insert(source.to_string());
        }
        self.touch();

        MappingEvent::Swapped {
            source_a: source_a.to_string(),
            source_b: source_b.to_string(),
            dest_a: new_a,
            dest_b: new_b,
        }
    }

    /// Re-run the solver for sources the user has not touched, against
    /// destinations not held by a touched source.
    pub fn rematch(&mut self, auto_accept: f64) -> MappingEvent {
        let free_sources: Vec<usize> = self
            .scores
            .source_names()
            .enumerate()
            .filter(|(_, name)| !self.is_overridden(name) && !self.is_skipped(name))
            .map(|(i, _)| i)
            .collect();

        let stale: Vec<String> = free_sources
            .iter()
            .filter_map(|&i| self.scores.source_name(i))
            .filter(|name| self.is_assigned(name))
            .map(ToString::to_string)
            .collect();
        let mut before: Vec<(String, String)> = stale
            .iter()
            .filter_map(|source| self.remove_assignment(source))
            .map(|a| (a.source, a.dest))
            .collect();

        let open_dests: Vec<usize> = self
            .scores
            .dest_names()
            .enumerate()
            .filter(|(_, name)| !self.is_dest_taken(name))
            .map(|(j, _)| j)
            .collect();

        let full = self.scores.matrix();
        let mut sub = ScoreMatrix::new(free_sources.len(), open_dests.len());
        for (r, &row) in free_sources.iter().enumerate() {
            for (c, &col) in open_dests.iter().enumerate() {
                sub.set(r, c, full.get(row, col));
            }
        }

        let mut after: Vec<(String, String)> = Vec::new();
        for (r, c) in solver::solve(&sub) {
            let score = sub.get(r, c);
            if score < auto_accept {
                continue;
            }
            let source = free_sources.get(r).and_then(|&i| self.scores.source_name(i));
            let dest = open_dests.get(c).and_then(|&j| self.scores.dest_name(j));
            if let (Some(source), Some(dest)) = (source, dest) {
                let (source, dest) = (source.to_string(), dest.to_string());
                after.push((source.clone(), dest.clone()));
                self.insert(source, dest, score, AssignMethod::Auto);
            }
        }

        before.sort();
        after.sort();
        if before == after {
            // Same pairs went back in; only the insertion order moved.
            return MappingEvent::noop("nothing to rematch");
        }
        let assigned = after.len();
        self.touch();
        tracing::debug!(assigned, "rematched untouched sources");
        MappingEvent::Rematched { assigned }
    }

    /// Replace this state's contents with `other`, keeping the version counter
    /// moving forward.
    pub(crate) fn replace_with(&mut self, other: MappingState) {
        let next = self.version.max(other.version) + 1;
        *self = other;
        self.version = next;
    }

    // ── Internals ───────────────────────────────────────────────────

    fn insert(&mut self, source: String, dest: String, score: f64, method: AssignMethod) {
        self.dest_holders.insert(dest.clone(), source.clone());
        self.assignments.insert(
            source.clone(),
            Assignment {
                source,
                dest,
                score,
                method,
            },
        );
    }

    fn remove_assignment(&mut self, source: &str) -> Option<Assignment> {
        let removed = self.assignments.shift_remove(source)?;
        self.dest_holders.remove(&removed.dest);
        Some(removed)
    }

    fn touch(&mut self) {
        self.version += 1;
        self.refresh_sacrifices();
    }

    /// A source is sacrificed when its best-scoring destination would have
    /// been auto-accepted but is held by another source, and it ended up with
    /// something worse (or nothing).
    fn refresh_sacrifices(&mut self) {
        let mut sacrifices = Vec::new();
        for source in self.scores.source_names() {
            if self.is_skipped(source) {
                continue;
            }
            let Some((best, best_score)) = self.scores.best_dest(source) else {
                continue;
            };
            if best_score < self.sacrifice_floor {
                continue;
            }
            let Some(holder) = self.dest_holders.get(best) else {
                continue;
            };
            if holder == source {
                continue;
            }
            let current = self.assignments.get(source);
            let assigned_score = current.map_or(0.0, |a| a.score);
            if best_score - assigned_score <= SACRIFICE_EPSILON {
                continue;
            }
            sacrifices.push(SacrificeInfo {
                source: source.to_string(),
                assigned_to: current.map(|a| a.dest.clone()),
                assigned_score,
                best_match: best.to_string(),
                best_score,
                best_went_to: holder.clone(),
                score_difference: best_score - assigned_score,
            });
        }
        self.sacrifices = sacrifices;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::Entity;
    use crate::progress::ignore_progress;

    fn table() -> Arc<ScoreTable> {
        let sources = vec![
            Entity::model("Arch 1", 50),
            Entity::model("Arch 2", 50),
            Entity::model("Mega Tree", 1600),
            Entity::model("Snowman", 80),
        ];
        let dests = vec![
            Entity::model("Arch 1", 50),
            Entity::model("Arch 2", 50),
            Entity::model("Mega Tree", 1600),
            Entity::model("Star", 40),
        ];
        Arc::new(ScoreTable::build(&sources, &dests, &mut ignore_progress))
    }

    fn assert_one_to_one(state: &MappingState) {
        let mut dests: Vec<&str> = state.assignments().map(|a| a.dest.as_str()).collect();
        let total = dests.len();
        dests.sort_unstable();
        dests.dedup();
        assert_eq!(dests.len(), total, "destination used twice");
        for a in state.assignments() {
            assert!(!state.is_skipped(&a.source));
            assert_eq!(state.source_for_dest(&a.dest), Some(a.source.as_str()));
        }
    }

    #[test]
    fn seed_accepts_only_strong_pairs() {
        let state = MappingState::seed(table(), 0.70);
        assert_eq!(state.dest_of("Arch 1"), Some("Arch 1"));
        assert_eq!(state.dest_of("Mega Tree"), Some("Mega Tree"));
        assert!(!state.is_assigned("Snowman"));
        assert!(state.assignments().all(|a| a.method == AssignMethod::Auto));
        assert!(state.overridden().next().is_none());
        assert_one_to_one(&state);
    }

    #[test]
    fn seed_reports_source_that_lost_its_best_match_to_the_solver() {
        let scores = ScoreTable::from_scores(
            &["Arch Left", "Arch Right"],
            &["Arch A", "Arch B"],
            &[vec![0.92, 0.89], vec![0.91, 0.60]],
        );
        let state = MappingState::seed(Arc::new(scores), 0.70);
        // 0.89 + 0.91 beats 0.92 + 0.60.
        assert_eq!(state.dest_of("Arch Left"), Some("Arch B"));
        assert_eq!(state.dest_of("Arch Right"), Some("Arch A"));

        let sacrifices = state.sacrifices();
        assert_eq!(sacrifices.len(), 1);
        let lost = &sacrifices[0];
        assert_eq!(lost.source, "Arch Left");
        assert_eq!(lost.best_match, "Arch A");
        assert_eq!(lost.best_went_to, "Arch Right");
        assert_eq!(lost.assigned_to.as_deref(), Some("Arch B"));
        assert!((lost.score_difference - 0.03).abs() < 1e-9);
    }

    #[test]
    fn assign_evicts_previous_holder() {
        let mut state = MappingState::seed(table(), 0.70);
        let event = state.assign("Snowman", "Arch 1");
        match event {
            MappingEvent::Assigned {
                evicted_source,
                previous_dest,
                method,
                ..
            } => {
                assert_eq!(evicted_source.as_deref(), Some("Arch 1"));
                assert_eq!(previous_dest, None);
                assert_eq!(method, AssignMethod::Manual);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!state.is_assigned("Arch 1"));
        assert!(state.is_overridden("Snowman"));
        assert_one_to_one(&state);
    }

    #[test]
    fn unknown_names_are_noops() {
        let mut state = MappingState::seed(table(), 0.70);
        let before = state.version();
        assert!(state.assign("Nope", "Arch 1").is_noop());
        assert!(state.assign("Arch 1", "Nope").is_noop());
        assert!(state.unassign("Nope").is_noop());
        assert!(state.skip("Nope").is_noop());
        assert!(state.unskip("Nope").is_noop());
        assert!(state.swap("Nope", "Arch 1").is_noop());
        assert_eq!(state.version(), before);
    }

    #[test]
    fn skip_clears_assignment_and_assign_clears_skip() {
        let mut state = MappingState::seed(table(), 0.70);
        let event = state.skip("Arch 1");
        assert_eq!(
            event,
            MappingEvent::Skipped {
                source: "Arch 1".into(),
                released_dest: Some("Arch 1".into())
            }
        );
        assert!(!state.is_assigned("Arch 1"));
        assert!(state.is_resolved("Arch 1"));

        let event = state.assign("Arch 1", "Star");
        assert!(matches!(event, MappingEvent::Assigned { unskipped: true, .. }));
        assert!(!state.is_skipped("Arch 1"));
        assert_one_to_one(&state);
    }

    #[test]
    fn unskip_only_when_skipped() {
        let mut state = MappingState::seed(table(), 0.70);
        assert!(state.unskip("Snowman").is_noop());
        state.skip("Snowman");
        assert_eq!(
            state.unskip("Snowman"),
            MappingEvent::Unskipped {
                source: "Snowman".into()
            }
        );
        assert!(!state.is_resolved("Snowman"));
    }

    #[test]
    fn swap_exchanges_destinations() {
        let mut state = MappingState::seed(table(), 0.70);
        state.swap("Arch 1", "Arch 2");
        assert_eq!(state.dest_of("Arch 1"), Some("Arch 2"));
        assert_eq!(state.dest_of("Arch 2"), Some("Arch 1"));
        assert!(state.is_overridden("Arch 1") && state.is_overridden("Arch 2"));
        assert_one_to_one(&state);
    }

    #[test]
    fn swap_with_unmapped_moves_destination() {
        let mut state = MappingState::seed(table(), 0.70);
        state.swap("Snowman", "Arch 1");
        assert_eq!(state.dest_of("Snowman"), Some("Arch 1"));
        assert!(!state.is_assigned("Arch 1"));
        assert_one_to_one(&state);
    }

    #[test]
    fn sacrifice_reported_when_best_dest_is_taken() {
        let mut state = MappingState::seed(table(), 0.70);
        assert!(state.sacrifices().is_empty());
        state.assign("Snowman", "Mega Tree");
        let sacrifice = state
            .sacrifices()
            .iter()
            .find(|s| s.source == "Mega Tree")
            .expect("mega tree lost its best match");
        assert_eq!(sacrifice.best_match, "Mega Tree");
        assert_eq!(sacrifice.best_went_to, "Snowman");
        assert_eq!(sacrifice.assigned_to, None);
        assert!(sacrifice.score_difference > 0.9);
    }

    #[test]
    fn weak_best_matches_are_not_sacrifices() {
        let state = MappingState::seed(table(), 0.70);
        // Snowman's best option is a weak match on an arch; not reported.
        assert!(state.sacrifices().iter().all(|s| s.source != "Snowman"));
    }

    #[test]
    fn rematch_respects_overrides() {
        let mut state = MappingState::seed(table(), 0.70);
        state.unassign("Arch 1");
        // Arch 1 is now overridden and stays unmapped; nothing else changed.
        assert!(state.rematch(0.70).is_noop());
        assert!(!state.is_assigned("Arch 1"));
    }

    #[test]
    fn rematch_refills_untouched_sources() {
        let scores = table();
        let mut state = MappingState::new(Arc::clone(&scores));
        let event = state.rematch(0.70);
        assert!(matches!(event, MappingEvent::Rematched { assigned } if assigned >= 3));
        assert_eq!(state.dest_of("Arch 2"), Some("Arch 2"));
    }

    #[test]
    fn restore_drops_unknown_and_conflicting_entries() {
        let scores = table();
        let assignments = vec![
            Assignment {
                source: "Arch 1".into(),
                dest: "Arch 1".into(),
                score: 0.0,
                method: AssignMethod::Manual,
            },
            Assignment {
                source: "Arch 2".into(),
                dest: "Arch 1".into(),
                score: 0.0,
                method: AssignMethod::Manual,
            },
            Assignment {
                source: "Ghost".into(),
                dest: "Star".into(),
                score: 0.0,
                method: AssignMethod::Manual,
            },
            Assignment {
                source: "Snowman".into(),
                dest: "Star".into(),
                score: 0.0,
                method: AssignMethod::Manual,
            },
        ];
        let state = MappingState::restore(
            scores,
            &assignments,
            &["Snowman".into()],
            &["Arch 1".into()],
            0.70,
        );
        assert_eq!(state.dest_of("Arch 1"), Some("Arch 1"));
        assert!(!state.is_assigned("Arch 2"));
        assert!(!state.is_assigned("Snowman"));
        assert!(state.is_skipped("Snowman"));
        assert!(state.assignment_for("Arch 1").unwrap().score > 0.9);
        assert_one_to_one(&state);
    }

    #[test]
    fn replace_with_keeps_version_moving() {
        let mut state = MappingState::seed(table(), 0.70);
        let snapshot = state.clone();
        state.skip("Snowman");
        let after_skip = state.version();
        state.replace_with(snapshot);
        assert!(state.version() > after_skip);
        assert!(!state.is_skipped("Snowman"));
    }
}
