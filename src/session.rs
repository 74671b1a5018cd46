//! One mapping session: a sequence's layout mapped onto the user's layout,
//! with undo, phases, bulk suggestions and coverage tracked together.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;
use serde::Serialize;
use ts_rs::TS;

use crate::bulk::{BulkInference, BulkSuggestion};
use crate::coverage::{CoverageGain, CoverageReport, CoverageSnapshot, CoverageTracker};
use crate::error::AppError;
use crate::events::{self, Emitter, PhaseChange};
use crate::export::{build_export, MappingExport};
use crate::mapping::{CommandDispatcher, MappingCommand, MappingEvent, MappingState, UndoState};
use crate::model::{Entity, SacrificeInfo};
use crate::phase::{MappingPhase, PhaseNavigator, PhaseProgress};
use crate::progress::{ignore_progress, ProgressEvent, ProgressFn};
use crate::scoring::{self, Confidence, ScoreBreakdown, ScoreTable};
use crate::settings::MapperSettings;
use crate::snapshot::{SessionSnapshot, SNAPSHOT_VERSION};

/// A ranked destination for one source.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct MatchSuggestion {
    pub dest: String,
    pub score: f64,
    pub confidence: Confidence,
    pub is_strong: bool,
    /// Another source currently holding this destination.
    pub taken_by: Option<String>,
}

/// Everything a host needs to refresh after a command.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct CommandReport {
    pub event: MappingEvent,
    pub coverage: CoverageSnapshot,
    pub bulk_suggestion: Option<BulkSuggestion>,
    pub undo: UndoState,
}

pub struct MappingSession {
    label: String,
    sources: Vec<Entity>,
    dests: Vec<Entity>,
    settings: MapperSettings,
    state: MappingState,
    dispatcher: CommandDispatcher,
    navigator: PhaseNavigator,
    bulk: BulkInference,
    coverage: CoverageTracker,
    emitter: Option<Emitter>,
}

fn unique_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut seen = IndexSet::with_capacity(entities.len());
    entities
        .into_iter()
        .filter(|e| seen.insert(e.name().to_string()))
        .collect()
}

impl MappingSession {
    pub fn new(label: impl Into<String>, sources: Vec<Entity>, dests: Vec<Entity>, settings: MapperSettings) -> Self {
        Self::new_with_progress(label, sources, dests, settings, &mut ignore_progress)
    }

    /// Score, solve and seed a fresh session. Coverage right after seeding is
    /// the baseline that gains are reported against.
    pub fn new_with_progress(
        label: impl Into<String>,
        sources: Vec<Entity>,
        dests: Vec<Entity>,
        settings: MapperSettings,
        on_progress: ProgressFn<'_>,
    ) -> Self {
        let label = label.into();
        let sources = unique_entities(sources);
        let dests = unique_entities(dests);
        let table = Arc::new(ScoreTable::build(&sources, &dests, on_progress));
        let state = MappingState::seed(table, settings.auto_accept_threshold);

        let mut session = Self {
            label,
            sources,
            dests,
            settings,
            state,
            dispatcher: CommandDispatcher::new(),
            navigator: PhaseNavigator::new(),
            bulk: BulkInference::new(),
            coverage: CoverageTracker::new(),
            emitter: None,
        };
        let baseline = session.coverage_snapshot();
        session.coverage.set_baseline(baseline);
        session.coverage.mark_phase_entry(MappingPhase::Individuals, baseline);
        tracing::info!(
            label = %session.label,
            sources = session.sources.len(),
            dests = session.dests.len(),
            assigned = session.state.assignment_count(),
            display_percent = baseline.display_percent(),
            "mapping session ready"
        );
        session
    }

    /// Rebuild a session from a saved snapshot. Names the current layouts no
    /// longer contain are dropped; the baseline is the restored coverage.
    pub fn from_snapshot(
        sources: Vec<Entity>,
        dests: Vec<Entity>,
        settings: MapperSettings,
        snapshot: &SessionSnapshot,
    ) -> Self {
        let sources = unique_entities(sources);
        let dests = unique_entities(dests);
        let table = Arc::new(ScoreTable::build(&sources, &dests, &mut ignore_progress));
        let state = MappingState::restore(
            table,
            &snapshot.assignments,
            &snapshot.skipped,
            &snapshot.overrides,
            settings.auto_accept_threshold,
        );
        let mut bulk = BulkInference::new();
        bulk.restore_dismissed(snapshot.dismissed_families.iter().cloned());

        let mut session = Self {
            label: snapshot.sequence_label.clone(),
            sources,
            dests,
            settings,
            state,
            dispatcher: CommandDispatcher::new(),
            navigator: PhaseNavigator::at(snapshot.phase),
            bulk,
            coverage: CoverageTracker::new(),
            emitter: None,
        };
        let baseline = session.coverage_snapshot();
        session.coverage.set_baseline(baseline);
        session.coverage.mark_phase_entry(snapshot.phase, baseline);
        tracing::info!(
            label = %session.label,
            phase = %snapshot.phase,
            restored = session.state.assignment_count(),
            saved = snapshot.assignments.len(),
            "mapping session restored"
        );
        session
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sources(&self) -> &[Entity] {
        &self.sources
    }

    pub fn dests(&self) -> &[Entity] {
        &self.dests
    }

    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    /// Route command, undo and phase updates to a host. Replaces any
    /// previous emitter.
    pub fn set_emitter(&mut self, emitter: Emitter) {
        self.emitter = Some(emitter);
    }

    /// New thresholds apply to later rematches and suggestions. Existing
    /// assignments are kept.
    pub fn set_settings(&mut self, settings: MapperSettings) {
        self.settings = settings;
    }

    pub fn state(&self) -> &MappingState {
        &self.state
    }

    pub fn phase(&self) -> MappingPhase {
        self.navigator.current()
    }

    pub fn undo_state(&self) -> UndoState {
        self.dispatcher.undo_state()
    }

    pub fn pending_bulk(&self) -> Option<&BulkSuggestion> {
        self.bulk.pending()
    }

    pub fn sacrifices(&self) -> &[SacrificeInfo] {
        self.state.sacrifices()
    }

    pub fn source(&self, name: &str) -> Option<&Entity> {
        self.sources.iter().find(|e| e.name() == name)
    }

    pub fn dest(&self, name: &str) -> Option<&Entity> {
        self.dests.iter().find(|e| e.name() == name)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Run a command through the undo dispatcher. A manual assignment may
    /// raise a bulk suggestion; any other effective command drops a stale one.
    pub fn execute(&mut self, cmd: MappingCommand) -> CommandReport {
        let event = self.dispatcher.execute(&mut self.state, &cmd);
        if !event.is_noop() {
            match cmd.manual_assignment() {
                Some((source, dest)) => {
                    let config = self.navigator.current().config();
                    let (sources, state) = (&self.sources, &self.state);
                    let in_phase: HashSet<&str> = sources
                        .iter()
                        .filter(|e| config.in_scope(e, state))
                        .map(Entity::name)
                        .collect();
                    self.bulk.observe(state, source, dest, |name| in_phase.contains(name));
                }
                None => self.bulk.clear_pending(),
            }
        }
        self.report(event)
    }

    pub fn assign(&mut self, source: &str, dest: &str) -> CommandReport {
        self.execute(MappingCommand::Assign {
            source: source.to_string(),
            dest: dest.to_string(),
        })
    }

    pub fn unassign(&mut self, source: &str) -> CommandReport {
        self.execute(MappingCommand::Unassign {
            source: source.to_string(),
        })
    }

    pub fn skip(&mut self, source: &str) -> CommandReport {
        self.execute(MappingCommand::Skip {
            source: source.to_string(),
        })
    }

    pub fn unskip(&mut self, source: &str) -> CommandReport {
        self.execute(MappingCommand::Unskip {
            source: source.to_string(),
        })
    }

    pub fn swap(&mut self, source_a: &str, source_b: &str) -> CommandReport {
        self.execute(MappingCommand::Swap {
            source_a: source_a.to_string(),
            source_b: source_b.to_string(),
        })
    }

    /// Re-run the solver for untouched sources at the current threshold.
    pub fn rematch(&mut self) -> CommandReport {
        self.execute(MappingCommand::Rematch {
            auto_accept: self.settings.auto_accept_threshold,
        })
    }

    /// Apply the pending bulk suggestion as one undoable step.
    pub fn accept_bulk(&mut self) -> Result<CommandReport, AppError> {
        let suggestion = self.bulk.take_pending().ok_or_else(|| AppError::NotFound {
            what: "Bulk suggestion".into(),
        })?;
        tracing::info!(
            source_family = %suggestion.source_family,
            dest_family = %suggestion.dest_family,
            pairs = suggestion.pairs.len(),
            "bulk suggestion accepted"
        );
        Ok(self.execute(MappingCommand::AcceptBulk {
            source_family: suggestion.source_family,
            dest_family: suggestion.dest_family,
            pairs: suggestion.pairs,
        }))
    }

    /// Dismiss the pending bulk suggestion; its family pair is not offered
    /// again this session. Returns false when nothing was pending.
    pub fn dismiss_bulk(&mut self) -> bool {
        self.bulk.dismiss()
    }

    pub fn undo(&mut self) -> Result<String, AppError> {
        let description = self.dispatcher.undo(&mut self.state)?;
        self.bulk.clear_pending();
        self.publish_history("undone", &description);
        Ok(description)
    }

    pub fn redo(&mut self) -> Result<String, AppError> {
        let description = self.dispatcher.redo(&mut self.state)?;
        self.bulk.clear_pending();
        self.publish_history("redone", &description);
        Ok(description)
    }

    fn report(&mut self, event: MappingEvent) -> CommandReport {
        let report = CommandReport {
            event,
            coverage: self.coverage_snapshot(),
            bulk_suggestion: self.bulk.pending().cloned(),
            undo: self.dispatcher.undo_state(),
        };
        if let Some(emit) = self.emitter.as_mut() {
            for channel in events::channels_for(&report) {
                if let Some(payload) = events::payload_for(&report, channel) {
                    emit(channel, payload);
                }
            }
        }
        report
    }

    fn publish_history(&mut self, key: &str, description: &str) {
        if self.emitter.is_none() {
            return;
        }
        let coverage = self.coverage_snapshot();
        let undo = self.dispatcher.undo_state();
        self.emit(events::MAPPING_CHANGED, &serde_json::json!({ key: description }));
        self.emit(events::COVERAGE_UPDATED, &coverage);
        self.emit(events::UNDO_STATE_CHANGED, &undo);
    }

    fn emit<T: Serialize>(&mut self, channel: &'static str, payload: &T) {
        let Some(emit) = self.emitter.as_mut() else {
            return;
        };
        match serde_json::to_value(payload) {
            Ok(value) => emit(channel, value),
            Err(e) => tracing::warn!(channel, error = %e, "event payload not serializable"),
        }
    }

    // ── Phases ──────────────────────────────────────────────────────

    pub fn go_to_next_phase(&mut self) -> Result<MappingPhase, AppError> {
        let phase = self.navigator.go_to_next_phase(&self.sources, &self.state)?;
        self.entered(phase);
        Ok(phase)
    }

    pub fn go_to_previous_phase(&mut self) -> Result<MappingPhase, AppError> {
        let phase = self.navigator.go_to_previous_phase()?;
        self.entered(phase);
        Ok(phase)
    }

    pub fn jump_to(&mut self, target: MappingPhase) -> Result<MappingPhase, AppError> {
        let phase = self.navigator.jump_to(target, &self.sources, &self.state)?;
        self.entered(phase);
        Ok(phase)
    }

    fn entered(&mut self, phase: MappingPhase) {
        let snapshot = self.coverage_snapshot();
        self.coverage.mark_phase_entry(phase, snapshot);
        if self.emitter.is_some() {
            let change = PhaseChange {
                phase,
                progress: self.phase_progress(),
            };
            self.emit(events::PHASE_CHANGED, &change);
        }
    }

    pub fn phase_progress(&self) -> Vec<PhaseProgress> {
        PhaseNavigator::all_progress(&self.sources, &self.state)
    }

    /// Unresolved sources of the current phase, in layout order.
    pub fn remaining(&self) -> Vec<&str> {
        PhaseNavigator::remaining(self.phase(), &self.sources, &self.state)
    }

    // ── Coverage ────────────────────────────────────────────────────

    pub fn coverage_snapshot(&mut self) -> CoverageSnapshot {
        self.coverage.snapshot(&self.state, &self.sources, &self.dests)
    }

    pub fn coverage_report(&mut self) -> CoverageReport {
        self.coverage.report(&self.state, &self.sources, &self.dests)
    }

    /// Gain since the current phase was first entered.
    pub fn phase_gain(&mut self) -> CoverageGain {
        let current = self.coverage_snapshot();
        self.coverage
            .phase_gain(self.phase(), &current)
            .unwrap_or_default()
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Best destinations for `source`, at most `suggestion_limit`, best first.
    pub fn suggestions(&self, source: &str) -> Vec<MatchSuggestion> {
        self.state
            .scores()
            .ranked_dests(source)
            .into_iter()
            .take(self.settings.suggestion_limit)
            .map(|(dest, score)| MatchSuggestion {
                dest: dest.to_string(),
                score,
                confidence: Confidence::from_score(score),
                is_strong: score >= self.settings.strong_match_threshold,
                taken_by: self
                    .state
                    .source_for_dest(dest)
                    .filter(|holder| *holder != source)
                    .map(ToString::to_string),
            })
            .collect()
    }

    pub fn explain(&self, source: &str, dest: &str) -> Option<ScoreBreakdown> {
        scoring::explain(self.source(source)?, self.dest(dest)?)
    }

    pub fn export(&self, only_with_effects: bool) -> MappingExport {
        build_export(&self.state, &self.sources, only_with_effects)
    }

    pub fn to_snapshot(&self, saved_at: u64) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            sequence_label: self.label.clone(),
            phase: self.phase(),
            assignments: self.state.assignments().cloned().collect(),
            skipped: self.state.skipped().map(ToString::to_string).collect(),
            overrides: self.state.overridden().map(ToString::to_string).collect(),
            dismissed_families: self.bulk.dismissed_keys().map(ToString::to_string).collect(),
        }
    }
}

/// Score and solve off the async runtime, handing back the finished session.
pub async fn prepare_session<P>(
    label: String,
    sources: Vec<Entity>,
    dests: Vec<Entity>,
    settings: MapperSettings,
    mut on_progress: P,
) -> Result<MappingSession, AppError>
where
    P: FnMut(ProgressEvent) + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        MappingSession::new_with_progress(label, sources, dests, settings, &mut on_progress)
    })
    .await
    .map_err(|e| AppError::ValidationError {
        message: format!("session preparation failed: {e}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::AssignMethod;
    use crate::snapshot::unix_now;

    fn pumpkins(n: u32) -> Vec<Entity> {
        (1..=n).map(|i| Entity::model(format!("Mini Pumpkin {i}"), 25).with_effects(4)).collect()
    }

    fn trees(n: u32) -> Vec<Entity> {
        (1..=n).map(|i| Entity::model(format!("Mini Tree {i}"), 60)).collect()
    }

    fn session() -> MappingSession {
        let mut sources = pumpkins(3);
        sources.push(Entity::model("Matrix", 2048).with_effects(20));
        sources.push(Entity::group("Spinner Rings", ["Spinner/Ring 1", "Spinner/Ring 2"]));
        let mut dests = trees(3);
        dests.push(Entity::model("Matrix", 2048));
        dests.push(Entity::group("Spinner Rings", ["Spinner/Ring 1", "Spinner/Ring 2"]));
        MappingSession::new("Test", sources, dests, MapperSettings::default())
    }

    #[test]
    fn seeds_confident_pairs_and_records_baseline() {
        let mut s = session();
        assert_eq!(s.state().dest_of("Matrix"), Some("Matrix"));
        assert_eq!(s.state().dest_of("Spinner Rings"), Some("Spinner Rings"));
        assert_eq!(s.state().dest_of("Mini Pumpkin 1"), None);
        assert_eq!(s.phase(), MappingPhase::Individuals);
        let gain = s.phase_gain();
        assert!(gain.display.abs() < 1e-9);
    }

    #[test]
    fn manual_assign_raises_bulk_suggestion_and_accept_is_one_undo_step() {
        let mut s = session();
        let report = s.assign("Mini Pumpkin 1", "Mini Tree 1");
        let suggestion = report.bulk_suggestion.expect("family suggestion");
        assert_eq!(suggestion.pairs.len(), 2);

        let accepted = s.accept_bulk().unwrap();
        assert!(!accepted.event.is_noop());
        assert!(accepted.bulk_suggestion.is_none());
        assert_eq!(s.state().dest_of("Mini Pumpkin 3"), Some("Mini Tree 3"));
        assert_eq!(
            s.state().assignment_for("Mini Pumpkin 2").unwrap().method,
            AssignMethod::Bulk
        );

        s.undo().unwrap();
        assert_eq!(s.state().dest_of("Mini Pumpkin 2"), None);
        assert_eq!(s.state().dest_of("Mini Pumpkin 1"), Some("Mini Tree 1"));
        assert!(s.accept_bulk().is_err());
    }

    #[test]
    fn bulk_suggestion_stays_within_current_phase() {
        let mut sources = pumpkins(2);
        sources.push(Entity::group("Mini Pumpkin 3", ["Face/Eyes", "Face/Mouth"]));
        let mut s = MappingSession::new("Scoped", sources, trees(3), MapperSettings::default());
        assert_eq!(s.phase(), MappingPhase::Individuals);

        let report = s.assign("Mini Pumpkin 1", "Mini Tree 1");
        let suggestion = report.bulk_suggestion.expect("family suggestion");
        let offered: Vec<&str> = suggestion.pairs.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(offered, vec!["Mini Pumpkin 2"]);
    }

    #[test]
    fn dismissed_family_is_not_offered_again() {
        let mut s = session();
        s.assign("Mini Pumpkin 1", "Mini Tree 1");
        assert!(s.dismiss_bulk());
        assert!(!s.dismiss_bulk());
        let report = s.assign("Mini Pumpkin 2", "Mini Tree 2");
        assert!(report.bulk_suggestion.is_none());
    }

    #[test]
    fn phase_gate_and_coverage_gain() {
        let mut s = session();
        let err = s.go_to_next_phase().unwrap_err();
        assert!(matches!(err, AppError::PhaseBlocked { ref remaining, .. } if remaining.len() == 3));

        s.skip("Mini Pumpkin 1");
        s.skip("Mini Pumpkin 2");
        let before = s.coverage_snapshot();
        s.assign("Mini Pumpkin 3", "Mini Tree 3");
        let after = s.coverage_snapshot();
        assert!(after.display_percent() > before.display_percent());

        assert_eq!(s.go_to_next_phase().unwrap(), MappingPhase::Spinners);
        assert!(s.remaining().is_empty());
        assert!(s.phase_gain().display.abs() < 1e-9);
        let report = s.coverage_report();
        assert!(report.gain.display > 0.0);
    }

    #[test]
    fn emitter_receives_command_undo_and_phase_updates() {
        use parking_lot::Mutex;

        let seen: Arc<Mutex<Vec<(&'static str, serde_json::Value)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let mut s = session();
        s.set_emitter(Box::new(move |channel, payload| sink.lock().push((channel, payload))));

        s.assign("Mini Pumpkin 1", "Mini Tree 1");
        let channels: Vec<&str> = seen.lock().iter().map(|(c, _)| *c).collect();
        assert_eq!(
            channels,
            vec![
                events::MAPPING_CHANGED,
                events::COVERAGE_UPDATED,
                events::UNDO_STATE_CHANGED,
                events::BULK_SUGGESTION
            ]
        );

        seen.lock().clear();
        s.unskip("Mini Pumpkin 2");
        assert!(seen.lock().is_empty(), "no-op published");

        s.undo().unwrap();
        let (channel, payload) = seen.lock()[0].clone();
        assert_eq!(channel, events::MAPPING_CHANGED);
        assert_eq!(payload["undone"], "Map Mini Pumpkin 1 → Mini Tree 1");

        seen.lock().clear();
        s.skip("Mini Pumpkin 1");
        s.skip("Mini Pumpkin 2");
        s.skip("Mini Pumpkin 3");
        seen.lock().clear();
        s.go_to_next_phase().unwrap();
        let published = seen.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, events::PHASE_CHANGED);
        assert_eq!(published[0].1["phase"], "spinners");
    }

    #[test]
    fn suggestions_respect_limit_and_flag_holders() {
        let mut s = session();
        s.set_settings(MapperSettings {
            suggestion_limit: 2,
            ..MapperSettings::default()
        });
        s.assign("Mini Pumpkin 2", "Mini Tree 1");
        let list = s.suggestions("Mini Pumpkin 1");
        assert_eq!(list.len(), 2);
        assert!(list[0].score >= list[1].score);
        let held = list.iter().find(|m| m.dest == "Mini Tree 1").unwrap();
        assert_eq!(held.taken_by.as_deref(), Some("Mini Pumpkin 2"));

        let own = s.suggestions("Mini Pumpkin 2");
        let mine = own.iter().find(|m| m.dest == "Mini Tree 1").unwrap();
        assert_eq!(mine.taken_by, None);
    }

    #[test]
    fn snapshot_restores_edits() {
        let mut s = session();
        s.assign("Mini Pumpkin 1", "Mini Tree 1");
        assert!(s.dismiss_bulk());
        s.assign("Mini Pumpkin 1", "Mini Tree 2");
        s.skip("Mini Pumpkin 3");
        let snap = s.to_snapshot(unix_now());
        assert_eq!(snap.dismissed_families.len(), 1);

        let mut sources = pumpkins(3);
        sources.push(Entity::model("Matrix", 2048));
        let restored = MappingSession::from_snapshot(sources, trees(3), MapperSettings::default(), &snap);
        assert_eq!(restored.state().dest_of("Mini Pumpkin 1"), Some("Mini Tree 2"));
        assert!(restored.state().is_skipped("Mini Pumpkin 3"));
        // The Matrix destination is gone from this layout.
        assert_eq!(restored.state().dest_of("Matrix"), None);
        assert_eq!(restored.to_snapshot(0).dismissed_families, snap.dismissed_families);
    }

    #[test]
    fn export_lists_rows_in_source_order() {
        let mut s = session();
        s.assign("Mini Pumpkin 1", "Mini Tree 1");
        let export = s.export(false);
        let sources: Vec<&str> = export.rows.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["Mini Pumpkin 1", "Matrix", "Spinner Rings"]);
    }

    #[tokio::test]
    async fn prepare_session_runs_in_background() {
        let mut sources = pumpkins(2);
        sources.push(Entity::model("Mini Pumpkin 1", 25));
        let session = prepare_session("Bg".into(), sources, pumpkins(2), MapperSettings::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(session.sources().len(), 2);
        assert_eq!(session.state().assignment_count(), 2);
    }
}
