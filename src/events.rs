//! Event channel names a host uses to push mapping updates to its UI.

use serde::Serialize;
use ts_rs::TS;

use crate::phase::{MappingPhase, PhaseProgress};
use crate::session::CommandReport;

pub const MAPPING_CHANGED: &str = "mapping:changed";
pub const COVERAGE_UPDATED: &str = "mapping:coverage";
pub const BULK_SUGGESTION: &str = "mapping:bulk_suggestion";
pub const PHASE_CHANGED: &str = "mapping:phase";
pub const UNDO_STATE_CHANGED: &str = "mapping:undo_state";
pub const PROGRESS: &str = "progress";

pub const ALL: [&str; 6] = [
    MAPPING_CHANGED,
    COVERAGE_UPDATED,
    BULK_SUGGESTION,
    PHASE_CHANGED,
    UNDO_STATE_CHANGED,
    PROGRESS,
];

/// Host callback receiving a channel name and its JSON payload.
pub type Emitter = Box<dyn FnMut(&'static str, serde_json::Value) + Send>;

/// Payload of [`PHASE_CHANGED`].
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct PhaseChange {
    pub phase: MappingPhase,
    pub progress: Vec<PhaseProgress>,
}

/// Channels a command report is published on, in publish order. No-ops
/// publish nothing. [`BULK_SUGGESTION`] is only published while a
/// suggestion is pending; a UI drops a shown suggestion on the next
/// [`MAPPING_CHANGED`] that is not followed by a fresh one.
pub fn channels_for(report: &CommandReport) -> Vec<&'static str> {
    if report.event.is_noop() {
        return Vec::new();
    }
    let mut channels = vec![MAPPING_CHANGED, COVERAGE_UPDATED, UNDO_STATE_CHANGED];
    if report.bulk_suggestion.is_some() {
        channels.push(BULK_SUGGESTION);
    }
    channels
}

/// JSON payload of `channel` for a command report, or `None` for channels a
/// report does not carry.
pub fn payload_for(report: &CommandReport, channel: &str) -> Option<serde_json::Value> {
    let value = match channel {
        MAPPING_CHANGED => serde_json::to_value(&report.event),
        COVERAGE_UPDATED => serde_json::to_value(report.coverage),
        UNDO_STATE_CHANGED => serde_json::to_value(&report.undo),
        BULK_SUGGESTION => serde_json::to_value(&report.bulk_suggestion),
        _ => return None,
    };
    match value {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(channel, error = %e, "event payload not serializable");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::coverage::CoverageSnapshot;
    use crate::mapping::{CommandDispatcher, MappingEvent};

    fn report(event: MappingEvent) -> CommandReport {
        CommandReport {
            event,
            coverage: CoverageSnapshot::default(),
            bulk_suggestion: None,
            undo: CommandDispatcher::new().undo_state(),
        }
    }

    #[test]
    fn channel_names_are_unique() {
        let unique: HashSet<&str> = ALL.iter().copied().collect();
        assert_eq!(unique.len(), ALL.len());
    }

    #[test]
    fn noops_are_not_published() {
        let noop = report(MappingEvent::NoOp { reason: "x".into() });
        assert!(channels_for(&noop).is_empty());
    }

    #[test]
    fn effective_commands_refresh_mapping_coverage_and_undo() {
        let unskipped = report(MappingEvent::Unskipped { source: "Fog".into() });
        assert_eq!(
            channels_for(&unskipped),
            vec![MAPPING_CHANGED, COVERAGE_UPDATED, UNDO_STATE_CHANGED]
        );
        let payload = payload_for(&unskipped, MAPPING_CHANGED).unwrap();
        assert_eq!(payload["source"], "Fog");
        assert!(payload_for(&unskipped, PHASE_CHANGED).is_none());
    }
}
