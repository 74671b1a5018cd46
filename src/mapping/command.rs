use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bulk::BulkPair;

/// An undoable mapping command. Each variant is one user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "command", rename_all = "snake_case")]
#[ts(export)]
pub enum MappingCommand {
    Assign {
        source: String,
        dest: String,
    },
    Unassign {
        source: String,
    },
    Skip {
        source: String,
    },
    Unskip {
        source: String,
    },
    Swap {
        source_a: String,
        source_b: String,
    },
    /// Re-run automatic matching for sources the user has not touched.
    Rematch {
        auto_accept: f64,
    },
    /// Apply an accepted family suggestion in one step.
    AcceptBulk {
        source_family: String,
        dest_family: String,
        pairs: Vec<BulkPair>,
    },
    Batch {
        description: String,
        commands: Vec<MappingCommand>,
    },
}

impl MappingCommand {
    /// Human-readable description for undo tooltips.
    pub fn description(&self) -> String {
        match self {
            MappingCommand::Assign { source, dest } => format!("Map {source} → {dest}"),
            MappingCommand::Unassign { source } => format!("Unmap {source}"),
            MappingCommand::Skip { source } => format!("Skip {source}"),
            MappingCommand::Unskip { source } => format!("Unskip {source}"),
            MappingCommand::Swap { source_a, source_b } => {
                format!("Swap {source_a} and {source_b}")
            }
            MappingCommand::Rematch { .. } => "Re-run auto match".to_string(),
            MappingCommand::AcceptBulk {
                source_family,
                dest_family,
                pairs,
            } => {
                let n = pairs.len();
                let noun = if n == 1 { "match" } else { "matches" };
                format!("Accept {n} {noun} ({source_family} → {dest_family})")
            }
            MappingCommand::Batch { description, .. } => description.clone(),
        }
    }

    /// The source the user acted on directly, when there is exactly one.
    pub fn manual_assignment(&self) -> Option<(&str, &str)> {
        match self {
            MappingCommand::Assign { source, dest } => Some((source, dest)),
            _ => None,
        }
    }
}
