use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;
use crate::model::AssignMethod;

use super::command::MappingCommand;
use super::state::{MappingEvent, MappingState};

/// Undo/redo state for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UndoState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_description: Option<String>,
    pub redo_description: Option<String>,
}

/// The mapping state before a command ran, plus the command description.
struct UndoEntry {
    description: String,
    snapshot: MappingState,
}

const MAX_UNDO_LEVELS: usize = 50;

/// Runs commands against a [`MappingState`] with snapshot-based undo/redo.
///
/// Commands that turn out to be no-ops leave no history.
#[derive(Default)]
pub struct CommandDispatcher {
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a command, snapshotting the state first.
    pub fn execute(&mut self, state: &mut MappingState, cmd: &MappingCommand) -> MappingEvent {
        let snapshot = state.clone();
        let event = apply(state, cmd);
        if event.is_noop() {
            return event;
        }

        self.undo_stack.push(UndoEntry {
            description: cmd.description(),
            snapshot,
        });
        if self.undo_stack.len() > MAX_UNDO_LEVELS {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        event
    }

    /// Undo the last command. Returns the description of what was undone.
    pub fn undo(&mut self, state: &mut MappingState) -> Result<String, AppError> {
        let entry = self.undo_stack.pop().ok_or(AppError::ValidationError {
            message: "Nothing to undo".into(),
        })?;
        let current = state.clone();
        state.replace_with(entry.snapshot);
        self.redo_stack.push(UndoEntry {
            description: entry.description.clone(),
            snapshot: current,
        });
        Ok(entry.description)
    }

    /// Redo the last undone command. Returns the description of what was redone.
    pub fn redo(&mut self, state: &mut MappingState) -> Result<String, AppError> {
        let entry = self.redo_stack.pop().ok_or(AppError::ValidationError {
            message: "Nothing to redo".into(),
        })?;
        let current = state.clone();
        state.replace_with(entry.snapshot);
        self.undo_stack.push(UndoEntry {
            description: entry.description.clone(),
            snapshot: current,
        });
        Ok(entry.description)
    }

    pub fn undo_state(&self) -> UndoState {
        UndoState {
            can_undo: !self.undo_stack.is_empty(),
            can_redo: !self.redo_stack.is_empty(),
            undo_description: self.undo_stack.last().map(|e| e.description.clone()),
            redo_description: self.redo_stack.last().map(|e| e.description.clone()),
        }
    }
}

/// Apply a command to the state. Does not touch undo history.
fn apply(state: &mut MappingState, cmd: &MappingCommand) -> MappingEvent {
    match cmd {
        MappingCommand::Assign { source, dest } => state.assign(source, dest),
        MappingCommand::Unassign { source } => state.unassign(source),
        MappingCommand::Skip { source } => state.skip(source),
        MappingCommand::Unskip { source } => state.unskip(source),
        MappingCommand::Swap { source_a, source_b } => state.swap(source_a, source_b),
        MappingCommand::Rematch { auto_accept } => state.rematch(*auto_accept),
        MappingCommand::AcceptBulk { pairs, .. } => MappingEvent::Batch {
            description: cmd.description(),
            events: pairs
                .iter()
                .map(|p| state.assign_with(&p.source, &p.dest, AssignMethod::Bulk))
                .collect(),
        },
        MappingCommand::Batch {
            description,
            commands,
        } => MappingEvent::Batch {
            description: description.clone(),
            events: commands.iter().map(|c| apply(state, c)).collect(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bulk::BulkPair;
    use crate::model::Entity;
    use crate::progress::ignore_progress;
    use crate::scoring::ScoreTable;

    fn state() -> MappingState {
        let sources = vec![
            Entity::model("Arch 1", 50),
            Entity::model("Arch 2", 50),
            Entity::model("Star", 40),
        ];
        let dests = vec![
            Entity::model("Arch 1", 50),
            Entity::model("Arch 2", 50),
            Entity::model("Star", 40),
        ];
        let table = ScoreTable::build(&sources, &dests, &mut ignore_progress);
        MappingState::seed(Arc::new(table), 0.70)
    }

    fn assign(source: &str, dest: &str) -> MappingCommand {
        MappingCommand::Assign {
            source: source.into(),
            dest: dest.into(),
        }
    }

    #[test]
    fn undo_and_redo_restore_assignments() {
        let mut st = state();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.execute(&mut st, &assign("Arch 1", "Star"));
        assert_eq!(st.dest_of("Arch 1"), Some("Star"));
        assert!(!st.is_assigned("Star"));

        let undone = dispatcher.undo(&mut st).unwrap();
        assert_eq!(undone, "Map Arch 1 → Star");
        assert_eq!(st.dest_of("Arch 1"), Some("Arch 1"));
        assert_eq!(st.dest_of("Star"), Some("Star"));

        dispatcher.redo(&mut st).unwrap();
        assert_eq!(st.dest_of("Arch 1"), Some("Star"));
    }

    #[test]
    fn noops_leave_no_history() {
        let mut st = state();
        let mut dispatcher = CommandDispatcher::new();
        let event = dispatcher.execute(&mut st, &assign("Nope", "Star"));
        assert!(event.is_noop());
        assert!(!dispatcher.undo_state().can_undo);
        assert!(dispatcher.undo(&mut st).is_err());
    }

    #[test]
    fn new_command_clears_redo() {
        let mut st = state();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.execute(&mut st, &MappingCommand::Skip { source: "Star".into() });
        dispatcher.undo(&mut st).unwrap();
        assert!(dispatcher.undo_state().can_redo);
        dispatcher.execute(&mut st, &MappingCommand::Unassign { source: "Arch 2".into() });
        let undo = dispatcher.undo_state();
        assert!(!undo.can_redo);
        assert_eq!(undo.undo_description.as_deref(), Some("Unmap Arch 2"));
    }

    #[test]
    fn history_is_capped() {
        let mut st = state();
        let mut dispatcher = CommandDispatcher::new();
        for i in 0..(MAX_UNDO_LEVELS + 10) {
            let source = if i % 2 == 0 { "Arch 1" } else { "Arch 2" };
            dispatcher.execute(&mut st, &MappingCommand::Swap {
                source_a: source.into(),
                source_b: "Star".into(),
            });
        }
        let mut undone = 0;
        while dispatcher.undo(&mut st).is_ok() {
            undone += 1;
        }
        assert_eq!(undone, MAX_UNDO_LEVELS);
    }

    #[test]
    fn bulk_accept_is_one_undo_step() {
        let mut st = state();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.execute(&mut st, &MappingCommand::Unassign { source: "Arch 1".into() });
        dispatcher.execute(&mut st, &MappingCommand::Unassign { source: "Arch 2".into() });
        let cmd = MappingCommand::AcceptBulk {
            source_family: "Arch".into(),
            dest_family: "Arch".into(),
            pairs: vec![
                BulkPair { source: "Arch 1".into(), dest: "Arch 1".into(), number: 1 },
                BulkPair { source: "Arch 2".into(), dest: "Arch 2".into(), number: 2 },
            ],
        };
        let event = dispatcher.execute(&mut st, &cmd);
        assert!(matches!(event, MappingEvent::Batch { ref events, .. } if events.len() == 2));
        assert_eq!(st.assignment_for("Arch 2").unwrap().method, AssignMethod::Bulk);
        dispatcher.undo(&mut st).unwrap();
        assert!(!st.is_assigned("Arch 1") && !st.is_assigned("Arch 2"));
    }

    #[test]
    fn version_moves_forward_through_undo() {
        let mut st = state();
        let mut dispatcher = CommandDispatcher::new();
        let start = st.version();
        dispatcher.execute(&mut st, &MappingCommand::Skip { source: "Star".into() });
        let after = st.version();
        dispatcher.undo(&mut st).unwrap();
        assert!(st.version() > after && after > start);
    }
}
