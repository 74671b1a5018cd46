//! Mapping state and the commands that mutate it.

pub mod command;
pub mod dispatcher;
pub mod state;

pub use command::MappingCommand;
pub use dispatcher::{CommandDispatcher, UndoState};
pub use state::{MappingEvent, MappingState};
