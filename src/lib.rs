pub mod bulk;
pub mod classify;
pub mod coverage;
pub mod describe;
pub mod error;
pub mod events;
pub mod export;
pub mod layout;
pub mod mapping;
pub mod model;
pub mod paths;
pub mod persist;
pub mod phase;
pub mod progress;
pub mod scoring;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod solver;
pub mod state;
pub mod util;
