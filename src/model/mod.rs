pub mod assignment;
pub mod entity;

// Re-export commonly used types at the model level.
pub use assignment::{AssignMethod, Assignment, SacrificeInfo};
pub use entity::{Entity, EntityType, ParsedEntity, PhaseBucket};
