//! Domain layer types and invariants.

pub mod entity;
pub mod error;

pub use entity::{Entity, EntityIdArg, EntityType, Operation, builtin_primary_key};
pub use error::{EntityError, TransportHandle};
