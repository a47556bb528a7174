//! Cascading writes of entity graphs.

pub mod engine;
pub mod entity;
pub mod errors;
pub mod operation;
pub mod repository;

pub use engine::WriteCascade;
pub use entity::EntityRecord;
pub use errors::{ErrorCategory, WriteError};
pub use operation::{Assignment, OperationContext, OperationKind};
pub use repository::Repository;
