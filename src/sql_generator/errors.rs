use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WriterError {
    #[error("Query on `{entity}` selects no columns")]
    EmptySelect { entity: String },
    #[error("{kind} on `{entity}` assigns no columns")]
    EmptyAssignments { kind: String, entity: String },
    #[error("{kind} on `{entity}` has no key condition")]
    MissingKey { kind: String, entity: String },
}
