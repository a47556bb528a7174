use thiserror::Error;

use crate::mapping_catalog::MappingError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Configuration error: a path segment names no relationship.
    #[error("Entity `{entity}` has no navigation member `{member}` (in path `{path}`)")]
    UnknownNavigation {
        entity: String,
        member: String,
        path: String,
    },

    #[error("Invalid navigation path `{0}`")]
    InvalidPath(String),

    /// The member exists but is not a column (e.g. a collection navigation).
    #[error("Member `{entity}.{member}` cannot be resolved to a column")]
    UnresolvableMember { entity: String, member: String },

    #[error("Context node {0} does not exist")]
    NodeOutOfRange(usize),
}
