//! # Mapping Error Types
//!
//! Errors raised while loading or validating an entity mapping, and while
//! looking up entities, members and relationships at planning time. All of
//! them are configuration errors: fatal, never retried, and raised before
//! any statement touches a connection.

use thiserror::Error;

use crate::types::Value;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingError {
    #[error("No table map found for entity `{entity}`")]
    UnmappedEntity { entity: String },
    #[error("Entity `{entity}` has no mapped member `{member}`")]
    UnknownMember { entity: String, member: String },
    #[error("Entity `{entity}` has no relationship named `{name}`")]
    UnknownRelationship { entity: String, name: String },
    #[error("Entity `{entity}` has a composite primary key; a single key column is required here")]
    CompositeKey { entity: String },
    #[error("Entity `{entity}` declares no primary key")]
    MissingPrimaryKey { entity: String },
    #[error("Entity `{entity}` is mapped more than once")]
    DuplicateEntity { entity: String },
    #[error("Invalid column reference `{reference}` (expected `Entity.Member`)")]
    InvalidColumnRef { reference: String },
    #[error("No enumeration named `{name}` is declared")]
    UnknownEnum { name: String },
    #[error("Invalid lookup on `{entity}.{member}`: {reason}")]
    InvalidLookup {
        entity: String,
        member: String,
        reason: String,
    },
    #[error("Failed to read mapping file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse mapping: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid mapping: {message}")]
    InvalidConfig { message: String },
}

impl MappingError {
    pub fn unknown_member(entity: impl Into<String>, member: impl Into<String>) -> Self {
        MappingError::UnknownMember {
            entity: entity.into(),
            member: member.into(),
        }
    }

    pub fn unmapped(entity: impl Into<String>) -> Self {
        MappingError::UnmappedEntity {
            entity: entity.into(),
        }
    }
}

/// A value adapter or enumeration could not convert a value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("Adapter `{adapter}` cannot convert {value}")]
    Conversion { adapter: String, value: Value },
    #[error("`{value}` is not a variant of enumeration `{enumeration}`")]
    UnknownVariant { enumeration: String, value: Value },
}
