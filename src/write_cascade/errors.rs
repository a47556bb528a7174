//! # Write Error Types
//!
//! Every failure of a save, delete or patch. None of them is retried; the
//! repository rolls the unit of work back and returns the original cause.

use thiserror::Error;

use super::operation::OperationKind;
use crate::context_graph::ContextError;
use crate::executor::{QueryError, UnitOfWorkError};
use crate::mapping_catalog::{AdapterError, MappingError};
use crate::query_planner::PlannerError;
use crate::sql_generator::WriterError;
use crate::types::{DataType, Value};

/// Broad class of a [`WriteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The mapping cannot describe the requested write.
    Configuration,
    /// The entity graph is missing or carries invalid values.
    Data,
    /// The mapping forbids the operation, or the shape is not supported.
    Unsupported,
    /// The executor failed while running a statement.
    Execution,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WriteError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{operation} is not permitted on `{entity}`")]
    NotPermitted {
        entity: String,
        operation: OperationKind,
    },

    #[error("{operation} of `{entity}` requires a key value")]
    MissingKeyValue {
        entity: String,
        operation: OperationKind,
    },

    #[error("`{entity}.{member}` is required but has no value and no default")]
    MissingRequiredValue { entity: String, member: String },

    #[error("Invalid value for `{entity}.{member}`: {source}")]
    InvalidValue {
        entity: String,
        member: String,
        #[source]
        source: AdapterError,
    },

    #[error("Value {value} for `{entity}.{member}` is not a valid {data_type}")]
    ValueType {
        entity: String,
        member: String,
        value: Value,
        data_type: DataType,
    },

    #[error("`{value}` is not a known `{lookup}` value for `{entity}.{member}`")]
    UnknownLookupValue {
        entity: String,
        member: String,
        lookup: String,
        value: Value,
    },

    #[error("Entity `{entity}` has no writable member `{member}`")]
    UnknownMember { entity: String, member: String },

    #[error("Foreign key `{entity}.{member}` cannot carry a referenced key")]
    ForeignKeyNotSettable { entity: String, member: String },

    #[error("`{entity}.{name}` is not a {expected} navigation")]
    InvalidNavigation {
        entity: String,
        name: String,
        expected: &'static str,
    },

    #[error("No `{entity}` row with key {key}")]
    RowNotFound { entity: String, key: Value },

    #[error("Insert into `{entity}` returned no generated key")]
    MissingGeneratedKey { entity: String },
}

impl WriteError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WriteError::Mapping(MappingError::CompositeKey { .. })
            | WriteError::Context(ContextError::Mapping(MappingError::CompositeKey { .. }))
            | WriteError::NotPermitted { .. } => ErrorCategory::Unsupported,
            WriteError::Planner(PlannerError::Unsupported(_)) => ErrorCategory::Unsupported,
            WriteError::Mapping(_)
            | WriteError::Context(_)
            | WriteError::Planner(_)
            | WriteError::ForeignKeyNotSettable { .. }
            | WriteError::InvalidNavigation { .. } => ErrorCategory::Configuration,
            WriteError::Writer(_)
            | WriteError::MissingKeyValue { .. }
            | WriteError::MissingRequiredValue { .. }
            | WriteError::InvalidValue { .. }
            | WriteError::ValueType { .. }
            | WriteError::UnknownLookupValue { .. }
            | WriteError::UnknownMember { .. }
            | WriteError::RowNotFound { .. } => ErrorCategory::Data,
            WriteError::UnitOfWork(_)
            | WriteError::Query(_)
            | WriteError::MissingGeneratedKey { .. } => ErrorCategory::Execution,
        }
    }
}
