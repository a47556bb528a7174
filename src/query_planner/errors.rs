use thiserror::Error;

use crate::context_graph::ContextError;
use crate::mapping_catalog::{AdapterError, MappingError};
use crate::types::{DataType, Value};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Cannot convert literal for `{member}`: {source}")]
    Adapter {
        member: String,
        #[source]
        source: AdapterError,
    },

    #[error("Literal {value} is not compatible with `{member}` of type {data_type}")]
    LiteralType {
        member: String,
        value: Value,
        data_type: DataType,
    },

    #[error("Enumeration `{0}` is not declared in the mapping catalog")]
    UnknownEnum(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlannerError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Requested shape the planner cannot express (e.g. paging without an
    /// ordering clause).
    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Include `{path}` needs `{alias}` in the parent selection")]
    MissingParentKey { path: String, alias: String },
}

impl PlannerError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        PlannerError::Unsupported(message.into())
    }
}
