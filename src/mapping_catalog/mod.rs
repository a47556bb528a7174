//! Mapping model: entities, tables, columns and relationships.
//!
//! The catalog is read-only input to every planning step. It is built once,
//! either from a YAML [`MappingConfig`] or programmatically from
//! [`TableMap`]s, and consulted through the [`MappingProvider`] trait.

pub mod adapters;
pub mod config;
pub mod errors;
pub mod table_map;

#[cfg(test)]
pub mod testing;

pub use adapters::{AdapterSpec, ValueAdapter};
pub use config::MappingConfig;
pub use errors::{AdapterError, MappingError};
pub use table_map::{
    ColumnMap, ColumnRef, DefaultPolicy, EnumDefinition, LookupRef, MappingCatalog,
    MappingProvider, Relationship, RelationshipKind, TableMap, TablePermissions,
};
