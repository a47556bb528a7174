//! Shared fixtures for unit tests.

use std::sync::Arc;

use super::{MappingCatalog, MappingConfig, MappingProvider};

pub const SALES_MAPPING: &str = include_str!("../../tests/fixtures/sales_mapping.yaml");

/// Sales catalog: regions, customers, orders with lines and notes, products,
/// suppliers, countries, a read-only order status lookup and a
/// self-referencing employee hierarchy.
pub fn sales_catalog() -> Arc<dyn MappingProvider> {
    Arc::new(sales_mapping())
}

pub fn sales_mapping() -> MappingCatalog {
    MappingConfig::from_yaml_str(SALES_MAPPING)
        .expect("sales mapping parses")
        .into_catalog()
        .expect("sales mapping is valid")
}
