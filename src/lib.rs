//! relplan - relational-mapping query and write planner
//!
//! This crate turns navigation paths over mapped entities into SQL:
//! - Context graphs of the entities a query or write touches
//! - Join planning with filter-driven inner joins and two-phase paging
//! - Statement rendering through a pluggable writer
//! - Cascading saves with key propagation and orphan reconciliation

pub mod config;
pub mod context_graph;
pub mod executor;
pub mod mapping_catalog;
pub mod query_planner;
pub mod sql_generator;
pub mod types;
pub mod write_cascade;
