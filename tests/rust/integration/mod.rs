//! Integration tests - planner, writer, executor and cascade against SQLite
//!
//! These tests run the full pipeline on an in-memory database.

mod support;

mod query_tests;
mod write_tests;
