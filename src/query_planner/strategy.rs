//! Execution Strategy Selector.
//!
//! A statement that joins a one-to-many node multiplies the target's rows.
//! Combined with DISTINCT/TOP/SKIP/TAKE that breaks paging, so such queries
//! run in two phases: the page of target keys is materialized first, then
//! the full rows are read for exactly those keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::query_context::QueryContext;

/// Alias of the target key in a phase-one statement.
pub const KEY_ALIAS: &str = "__key";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Direct(QueryContext),
    TwoPhase {
        /// Selects the distinct target keys of the page.
        keys: QueryContext,
        /// Full rows, restricted to the keys returned by `keys`.
        rows: QueryContext,
    },
}

impl ExecutionStrategy {
    pub fn is_two_phase(&self) -> bool {
        matches!(self, ExecutionStrategy::TwoPhase { .. })
    }

    /// The plan whose rows are returned to the caller.
    pub fn result_plan(&self) -> &QueryContext {
        match self {
            ExecutionStrategy::Direct(plan) => plan,
            ExecutionStrategy::TwoPhase { rows, .. } => rows,
        }
    }
}

/// Inverted nodes other than the target, together with any limiting
/// modifier.
pub fn requires_two_phase(plan: &QueryContext) -> bool {
    !plan.inverted_nodes.is_empty() && plan.modifiers.is_limiting()
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Direct(plan) => write!(f, "direct\n{}", plan),
            ExecutionStrategy::TwoPhase { keys, rows } => {
                write!(f, "two-phase\n-- keys\n{}-- rows\n{}", keys, rows)
            }
        }
    }
}
