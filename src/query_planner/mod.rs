//! Query planning: filter binding, statement planning and execution
//! strategy selection.

pub mod errors;
pub mod filter;
pub mod planner;
pub mod query_context;
pub mod strategy;

pub use errors::{FilterError, PlannerError};
pub use filter::{BinaryOperator, FilterExpr, FilterGraph, FilterProcessor};
pub use planner::{IncludePlan, PlanScope, QueryPlanner};
pub use query_context::{
    JoinDescription, JoinType, KeyRestriction, Modifiers, OrderBy, OrderTerm, Projection,
    QueryContext, QueryRequest, Selection, SortDirection, TableSource,
};
pub use strategy::{requires_two_phase, ExecutionStrategy, KEY_ALIAS};
