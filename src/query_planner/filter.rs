//! Filter Processor.
//!
//! Binds a [`FilterExpr`] whose leaves are unresolved member paths into a
//! [`FilterGraph`] over concrete [`ContextColumn`]s, creating context nodes
//! as paths are encountered, and normalizes literals compared against
//! adapted or enumerated members into their storage representation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::FilterError;
use crate::context_graph::{Context, ContextColumn, NodeIndex};
use crate::types::{DataType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

impl BinaryOperator {
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Like => "LIKE",
        }
    }
}

/// Filter AST as produced upstream. Member paths are relative to the
/// query's target node.
///
/// In JSON: `{"binary": {"op": "eq", "left": {"member": "Customer.Name"}, "right": {"literal": "Acme"}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    Binary {
        op: BinaryOperator,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    Member(String),
    Literal(Value),
}

impl FilterExpr {
    pub fn member(path: impl Into<String>) -> Self {
        FilterExpr::Member(path.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        FilterExpr::Literal(value.into())
    }

    pub fn binary(op: BinaryOperator, left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `path == value`
    pub fn equals(path: &str, value: impl Into<Value>) -> Self {
        Self::binary(
            BinaryOperator::Eq,
            Self::member(path),
            Self::literal(value),
        )
    }

    pub fn compare(path: &str, op: BinaryOperator, value: impl Into<Value>) -> Self {
        Self::binary(op, Self::member(path), Self::literal(value))
    }

    pub fn and(self, other: FilterExpr) -> Self {
        Self::binary(BinaryOperator::And, self, other)
    }

    pub fn or(self, other: FilterExpr) -> Self {
        Self::binary(BinaryOperator::Or, self, other)
    }
}

/// Bound filter: every member leaf resolved to a context column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterGraph {
    Binary {
        op: BinaryOperator,
        left: Box<FilterGraph>,
        right: Box<FilterGraph>,
    },
    Column(ContextColumn),
    Literal(Value),
}

impl FilterGraph {
    /// Every column referenced by the filter, left to right.
    pub fn columns(&self) -> Vec<&ContextColumn> {
        let mut columns = Vec::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, into: &mut Vec<&'a ContextColumn>) {
        match self {
            FilterGraph::Binary { left, right, .. } => {
                left.collect_columns(into);
                right.collect_columns(into);
            }
            FilterGraph::Column(column) => into.push(column),
            FilterGraph::Literal(_) => {}
        }
    }

    /// Nodes touched by the filter's leaves.
    pub fn nodes(&self) -> BTreeSet<NodeIndex> {
        self.columns().into_iter().map(|c| c.node).collect()
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterGraph::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_sql(), right)
            }
            FilterGraph::Column(column) => write!(f, "t{}.{}", column.node, column.column),
            FilterGraph::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// Binds filter expressions against one context, relative to `anchor`.
pub struct FilterProcessor<'a> {
    context: &'a mut Context,
    anchor: NodeIndex,
}

impl<'a> FilterProcessor<'a> {
    pub fn new(context: &'a mut Context, anchor: NodeIndex) -> Self {
        FilterProcessor { context, anchor }
    }

    pub fn bind(&mut self, expr: &FilterExpr) -> Result<FilterGraph, FilterError> {
        match expr {
            FilterExpr::Member(path) => {
                let column = self.context.resolve_path_to_column(self.anchor, path)?;
                Ok(FilterGraph::Column(column))
            }
            FilterExpr::Literal(value) => Ok(FilterGraph::Literal(value.clone())),
            FilterExpr::Binary { op, left, right } => {
                let left = self.bind(left)?;
                let right = self.bind(right)?;
                let (left, right) = if op.is_logical() {
                    (left, right)
                } else {
                    self.normalize_comparison(left, right)?
                };
                Ok(FilterGraph::Binary {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
        }
    }

    fn normalize_comparison(
        &self,
        left: FilterGraph,
        right: FilterGraph,
    ) -> Result<(FilterGraph, FilterGraph), FilterError> {
        match (left, right) {
            (FilterGraph::Column(column), FilterGraph::Literal(value)) => {
                let value = self.normalize_literal(&column, value)?;
                Ok((FilterGraph::Column(column), FilterGraph::Literal(value)))
            }
            (FilterGraph::Literal(value), FilterGraph::Column(column)) => {
                let value = self.normalize_literal(&column, value)?;
                Ok((FilterGraph::Literal(value), FilterGraph::Column(column)))
            }
            other => Ok(other),
        }
    }

    /// Enumerations first, then the column's adapter. Plain columns only get
    /// their literal coerced to the column type.
    fn normalize_literal(&self, column: &ContextColumn, value: Value) -> Result<Value, FilterError> {
        if value.is_null() {
            return Ok(value);
        }
        let map = self.context.column_map(column)?;
        let value = match &map.data_type {
            DataType::Enum(name) => self
                .context
                .mapping()
                .enum_definition(name)
                .ok_or_else(|| FilterError::UnknownEnum(name.clone()))?
                .to_storage(&value)
                .map_err(|source| FilterError::Adapter {
                    member: column.member.clone(),
                    source,
                })?,
            _ => value,
        };

        if map.adapter.is_some() {
            return map.to_storage(&value).map_err(|source| FilterError::Adapter {
                member: column.member.clone(),
                source,
            });
        }
        value
            .coerce_to(&map.data_type)
            .ok_or_else(|| FilterError::LiteralType {
                member: column.member.clone(),
                value,
                data_type: map.data_type.clone(),
            })
    }
}
