use std::fmt;

use serde::{Deserialize, Serialize};

use super::filter::{FilterExpr, FilterGraph};
use crate::context_graph::{ContextColumn, NodeIndex};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Requested ordering on a member path (relative to the target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub path: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Resolved ordering term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: ContextColumn,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub top: Option<u64>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub take: Option<u64>,
}

impl Modifiers {
    /// Whether any row-limiting or row-collapsing modifier is present.
    pub fn is_limiting(&self) -> bool {
        self.distinct || self.top.is_some() || self.skip.is_some() || self.take.is_some()
    }

    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// Rows to return, `TOP` and `TAKE` being the same thing to a writer.
    pub fn limit(&self) -> Option<u64> {
        self.top.or(self.take)
    }
}

/// One projection template entry: member path and output alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub path: String,
    pub alias: String,
}

/// What a query returns, decided once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Target columns plus the columns of each included path.
    AllColumns {
        #[serde(default)]
        includes: Vec<String>,
    },
    Projection(Vec<Projection>),
}

impl Default for Selection {
    fn default() -> Self {
        Selection::AllColumns {
            includes: Vec::new(),
        }
    }
}

/// Planning input for one query against one target node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        match &mut self.selection {
            Selection::AllColumns { includes } => includes.push(path.into()),
            Selection::Projection(_) => {
                self.selection = Selection::AllColumns {
                    includes: vec![path.into()],
                }
            }
        }
        self
    }

    pub fn project(mut self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        let entry = Projection {
            path: path.into(),
            alias: alias.into(),
        };
        match &mut self.selection {
            Selection::Projection(entries) => entries.push(entry),
            Selection::AllColumns { .. } => self.selection = Selection::Projection(vec![entry]),
        }
        self
    }

    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            path: path.into(),
            direction,
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.modifiers.distinct = true;
        self
    }

    pub fn top(mut self, n: u64) -> Self {
        self.modifiers.top = Some(n);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.modifiers.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.modifiers.take = Some(n);
        self
    }

    pub fn includes(&self) -> &[String] {
        match &self.selection {
            Selection::AllColumns { includes } => includes,
            Selection::Projection(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// Table rendered in the `FROM` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSource {
    pub node: NodeIndex,
    pub entity: String,
    pub table: String,
}

/// `<join_type> <table> AS t<node> ON t<node>.<node_column> = t<source>.<source_column>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinDescription {
    /// Node being joined in.
    pub node: NodeIndex,
    pub table: String,
    pub node_column: String,
    /// Already-joined node the condition refers to.
    pub source: NodeIndex,
    pub source_column: String,
    pub join_type: JoinType,
}

/// Restricts a column to a materialized key set (`column IN (...)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRestriction {
    pub column: ContextColumn,
    pub keys: Vec<Value>,
}

/// Fully resolved plan for one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub target: NodeIndex,
    /// The target's own key column.
    pub target_key: ContextColumn,
    pub base: TableSource,
    pub select: Vec<ContextColumn>,
    pub joins: Vec<JoinDescription>,
    pub filter: Option<FilterGraph>,
    pub key_restriction: Option<KeyRestriction>,
    pub order_by: Vec<OrderTerm>,
    pub modifiers: Modifiers,
    /// One-to-many nodes (other than the target) the statement joins over.
    pub inverted_nodes: Vec<NodeIndex>,
}

impl QueryContext {
    /// Every node the statement touches, base first.
    pub fn nodes(&self) -> Vec<NodeIndex> {
        std::iter::once(self.base.node)
            .chain(self.joins.iter().map(|j| j.node))
            .collect()
    }

    pub fn join_for(&self, node: NodeIndex) -> Option<&JoinDescription> {
        self.joins.iter().find(|j| j.node == node)
    }

    /// Bind the materialized key set of a restricted plan.
    pub fn with_keys(mut self, keys: Vec<Value>) -> Self {
        if let Some(restriction) = &mut self.key_restriction {
            restriction.keys = keys;
        }
        self
    }

    /// Position of the column aliased `alias` in the select list.
    pub fn column_position(&self, alias: &str) -> Option<usize> {
        self.select
            .iter()
            .position(|c| c.alias.as_deref() == Some(alias))
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "select{}: {}",
            if self.modifiers.distinct { " distinct" } else { "" },
            self.select
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        writeln!(f, "from: {} t{}", self.base.table, self.base.node)?;
        for join in &self.joins {
            writeln!(
                f,
                "  {:?} {} t{} on t{}.{} = t{}.{}",
                join.join_type,
                join.table,
                join.node,
                join.node,
                join.node_column,
                join.source,
                join.source_column
            )?;
        }
        if let Some(filter) = &self.filter {
            writeln!(f, "where: {}", filter)?;
        }
        if let Some(restriction) = &self.key_restriction {
            writeln!(
                f,
                "keys: t{}.{} in {} value(s)",
                restriction.column.node,
                restriction.column.column,
                restriction.keys.len()
            )?;
        }
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|o| format!("t{}.{} {}", o.column.node, o.column.column, o.direction.as_sql()))
                .collect();
            writeln!(f, "order: {}", terms.join(", "))?;
        }
        if let Some(limit) = self.modifiers.limit() {
            writeln!(f, "limit: {}", limit)?;
        }
        if let Some(skip) = self.modifiers.skip {
            writeln!(f, "skip: {}", skip)?;
        }
        Ok(())
    }
}
