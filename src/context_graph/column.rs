use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeIndex;

/// A (node, column) pair: the unit referenced by select lists, filters and
/// orderings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextColumn {
    pub node: NodeIndex,
    /// Mapped member name on the node's entity.
    pub member: String,
    /// Storage column name.
    pub column: String,
    /// Output alias, when selected.
    pub alias: Option<String>,
}

impl ContextColumn {
    pub fn new(node: NodeIndex, member: impl Into<String>, column: impl Into<String>) -> Self {
        ContextColumn {
            node,
            member: member.into(),
            column: column.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Same storage column, ignoring the alias.
    pub fn same_column(&self, other: &ContextColumn) -> bool {
        self.node == other.node && self.column == other.column
    }
}

impl fmt::Display for ContextColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}.{}", self.node, self.column)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}
