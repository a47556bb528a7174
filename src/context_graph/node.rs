use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index of a node inside one [`super::Context`]. Stable for the lifetime of
/// the context.
pub type NodeIndex = usize;

/// Key under which a child node hangs off its origin.
///
/// Navigation children are reached through a relationship member, lookup
/// children through a column carrying a lookup relationship. Both use the
/// member name, so the variant keeps the two keyspaces apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildKey {
    Navigation(String),
    Lookup(String),
}

impl ChildKey {
    pub fn member(&self) -> &str {
        match self {
            ChildKey::Navigation(m) | ChildKey::Lookup(m) => m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Traversal {
    /// Many-to-one, through a reference member. The origin holds the FK.
    Forward,
    /// One-to-many, through a collection member. The node holds the FK.
    Inverse,
    /// Many-to-one into a lookup table, through a lookup column.
    Lookup,
}

/// Join precedence of a node relative to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinClass {
    Inner,
    Left,
}

/// How a node is attached to its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    pub origin: NodeIndex,
    pub key: ChildKey,
    pub traversal: Traversal,
    /// Member on the origin taking part in the join condition.
    pub origin_member: String,
    /// Member on this node taking part in the join condition.
    pub node_member: String,
    /// Nullability of the connecting foreign key.
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct ContextNode {
    pub index: NodeIndex,
    pub entity: String,
    pub table: String,
    /// `origin.level + 1`; the root is level 0.
    pub level: usize,
    pub link: Option<NodeLink>,
    pub join_class: JoinClass,
    pub(super) children: HashMap<ChildKey, NodeIndex>,
}

impl ContextNode {
    pub fn is_root(&self) -> bool {
        self.link.is_none()
    }

    pub fn origin(&self) -> Option<NodeIndex> {
        self.link.as_ref().map(|l| l.origin)
    }

    pub fn is_inverse(&self) -> bool {
        matches!(
            self.link,
            Some(NodeLink {
                traversal: Traversal::Inverse,
                ..
            })
        )
    }

    pub fn is_lookup(&self) -> bool {
        matches!(
            self.link,
            Some(NodeLink {
                traversal: Traversal::Lookup,
                ..
            })
        )
    }

    pub fn child(&self, key: &ChildKey) -> Option<NodeIndex> {
        self.children.get(key).copied()
    }

    pub fn children(&self) -> impl Iterator<Item = (&ChildKey, NodeIndex)> {
        self.children.iter().map(|(k, v)| (k, *v))
    }

    /// SQL alias used by statement writers for this node.
    pub fn alias(&self) -> String {
        format!("t{}", self.index)
    }
}
