//! Context graph.
//!
//! [`Context`] lazily materializes the part of the relationship graph a
//! query or write touches. Nodes live in one arena and refer to each other
//! by [`NodeIndex`]:
//!
//! ```text
//! Order (t0)
//! ├─ Customer (t1)          forward, inner
//! │  └─ Region (t3)         forward, left (nullable FK)
//! ├─ [Status] (t2)          lookup, inner
//! └─ Lines (t4)             inverse, left
//! ```
//!
//! Every distinct navigation path maps to exactly one node. Paths are only
//! ever added, never removed, so indices stay valid for the context's life.
//! A context is owned by the single call that builds it and is not shared
//! between concurrent planning calls.

mod column;
pub mod errors;
mod node;

pub use column::ContextColumn;
pub use errors::ContextError;
pub use node::{ChildKey, ContextNode, JoinClass, NodeIndex, NodeLink, Traversal};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::mapping_catalog::{ColumnMap, MappingError, MappingProvider, TableMap};

pub const ROOT: NodeIndex = 0;

#[derive(Debug, Clone)]
pub struct Context {
    mapping: Arc<dyn MappingProvider>,
    nodes: Vec<ContextNode>,
}

impl Context {
    /// Create a context rooted at `entity`, with its lookup nodes.
    pub fn new(mapping: Arc<dyn MappingProvider>, entity: &str) -> Result<Self, ContextError> {
        let table = mapping.require_table_map(entity)?.table.clone();
        let mut context = Context {
            mapping,
            nodes: vec![ContextNode {
                index: ROOT,
                entity: entity.to_string(),
                table,
                level: 0,
                link: None,
                join_class: JoinClass::Inner,
                children: HashMap::new(),
            }],
        };
        context.create_lookup_nodes_if_not_exist(ROOT)?;
        Ok(context)
    }

    pub fn mapping(&self) -> &Arc<dyn MappingProvider> {
        &self.mapping
    }

    pub fn root(&self) -> &ContextNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, index: NodeIndex) -> Result<&ContextNode, ContextError> {
        self.nodes
            .get(index)
            .ok_or(ContextError::NodeOutOfRange(index))
    }

    pub fn nodes(&self) -> &[ContextNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn table_map(&self, index: NodeIndex) -> Result<&TableMap, ContextError> {
        let node = self.node(index)?;
        Ok(self.mapping.require_table_map(&node.entity)?)
    }

    /// Mapping of the column a context column points at.
    pub fn column_map(&self, column: &ContextColumn) -> Result<&ColumnMap, ContextError> {
        Ok(self
            .table_map(column.node)?
            .require_column(&column.member)?)
    }

    /// Ensure every node along `path` (relative to the root) exists and
    /// return the last one.
    pub fn add_path(&mut self, path: &str) -> Result<NodeIndex, ContextError> {
        self.add_path_from(ROOT, path)
    }

    /// Ensure every node along `path` (relative to `start`) exists and
    /// return the last one. An empty path yields `start`.
    pub fn add_path_from(&mut self, start: NodeIndex, path: &str) -> Result<NodeIndex, ContextError> {
        self.node(start)?;
        let mut current = start;
        for segment in split_path(path)? {
            current = match self.nodes[current].child(&ChildKey::Navigation(segment.to_string())) {
                Some(existing) => existing,
                None => self.create_navigation_node(current, segment, path)?,
            };
        }
        Ok(current)
    }

    fn create_navigation_node(
        &mut self,
        origin: NodeIndex,
        member: &str,
        path: &str,
    ) -> Result<NodeIndex, ContextError> {
        let origin_entity = self.nodes[origin].entity.clone();
        let origin_map = self.mapping.require_table_map(&origin_entity)?;
        let relationship = origin_map.relationship(member).ok_or_else(|| {
            ContextError::UnknownNavigation {
                entity: origin_entity.clone(),
                member: member.to_string(),
                path: path.to_string(),
            }
        })?;

        let inverse = relationship.is_inverse_from(&origin_entity);
        let target_entity = relationship.target_entity(&origin_entity).to_string();
        let (traversal, origin_member, node_member, fk) = if inverse {
            (
                Traversal::Inverse,
                relationship.primary_key.member.clone(),
                relationship.foreign_key.member.clone(),
                &relationship.foreign_key,
            )
        } else {
            (
                Traversal::Forward,
                relationship.foreign_key.member.clone(),
                relationship.primary_key.member.clone(),
                &relationship.foreign_key,
            )
        };
        let nullable = self
            .mapping
            .require_table_map(&fk.entity)?
            .require_column(&fk.member)?
            .nullable;

        let link = NodeLink {
            origin,
            key: ChildKey::Navigation(member.to_string()),
            traversal,
            origin_member,
            node_member,
            nullable,
        };
        let index = self.push_node(&target_entity, link)?;
        self.create_lookup_nodes_if_not_exist(index)?;
        Ok(index)
    }

    /// Eagerly create a lookup child for every lookup column of `index`, so
    /// lookup values can be selected and filtered like plain columns.
    pub fn create_lookup_nodes_if_not_exist(&mut self, index: NodeIndex) -> Result<(), ContextError> {
        let entity = self.node(index)?.entity.clone();
        let lookups: Vec<(String, bool, String)> = self
            .mapping
            .require_table_map(&entity)?
            .lookup_columns()
            .filter_map(|c| {
                c.lookup
                    .as_ref()
                    .map(|l| (c.member.clone(), c.nullable, l.entity.clone()))
            })
            .collect();

        for (member, nullable, lookup_entity) in lookups {
            let key = ChildKey::Lookup(member.clone());
            if self.nodes[index].child(&key).is_some() {
                continue;
            }
            let key_member = self
                .mapping
                .require_table_map(&lookup_entity)?
                .single_primary_key()?
                .member
                .clone();
            let link = NodeLink {
                origin: index,
                key,
                traversal: Traversal::Lookup,
                origin_member: member,
                node_member: key_member,
                nullable,
            };
            self.push_node(&lookup_entity, link)?;
        }
        Ok(())
    }

    fn push_node(&mut self, entity: &str, link: NodeLink) -> Result<NodeIndex, ContextError> {
        let table = self.mapping.require_table_map(entity)?.table.clone();
        let origin = &self.nodes[link.origin];
        let join_class = if origin.join_class == JoinClass::Left
            || link.traversal == Traversal::Inverse
            || link.nullable
        {
            JoinClass::Left
        } else {
            JoinClass::Inner
        };
        let index = self.nodes.len();
        let level = origin.level + 1;
        let key = link.key.clone();
        let origin_index = link.origin;
        log::debug!(
            "context: node t{} {} ({:?}) from t{} via {}",
            index,
            entity,
            link.traversal,
            origin_index,
            key.member()
        );
        self.nodes.push(ContextNode {
            index,
            entity: entity.to_string(),
            table,
            level,
            link: Some(link),
            join_class,
            children: HashMap::new(),
        });
        self.nodes[origin_index].children.insert(key, index);
        Ok(index)
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeIndex> {
        self.find_by_path_from(ROOT, path)
    }

    /// Pure lookup: `None` when a segment has not been materialized yet
    /// (or the path is malformed).
    pub fn find_by_path_from(&self, start: NodeIndex, path: &str) -> Option<NodeIndex> {
        self.get_all_nodes_in_path(start, path)
            .map(|nodes| nodes.last().copied().unwrap_or(start))
    }

    /// Nodes reached by each segment of `path`, in order (excluding `start`).
    pub fn get_all_nodes_in_path(&self, start: NodeIndex, path: &str) -> Option<Vec<NodeIndex>> {
        let segments = split_path(path).ok()?;
        let mut current = self.nodes.get(start)?;
        let mut found = Vec::with_capacity(segments.len());
        for segment in segments {
            let next = current.child(&ChildKey::Navigation(segment.to_string()))?;
            found.push(next);
            current = &self.nodes[next];
        }
        Some(found)
    }

    /// Resolve `member` on `index` to the column that actually stores it.
    ///
    /// Lookup columns resolve to the lookup node's value column. A primary
    /// key reached through a forward or lookup link resolves to the foreign
    /// key on the origin, since that is where the value is stored.
    pub fn resolve_member_to_column(
        &self,
        index: NodeIndex,
        member: &str,
    ) -> Result<ContextColumn, ContextError> {
        self.resolve_member_within(index, member, ROOT)
    }

    /// Like [`Context::resolve_member_to_column`], but never redirects a key
    /// above `boundary`: a query targeted at `boundary` reads its own key
    /// from its own table.
    pub fn resolve_member_within(
        &self,
        index: NodeIndex,
        member: &str,
        boundary: NodeIndex,
    ) -> Result<ContextColumn, ContextError> {
        let node = self.node(index)?;
        let table = self.mapping.require_table_map(&node.entity)?;
        let Some(column) = table.column(member) else {
            if table.relationship(member).is_some() {
                return Err(ContextError::UnresolvableMember {
                    entity: node.entity.clone(),
                    member: member.to_string(),
                });
            }
            return Err(MappingError::unknown_member(&node.entity, member).into());
        };

        if let Some(lookup) = &column.lookup {
            let lookup_node = node
                .child(&ChildKey::Lookup(member.to_string()))
                .ok_or_else(|| ContextError::UnresolvableMember {
                    entity: node.entity.clone(),
                    member: member.to_string(),
                })?;
            let value = self
                .mapping
                .require_table_map(&lookup.entity)?
                .require_column(&lookup.value_member)?;
            return Ok(ContextColumn::new(
                lookup_node,
                value.member.clone(),
                value.column.clone(),
            ));
        }

        if column.primary_key && index != boundary {
            if let Some(link) = &node.link {
                if link.traversal != Traversal::Inverse && link.node_member == member {
                    let origin = self.table_map(link.origin)?;
                    let fk = origin.require_column(&link.origin_member)?;
                    return Ok(ContextColumn::new(
                        link.origin,
                        fk.member.clone(),
                        fk.column.clone(),
                    ));
                }
            }
        }

        Ok(ContextColumn::new(index, column.member.clone(), column.column.clone()))
    }

    /// Resolve `Nav.Nav.Member` relative to `start`, creating the navigation
    /// nodes on the way.
    pub fn resolve_path_to_column(
        &mut self,
        start: NodeIndex,
        path: &str,
    ) -> Result<ContextColumn, ContextError> {
        let (node_path, member) = split_member(path)?;
        let node = self.add_path_from(start, node_path)?;
        self.resolve_member_within(node, member, start)
    }

    /// Nodes from `index` up to (excluding) `stop`, nearest first. Stops at
    /// the root when `stop` is not an ancestor.
    pub fn ancestors_until(&self, index: NodeIndex, stop: NodeIndex) -> Vec<NodeIndex> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(index).and_then(ContextNode::origin);
        while let Some(i) = current {
            if i == stop {
                break;
            }
            chain.push(i);
            current = self.nodes[i].origin();
        }
        chain
    }

    /// Whether `ancestor` lies on the path from the root to `index`
    /// (a node is its own ancestor).
    pub fn is_ancestor_or_self(&self, ancestor: NodeIndex, index: NodeIndex) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes.get(i).and_then(ContextNode::origin);
        }
        false
    }

    /// Dotted navigation path from the root (lookup hops shown in brackets).
    pub fn path_of(&self, index: NodeIndex) -> String {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(index);
        while let Some(node) = current {
            match &node.link {
                Some(link) => {
                    segments.push(match &link.key {
                        ChildKey::Navigation(m) => m.clone(),
                        ChildKey::Lookup(m) => format!("[{}]", m),
                    });
                    current = self.nodes.get(link.origin);
                }
                None => current = None,
            }
        }
        segments.reverse();
        segments.join(".")
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let path = self.path_of(node.index);
            writeln!(
                f,
                "{:indent$}t{} {} {} {:?}{}",
                "",
                node.index,
                node.entity,
                if path.is_empty() { "<root>" } else { path.as_str() },
                node.join_class,
                if node.is_inverse() { " inverse" } else { "" },
                indent = node.level * 2
            )?;
        }
        Ok(())
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, ContextError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ContextError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Split `A.B.Member` into (`A.B`, `Member`).
pub fn split_member(path: &str) -> Result<(&str, &str), ContextError> {
    let (node_path, member) = match path.rsplit_once('.') {
        Some((prefix, member)) => (prefix, member),
        None => ("", path),
    };
    if member.is_empty() {
        return Err(ContextError::InvalidPath(path.to_string()));
    }
    Ok((node_path, member))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_catalog::testing::sales_catalog;

    fn order_context() -> Context {
        Context::new(sales_catalog(), "Order").unwrap()
    }

    #[test]
    fn test_root_gets_lookup_nodes() {
        let ctx = order_context();
        assert_eq!(ctx.len(), 2);
        let status = ctx.root().child(&ChildKey::Lookup("Status".into())).unwrap();
        let node = ctx.node(status).unwrap();
        assert_eq!(node.entity, "OrderStatus");
        assert!(node.is_lookup());
        assert_eq!(node.level, 1);
        assert_eq!(node.join_class, JoinClass::Inner);
    }

    #[test]
    fn test_add_path_is_idempotent() {
        let mut ctx = order_context();
        let a = ctx.add_path("Customer.Region").unwrap();
        let b = ctx.add_path("Customer.Region").unwrap();
        let customer = ctx.add_path("Customer").unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.node(a).unwrap().origin(), Some(customer));
        assert_eq!(ctx.len(), 4);
    }

    #[test]
    fn test_node_uniqueness_independent_of_order() {
        let paths = [
            "Lines.Product.Supplier",
            "Customer",
            "Lines",
            "Customer.Region",
            "Lines.Product",
            "Notes",
        ];
        let mut forward = order_context();
        for p in &paths {
            forward.add_path(p).unwrap();
        }
        let mut backward = order_context();
        for p in paths.iter().rev() {
            backward.add_path(p).unwrap();
            backward.add_path(p).unwrap();
        }
        assert_eq!(forward.len(), backward.len());
        for p in &paths {
            let a = forward.find_by_path(p).unwrap();
            let b = backward.find_by_path(p).unwrap();
            assert_eq!(forward.path_of(a), backward.path_of(b));
            assert_eq!(forward.path_of(a), *p);
        }
    }

    #[test]
    fn test_inverse_and_left_propagation() {
        let mut ctx = order_context();
        let lines = ctx.add_path("Lines").unwrap();
        let product = ctx.add_path("Lines.Product").unwrap();
        let customer = ctx.add_path("Customer").unwrap();
        let region = ctx.add_path("Customer.Region").unwrap();

        assert!(ctx.node(lines).unwrap().is_inverse());
        assert_eq!(ctx.node(lines).unwrap().join_class, JoinClass::Left);
        // Product FK is required, but the origin is already a left join.
        assert_eq!(ctx.node(product).unwrap().join_class, JoinClass::Left);
        assert_eq!(ctx.node(customer).unwrap().join_class, JoinClass::Inner);
        // Nullable FK.
        assert_eq!(ctx.node(region).unwrap().join_class, JoinClass::Left);
    }

    #[test]
    fn test_unknown_navigation_is_configuration_error() {
        let mut ctx = order_context();
        let err = ctx.add_path("Customer.Nope").unwrap_err();
        assert_eq!(
            err,
            ContextError::UnknownNavigation {
                entity: "Customer".into(),
                member: "Nope".into(),
                path: "Customer.Nope".into()
            }
        );
        assert!(matches!(
            ctx.add_path("Customer..Region"),
            Err(ContextError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_find_by_path_does_not_create() {
        let mut ctx = order_context();
        assert_eq!(ctx.find_by_path("Customer"), None);
        assert_eq!(ctx.get_all_nodes_in_path(ROOT, "Customer.Region"), None);
        let region = ctx.add_path("Customer.Region").unwrap();
        let all = ctx.get_all_nodes_in_path(ROOT, "Customer.Region").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(*all.last().unwrap(), region);
        assert_eq!(ctx.find_by_path(""), Some(ROOT));
    }

    #[test]
    fn test_lookup_member_resolves_to_label() {
        let ctx = order_context();
        let col = ctx.resolve_member_to_column(ROOT, "Status").unwrap();
        let node = ctx.node(col.node).unwrap();
        assert_eq!(node.entity, "OrderStatus");
        assert_eq!(col.column, "label");
    }

    #[test]
    fn test_related_key_redirects_to_foreign_key() {
        let mut ctx = order_context();
        let col = ctx.resolve_path_to_column(ROOT, "Customer.Id").unwrap();
        assert_eq!(col, ContextColumn::new(ROOT, "CustomerId", "customer_id"));

        // Root keys and inverse keys stay where they are.
        let own = ctx.resolve_member_to_column(ROOT, "Id").unwrap();
        assert_eq!(own, ContextColumn::new(ROOT, "Id", "id"));
        let lines = ctx.add_path("Lines").unwrap();
        let line_id = ctx.resolve_member_to_column(lines, "Id").unwrap();
        assert_eq!(line_id.node, lines);
    }

    #[test]
    fn test_key_not_redirected_above_boundary() {
        let mut ctx = order_context();
        let customer = ctx.add_path("Customer").unwrap();
        let own = ctx.resolve_path_to_column(customer, "Id").unwrap();
        assert_eq!(own, ContextColumn::new(customer, "Id", "id"));
        let region_id = ctx.resolve_path_to_column(customer, "Region.Id").unwrap();
        assert_eq!(region_id, ContextColumn::new(customer, "RegionId", "region_id"));
    }

    #[test]
    fn test_collection_member_is_not_a_column() {
        let ctx = order_context();
        assert!(matches!(
            ctx.resolve_member_to_column(ROOT, "Lines"),
            Err(ContextError::UnresolvableMember { .. })
        ));
        assert_eq!(
            ctx.resolve_member_to_column(ROOT, "Bogus").unwrap_err(),
            ContextError::Mapping(MappingError::unknown_member("Order", "Bogus"))
        );
    }

    #[test]
    fn test_self_reference() {
        let mut ctx = Context::new(sales_catalog(), "Employee").unwrap();
        let manager = ctx.add_path("Manager").unwrap();
        let reports = ctx.add_path("Reports").unwrap();
        assert!(!ctx.node(manager).unwrap().is_inverse());
        assert!(ctx.node(reports).unwrap().is_inverse());
        let link = ctx.node(reports).unwrap().link.clone().unwrap();
        assert_eq!(link.origin_member, "Id");
        assert_eq!(link.node_member, "ManagerId");
    }

    #[test]
    fn test_ancestors_until() {
        let mut ctx = Context::new(sales_catalog(), "OrderLine").unwrap();
        let country = ctx.add_path("Product.Supplier.Country").unwrap();
        let product = ctx.find_by_path("Product").unwrap();
        let supplier = ctx.find_by_path("Product.Supplier").unwrap();
        assert_eq!(ctx.ancestors_until(country, ROOT), vec![supplier, product]);
        assert_eq!(ctx.ancestors_until(country, product), vec![supplier]);
        assert!(ctx.is_ancestor_or_self(product, country));
        assert!(!ctx.is_ancestor_or_self(country, product));
    }
}
