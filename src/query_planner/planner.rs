//! Query Planner.
//!
//! Turns a [`QueryRequest`] against one target node into a [`QueryContext`]
//! a statement writer can render as exactly one statement:
//!
//! 1. compute the select list (projection template, or target columns plus
//!    flattened includes),
//! 2. collect the nodes referenced by select, filter and (outer scope only)
//!    ordering,
//! 3. order them, filter-only nodes first, then by level,
//! 4. close the set under ancestry up to the target,
//! 5. take the first node as the `FROM` base,
//! 6. walk outward from the base to emit the joins.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::errors::PlannerError;
use super::filter::{FilterGraph, FilterProcessor};
use super::query_context::{
    JoinDescription, JoinType, KeyRestriction, Modifiers, OrderTerm, QueryContext, QueryRequest,
    Selection, TableSource,
};
use super::strategy::{self, ExecutionStrategy, KEY_ALIAS};
use crate::context_graph::{Context, ContextColumn, ContextError, NodeIndex, Traversal};

/// Whether the statement is the outermost one. Ordering only applies to
/// the outer statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    Outer,
    Nested,
}

/// Plan of a child query loading one included collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludePlan {
    /// Include path, relative to the root query's target.
    pub path: String,
    /// Path of the record set holding the parent rows (`""` for the root).
    pub parent: String,
    /// Alias of the parent key in the parent record set.
    pub parent_key_alias: String,
    /// Alias of the foreign key in this plan's select list.
    pub foreign_key_alias: String,
    /// Child query, restricted to `foreign key IN (parent keys)`.
    pub plan: QueryContext,
}

struct BoundQuery {
    select: Vec<ContextColumn>,
    filter: Option<FilterGraph>,
    order_by: Vec<OrderTerm>,
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    /// Joined through its own link from an already-joined origin.
    FromOrigin(NodeIndex),
    /// Joined as the origin of an already-joined child (keys swapped).
    FromChild(NodeIndex),
}

pub struct QueryPlanner<'a> {
    context: &'a mut Context,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(context: &'a mut Context) -> Self {
        QueryPlanner { context }
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    /// Plan a single statement.
    pub fn plan(
        &mut self,
        target: NodeIndex,
        request: &QueryRequest,
        scope: PlanScope,
    ) -> Result<QueryContext, PlannerError> {
        validate_modifiers(request, scope)?;
        let bound = self.bind(target, request, scope)?;
        self.assemble(
            target,
            bound.select,
            bound.filter,
            bound.order_by,
            request.modifiers.clone(),
            None,
        )
    }

    /// Plan the outer query and pick its execution strategy.
    pub fn plan_execution(
        &mut self,
        target: NodeIndex,
        request: &QueryRequest,
    ) -> Result<ExecutionStrategy, PlannerError> {
        validate_modifiers(request, PlanScope::Outer)?;
        let bound = self.bind(target, request, PlanScope::Outer)?;
        let direct = self.assemble(
            target,
            bound.select.clone(),
            bound.filter.clone(),
            bound.order_by.clone(),
            request.modifiers.clone(),
            None,
        )?;
        if !strategy::requires_two_phase(&direct) {
            log::debug!("planner: direct strategy for t{}", target);
            return Ok(ExecutionStrategy::Direct(direct));
        }

        log::debug!(
            "planner: two-phase strategy for t{} (inverted nodes {:?})",
            target,
            direct.inverted_nodes
        );
        let mut key_select = vec![direct.target_key.clone().with_alias(KEY_ALIAS)];
        key_select.extend(
            bound
                .order_by
                .iter()
                .enumerate()
                .map(|(i, term)| term.column.clone().with_alias(format!("__order{}", i))),
        );
        let keys = self.assemble(
            target,
            key_select,
            bound.filter,
            bound.order_by.clone(),
            Modifiers {
                distinct: true,
                ..request.modifiers.clone()
            },
            None,
        )?;
        let restriction = KeyRestriction {
            column: direct.target_key.clone(),
            keys: Vec::new(),
        };
        let rows = self.assemble(
            target,
            bound.select,
            None,
            bound.order_by,
            Modifiers {
                distinct: request.modifiers.distinct,
                ..Modifiers::default()
            },
            Some(restriction),
        )?;
        Ok(ExecutionStrategy::TwoPhase { keys, rows })
    }

    /// Plan one child query per included collection, recursively, below the
    /// already planned `parent` query.
    pub fn plan_includes(
        &mut self,
        parent: &QueryContext,
        includes: &[String],
    ) -> Result<Vec<IncludePlan>, PlannerError> {
        self.plan_includes_from(parent, "", includes)
    }

    fn plan_includes_from(
        &mut self,
        parent: &QueryContext,
        parent_path: &str,
        includes: &[String],
    ) -> Result<Vec<IncludePlan>, PlannerError> {
        // Collection node -> (path from parent target, parent key alias, nested includes)
        let mut collections: Vec<(NodeIndex, String, String, Vec<String>)> = Vec::new();
        for include in includes {
            let segments = include_segments(include)?;
            let mut current = parent.target;
            let mut prefix: Vec<&str> = Vec::new();
            for (i, segment) in segments.iter().enumerate() {
                let origin = current;
                current = self.context.add_path_from(current, segment)?;
                if !self.context.node(current)?.is_inverse() {
                    prefix.push(*segment);
                    continue;
                }

                let key = self.context.table_map(origin)?.single_primary_key()?.member.clone();
                let parent_key_alias = alias_for(&prefix.join("."), &key);
                if parent.column_position(&parent_key_alias).is_none() {
                    return Err(PlannerError::MissingParentKey {
                        path: include.clone(),
                        alias: parent_key_alias,
                    });
                }
                let rest = segments[i + 1..].join(".");
                let collection_path = segments[..=i].join(".");
                match collections.iter_mut().find(|entry| entry.0 == current) {
                    Some((_, _, _, nested)) => {
                        if !rest.is_empty() {
                            nested.push(rest);
                        }
                    }
                    None => collections.push((
                        current,
                        collection_path,
                        parent_key_alias,
                        if rest.is_empty() { vec![] } else { vec![rest] },
                    )),
                }
                break;
            }
        }

        let mut plans = Vec::new();
        for (node, path, parent_key_alias, nested) in collections {
            let full_path = alias_for(parent_path, &path);
            let link = self
                .context
                .node(node)?
                .link
                .clone()
                .ok_or(ContextError::NodeOutOfRange(node))?;
            let fk_column = self.column_name(node, &link.node_member)?;
            let foreign_key = ContextColumn::new(node, link.node_member.clone(), fk_column);

            let mut select = self.all_columns(node, &nested)?;
            if select.iter().all(|c| c.alias.as_deref() != Some(link.node_member.as_str())) {
                select.push(foreign_key.clone().with_alias(link.node_member.clone()));
            }
            let plan = self.assemble(
                node,
                select,
                None,
                Vec::new(),
                Modifiers::default(),
                Some(KeyRestriction {
                    column: foreign_key,
                    keys: Vec::new(),
                }),
            )?;
            log::debug!(
                "planner: include `{}` loads t{} by {} from `{}`",
                full_path,
                node,
                link.node_member,
                parent_key_alias
            );

            let children = self.plan_includes_from(&plan, &full_path, &nested)?;
            plans.push(IncludePlan {
                path: full_path,
                parent: parent_path.to_string(),
                parent_key_alias,
                foreign_key_alias: link.node_member,
                plan,
            });
            plans.extend(children);
        }
        Ok(plans)
    }

    fn bind(
        &mut self,
        target: NodeIndex,
        request: &QueryRequest,
        scope: PlanScope,
    ) -> Result<BoundQuery, PlannerError> {
        self.context.node(target)?;
        let select = match &request.selection {
            Selection::Projection(entries) if !entries.is_empty() => {
                let mut select = Vec::with_capacity(entries.len());
                for entry in entries {
                    let column = self.context.resolve_path_to_column(target, &entry.path)?;
                    select.push(column.with_alias(entry.alias.clone()));
                }
                select
            }
            Selection::Projection(_) => self.all_columns(target, &[])?,
            Selection::AllColumns { includes } => self.all_columns(target, includes)?,
        };

        let filter = match &request.filter {
            Some(expr) => Some(FilterProcessor::new(self.context, target).bind(expr)?),
            None => None,
        };

        let mut order_by = Vec::new();
        if scope == PlanScope::Outer {
            for term in &request.order_by {
                order_by.push(OrderTerm {
                    column: self.context.resolve_path_to_column(target, &term.path)?,
                    direction: term.direction,
                });
            }
        }

        Ok(BoundQuery {
            select,
            filter,
            order_by,
        })
    }

    /// Target columns plus the columns of every included path, stopping at
    /// the first one-to-many node of each path.
    fn all_columns(
        &mut self,
        target: NodeIndex,
        includes: &[String],
    ) -> Result<Vec<ContextColumn>, PlannerError> {
        let mut select = Vec::new();
        self.push_entity_columns(target, target, "", &mut select)?;
        for include in includes {
            let mut current = target;
            let mut prefix = String::new();
            for segment in include_segments(include)? {
                current = self.context.add_path_from(current, segment)?;
                if self.context.node(current)?.is_inverse() {
                    break;
                }
                prefix = alias_for(&prefix, segment);
                self.push_entity_columns(current, target, &prefix, &mut select)?;
            }
        }
        Ok(select)
    }

    fn push_entity_columns(
        &self,
        node: NodeIndex,
        boundary: NodeIndex,
        prefix: &str,
        select: &mut Vec<ContextColumn>,
    ) -> Result<(), PlannerError> {
        let table = self.context.table_map(node)?;
        for column in table
            .columns
            .iter()
            .filter(|c| (c.selectable || c.primary_key) && !c.shadow)
        {
            let alias = alias_for(prefix, &column.member);
            if select.iter().any(|c| c.alias.as_deref() == Some(alias.as_str())) {
                continue;
            }
            let resolved = self
                .context
                .resolve_member_within(node, &column.member, boundary)?;
            select.push(resolved.with_alias(alias));
        }
        Ok(())
    }

    fn target_key(&self, target: NodeIndex) -> Result<ContextColumn, PlannerError> {
        let key = self.context.table_map(target)?.single_primary_key()?;
        Ok(ContextColumn::new(
            target,
            key.member.clone(),
            key.column.clone(),
        ))
    }

    fn column_name(&self, node: NodeIndex, member: &str) -> Result<String, PlannerError> {
        Ok(self
            .context
            .table_map(node)?
            .require_column(member)?
            .column
            .clone())
    }

    fn level(&self, node: NodeIndex) -> usize {
        self.context.nodes()[node].level
    }

    fn assemble(
        &self,
        target: NodeIndex,
        select: Vec<ContextColumn>,
        filter: Option<FilterGraph>,
        order_by: Vec<OrderTerm>,
        modifiers: Modifiers,
        key_restriction: Option<KeyRestriction>,
    ) -> Result<QueryContext, PlannerError> {
        let target_key = self.target_key(target)?;

        // Referenced nodes.
        let mut referenced: BTreeSet<NodeIndex> = select.iter().map(|c| c.node).collect();
        referenced.insert(target);
        referenced.extend(order_by.iter().map(|o| o.column.node));
        if let Some(restriction) = &key_restriction {
            referenced.insert(restriction.column.node);
        }
        let filter_nodes = filter.as_ref().map(FilterGraph::nodes).unwrap_or_default();

        // Filter-only nodes first, then everything else, each by level.
        let by_level = |a: &NodeIndex, b: &NodeIndex| {
            self.level(*a).cmp(&self.level(*b)).then(a.cmp(b))
        };
        let mut filter_only: Vec<NodeIndex> = filter_nodes
            .iter()
            .copied()
            .filter(|n| !referenced.contains(n))
            .collect();
        filter_only.sort_by(by_level);
        let mut others: Vec<NodeIndex> = referenced.iter().copied().collect();
        others.sort_by(by_level);

        // Ancestry closure up to the target.
        let mut forced: HashSet<NodeIndex> = filter_only.iter().copied().collect();
        let mut closed: Vec<NodeIndex> = Vec::new();
        for node in filter_only.iter().chain(others.iter()).copied() {
            if !self.context.is_ancestor_or_self(target, node) {
                return Err(PlannerError::unsupported(format!(
                    "t{} is not reachable from the query target t{}",
                    node, target
                )));
            }
            let mut chain = if node == target {
                Vec::new()
            } else {
                self.context.ancestors_until(node, target)
            };
            chain.reverse();
            for ancestor in chain {
                if !closed.contains(&ancestor) {
                    closed.push(ancestor);
                    if forced.contains(&node) {
                        forced.insert(ancestor);
                    }
                }
            }
            if !closed.contains(&node) {
                closed.push(node);
            }
        }

        // Base: the first node of the closed list.
        let base = closed[0];
        if base != target {
            log::debug!("planner: base re-pointed from t{} to t{}", target, base);
        }
        let base_path: HashSet<NodeIndex> = if base == target {
            HashSet::new()
        } else {
            let mut path: HashSet<NodeIndex> =
                self.context.ancestors_until(base, target).into_iter().collect();
            path.insert(target);
            path
        };

        let joins = self.emit_joins(base, &closed, &forced, &base_path)?;
        let inverted_nodes = closed
            .iter()
            .copied()
            .filter(|n| *n != target && self.context.nodes()[*n].is_inverse())
            .collect();

        let base_node = self.context.node(base)?;
        Ok(QueryContext {
            target,
            target_key,
            base: TableSource {
                node: base,
                entity: base_node.entity.clone(),
                table: base_node.table.clone(),
            },
            select,
            joins,
            filter,
            key_restriction,
            order_by,
            modifiers,
            inverted_nodes,
        })
    }

    /// Walk outward from the base over tree edges, in `closed` priority.
    fn emit_joins(
        &self,
        base: NodeIndex,
        closed: &[NodeIndex],
        forced: &HashSet<NodeIndex>,
        base_path: &HashSet<NodeIndex>,
    ) -> Result<Vec<JoinDescription>, PlannerError> {
        let nodes = self.context.nodes();
        let mut rendered: HashMap<NodeIndex, JoinType> = HashMap::from([(base, JoinType::Inner)]);
        let mut joins = Vec::with_capacity(closed.len().saturating_sub(1));

        while rendered.len() < closed.len() {
            let next = closed
                .iter()
                .copied()
                .filter(|n| !rendered.contains_key(n))
                .find_map(|n| {
                    if let Some(origin) = nodes[n].origin() {
                        if rendered.contains_key(&origin) {
                            return Some((n, Edge::FromOrigin(origin)));
                        }
                    }
                    rendered
                        .keys()
                        .copied()
                        .find(|j| nodes[*j].origin() == Some(n))
                        .map(|child| (n, Edge::FromChild(child)))
                });
            let Some((node, edge)) = next else {
                return Err(PlannerError::unsupported(
                    "plan nodes do not form a connected join tree",
                ));
            };

            let join = match edge {
                Edge::FromOrigin(origin) => {
                    let link = nodes[node]
                        .link
                        .as_ref()
                        .ok_or(ContextError::NodeOutOfRange(node))?;
                    let join_type = if base_path.contains(&node) || forced.contains(&node) {
                        JoinType::Inner
                    } else if rendered.get(&origin) == Some(&JoinType::Left)
                        || link.traversal == Traversal::Inverse
                        || link.nullable
                    {
                        JoinType::Left
                    } else {
                        JoinType::Inner
                    };
                    JoinDescription {
                        node,
                        table: nodes[node].table.clone(),
                        node_column: self.column_name(node, &link.node_member)?,
                        source: origin,
                        source_column: self.column_name(origin, &link.origin_member)?,
                        join_type,
                    }
                }
                Edge::FromChild(child) => {
                    let link = nodes[child]
                        .link
                        .as_ref()
                        .ok_or(ContextError::NodeOutOfRange(child))?;
                    JoinDescription {
                        node,
                        table: nodes[node].table.clone(),
                        node_column: self.column_name(node, &link.origin_member)?,
                        source: child,
                        source_column: self.column_name(child, &link.node_member)?,
                        join_type: JoinType::Inner,
                    }
                }
            };
            rendered.insert(node, join.join_type);
            joins.push(join);
        }
        Ok(joins)
    }
}

fn validate_modifiers(request: &QueryRequest, scope: PlanScope) -> Result<(), PlannerError> {
    let modifiers = &request.modifiers;
    if modifiers.top.is_some() && modifiers.is_paged() {
        return Err(PlannerError::unsupported(
            "TOP cannot be combined with SKIP/TAKE",
        ));
    }
    if modifiers.is_paged() && (scope == PlanScope::Nested || request.order_by.is_empty()) {
        return Err(PlannerError::unsupported(
            "SKIP/TAKE require an ordering clause",
        ));
    }
    Ok(())
}

fn include_segments(include: &str) -> Result<Vec<&str>, PlannerError> {
    let segments: Vec<&str> = include.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ContextError::InvalidPath(include.to_string()).into());
    }
    Ok(segments)
}

fn alias_for(prefix: &str, member: &str) -> String {
    if prefix.is_empty() {
        member.to_string()
    } else {
        format!("{}.{}", prefix, member)
    }
}
