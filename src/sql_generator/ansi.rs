use super::errors::WriterError;
use super::{Statement, StatementWriter};
use crate::context_graph::ContextColumn;
use crate::query_planner::{
    BinaryOperator, FilterGraph, JoinDescription, KeyRestriction, Modifiers, OrderTerm,
    QueryContext,
};
use crate::types::Value;
use crate::write_cascade::{OperationContext, OperationKind};

/// Pagination syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m` (SQLite, PostgreSQL, MySQL).
    #[default]
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY` (SQL:2008).
    OffsetFetch,
}

/// Reference writer: double-quoted identifiers, `?` placeholders,
/// `RETURNING` for generated keys.
#[derive(Debug, Clone, Default)]
pub struct AnsiSqlWriter {
    pub limit_style: LimitStyle,
}

impl AnsiSqlWriter {
    pub fn new(limit_style: LimitStyle) -> Self {
        AnsiSqlWriter { limit_style }
    }

    fn render_limits(&self, modifiers: &Modifiers) -> Option<String> {
        let limit = modifiers.limit();
        let skip = modifiers.skip;
        match self.limit_style {
            LimitStyle::LimitOffset => match (limit, skip) {
                (None, None) => None,
                (Some(n), None) => Some(format!("LIMIT {}", n)),
                (Some(n), Some(m)) => Some(format!("LIMIT {} OFFSET {}", n, m)),
                (None, Some(m)) => Some(format!("LIMIT -1 OFFSET {}", m)),
            },
            LimitStyle::OffsetFetch => match (limit, skip) {
                (None, None) => None,
                (Some(n), None) => Some(format!("FETCH FIRST {} ROWS ONLY", n)),
                (Some(n), Some(m)) => {
                    Some(format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", m, n))
                }
                (None, Some(m)) => Some(format!("OFFSET {} ROWS", m)),
            },
        }
    }
}

/// Fragment rendering; literals are appended to `params` as placeholders
/// are emitted, so call order is parameter order.
trait ToSql {
    fn to_sql(&self, params: &mut Vec<Value>) -> String;
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

impl ToSql for ContextColumn {
    fn to_sql(&self, _params: &mut Vec<Value>) -> String {
        format!("t{}.{}", self.node, quote(&self.column))
    }
}

impl ToSql for FilterGraph {
    fn to_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            FilterGraph::Column(column) => column.to_sql(params),
            FilterGraph::Literal(value) => {
                params.push(value.clone());
                "?".to_string()
            }
            FilterGraph::Binary { op, left, right } => {
                let null_test = match (op, left.as_ref(), right.as_ref()) {
                    (BinaryOperator::Eq, operand, FilterGraph::Literal(Value::Null))
                    | (BinaryOperator::Eq, FilterGraph::Literal(Value::Null), operand) => {
                        Some((operand, "IS NULL"))
                    }
                    (BinaryOperator::NotEq, operand, FilterGraph::Literal(Value::Null))
                    | (BinaryOperator::NotEq, FilterGraph::Literal(Value::Null), operand) => {
                        Some((operand, "IS NOT NULL"))
                    }
                    _ => None,
                };
                if let Some((operand, test)) = null_test {
                    return format!("{} {}", operand.to_sql(params), test);
                }
                let left = left.to_sql(params);
                let right = right.to_sql(params);
                format!("({} {} {})", left, op.as_sql(), right)
            }
        }
    }
}

impl ToSql for JoinDescription {
    fn to_sql(&self, _params: &mut Vec<Value>) -> String {
        format!(
            "{} {} AS t{} ON t{}.{} = t{}.{}",
            self.join_type.as_sql(),
            quote(&self.table),
            self.node,
            self.node,
            quote(&self.node_column),
            self.source,
            quote(&self.source_column)
        )
    }
}

impl ToSql for KeyRestriction {
    fn to_sql(&self, params: &mut Vec<Value>) -> String {
        if self.keys.is_empty() {
            return "1 = 0".to_string();
        }
        params.extend(self.keys.iter().cloned());
        let placeholders = vec!["?"; self.keys.len()].join(", ");
        format!("{} IN ({})", self.column.to_sql(params), placeholders)
    }
}

impl ToSql for OrderTerm {
    fn to_sql(&self, params: &mut Vec<Value>) -> String {
        format!("{} {}", self.column.to_sql(params), self.direction.as_sql())
    }
}

impl StatementWriter for AnsiSqlWriter {
    fn write_query(&self, query: &QueryContext) -> Result<Statement, WriterError> {
        if query.select.is_empty() {
            return Err(WriterError::EmptySelect {
                entity: query.base.entity.clone(),
            });
        }
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");
        if query.modifiers.distinct {
            sql.push_str("DISTINCT ");
        }
        let columns: Vec<String> = query
            .select
            .iter()
            .map(|c| match &c.alias {
                Some(alias) => format!("{} AS {}", c.to_sql(&mut params), quote(alias)),
                None => c.to_sql(&mut params),
            })
            .collect();
        sql.push_str(&columns.join(", "));
        sql.push_str(&format!(
            " FROM {} AS t{}",
            quote(&query.base.table),
            query.base.node
        ));
        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql(&mut params));
        }

        let mut conditions = Vec::new();
        if let Some(filter) = &query.filter {
            conditions.push(filter.to_sql(&mut params));
        }
        if let Some(restriction) = &query.key_restriction {
            conditions.push(restriction.to_sql(&mut params));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !query.order_by.is_empty() {
            let terms: Vec<String> = query
                .order_by
                .iter()
                .map(|o| o.to_sql(&mut params))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limits) = self.render_limits(&query.modifiers) {
            sql.push(' ');
            sql.push_str(&limits);
        }

        Ok(Statement {
            sql,
            parameters: params,
        })
    }

    fn write_operation(&self, operation: &OperationContext) -> Result<Statement, WriterError> {
        let table = quote(&operation.table);
        let mut params = Vec::new();
        let sql = match operation.kind {
            OperationKind::Insert => {
                let mut sql = if operation.assignments.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES", table)
                } else {
                    let columns: Vec<String> =
                        operation.assignments.iter().map(|a| quote(&a.column)).collect();
                    params.extend(operation.assignments.iter().map(|a| a.value.clone()));
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        table,
                        columns.join(", "),
                        vec!["?"; columns.len()].join(", ")
                    )
                };
                if let Some(returning) = &operation.returning {
                    sql.push_str(&format!(" RETURNING {}", quote(returning)));
                }
                sql
            }
            OperationKind::Update | OperationKind::Patch | OperationKind::Detach => {
                if operation.assignments.is_empty() {
                    return Err(WriterError::EmptyAssignments {
                        kind: operation.kind.to_string(),
                        entity: operation.entity.clone(),
                    });
                }
                let key = self.require_key(operation)?;
                let sets: Vec<String> = operation
                    .assignments
                    .iter()
                    .map(|a| format!("{} = ?", quote(&a.column)))
                    .collect();
                params.extend(operation.assignments.iter().map(|a| a.value.clone()));
                params.push(key.value.clone());
                format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    table,
                    sets.join(", "),
                    quote(&key.column)
                )
            }
            OperationKind::Delete => {
                let key = self.require_key(operation)?;
                params.push(key.value.clone());
                format!("DELETE FROM {} WHERE {} = ?", table, quote(&key.column))
            }
        };
        Ok(Statement {
            sql,
            parameters: params,
        })
    }
}

impl AnsiSqlWriter {
    fn require_key<'o>(
        &self,
        operation: &'o OperationContext,
    ) -> Result<&'o crate::write_cascade::Assignment, WriterError> {
        operation.key.as_ref().ok_or_else(|| WriterError::MissingKey {
            kind: operation.kind.to_string(),
            entity: operation.entity.clone(),
        })
    }
}
