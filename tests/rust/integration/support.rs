//! SQLite-backed executor and fixtures shared by the integration tests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use relplan::config::PlannerConfig;
use relplan::context_graph::{Context, ROOT};
use relplan::executor::{
    ExecutionError, Executor, NamedRecordSet, QueryRunner, RecordSet, UnitOfWork,
};
use relplan::mapping_catalog::{MappingConfig, MappingProvider};
use relplan::query_planner::{QueryPlanner, QueryRequest};
use relplan::sql_generator::{AnsiSqlWriter, Statement};
use relplan::types::Value;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Connection;

pub const SALES_MAPPING: &str = include_str!("../../fixtures/sales_mapping.yaml");

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE regions (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        region_id INTEGER REFERENCES regions (id),
        tier INTEGER NOT NULL DEFAULT 0,
        active TEXT NOT NULL DEFAULT 'Y'
    );
    CREATE TABLE order_statuses (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_id INTEGER NOT NULL REFERENCES customers (id),
        status_id INTEGER NOT NULL REFERENCES order_statuses (id),
        total_cents INTEGER NOT NULL DEFAULT 0,
        reference TEXT
    );
    CREATE TABLE countries (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
    CREATE TABLE suppliers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        country_id INTEGER NOT NULL REFERENCES countries (id)
    );
    CREATE TABLE products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        supplier_id INTEGER REFERENCES suppliers (id)
    );
    CREATE TABLE order_lines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id INTEGER NOT NULL REFERENCES orders (id),
        product_id INTEGER NOT NULL REFERENCES products (id),
        quantity INTEGER NOT NULL
    );
    CREATE TABLE order_notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id INTEGER REFERENCES orders (id),
        body TEXT NOT NULL
    );
    CREATE TABLE employees (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        manager_id INTEGER REFERENCES employees (id)
    );

    INSERT INTO order_statuses (id, label) VALUES (1, 'Pending'), (2, 'Shipped');
    INSERT INTO regions (id, name) VALUES (1, 'North');
    INSERT INTO customers (id, name, region_id) VALUES (1, 'Globex', 1), (42, 'Initech', NULL);
    INSERT INTO countries (id, name) VALUES (1, 'Norway');
    INSERT INTO suppliers (id, name, country_id) VALUES (1, 'Fjord Supply', 1);
    INSERT INTO products (id, name, supplier_id) VALUES (1, 'Anchor', 1), (2, 'Rope', NULL);
";

pub fn catalog() -> Arc<dyn MappingProvider> {
    Arc::new(
        MappingConfig::from_yaml_str(SALES_MAPPING)
            .and_then(MappingConfig::into_catalog)
            .expect("sales mapping is valid"),
    )
}

/// Executor over one shared in-memory SQLite connection.
#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    /// Fresh database with the sales schema and reference rows.
    pub fn sales() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory database");
        conn.execute_batch(SCHEMA).expect("create sales schema");
        SqliteExecutor {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn run(&self, sql: &str) {
        self.lock().unwrap().execute_batch(sql).expect("seed statement");
    }

    pub fn count(&self, table: &str, condition: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table, condition);
        self.lock()
            .unwrap()
            .query_row(&sql, [], |row| row.get(0))
            .expect("count query")
    }

    pub fn ids(&self, sql: &str) -> Vec<i64> {
        let conn = self.lock().unwrap();
        let mut stmt = conn.prepare(sql).expect("prepare id query");
        let ids = stmt
            .query_map([], |row| row.get(0))
            .expect("run id query")
            .collect::<Result<Vec<i64>, _>>()
            .expect("read ids");
        ids
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ExecutionError> {
        self.conn
            .lock()
            .map_err(|_| ExecutionError::driver("connection mutex poisoned"))
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(*b as i64),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Timestamp(t) => SqliteValue::Text(t.to_rfc3339()),
        Value::Uuid(u) => SqliteValue::Text(u.to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn begin(&mut self) -> Result<(), ExecutionError> {
        self.lock()?
            .execute_batch("BEGIN")
            .map_err(ExecutionError::driver)
    }

    async fn query(&mut self, statement: &Statement) -> Result<RecordSet, ExecutionError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&statement.sql).map_err(ExecutionError::driver)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut records = RecordSet::with_columns(columns);

        let params = rusqlite::params_from_iter(statement.parameters.iter().map(to_sqlite));
        let mut rows = stmt.query(params).map_err(ExecutionError::driver)?;
        while let Some(row) = rows.next().map_err(ExecutionError::driver)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sqlite(row.get_ref(i).map_err(ExecutionError::driver)?));
            }
            records.rows.push(values);
        }
        Ok(records)
    }

    async fn scalar(&mut self, statement: &Statement) -> Result<Value, ExecutionError> {
        let records = self.query(statement).await?;
        records
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or(ExecutionError::NoValue)
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, ExecutionError> {
        let params = rusqlite::params_from_iter(statement.parameters.iter().map(to_sqlite));
        let affected = self
            .lock()?
            .execute(&statement.sql, params)
            .map_err(ExecutionError::driver)?;
        Ok(affected as u64)
    }

    async fn commit(&mut self) -> Result<(), ExecutionError> {
        self.lock()?
            .execute_batch("COMMIT")
            .map_err(ExecutionError::driver)
    }

    async fn rollback(&mut self) -> Result<(), ExecutionError> {
        self.lock()?
            .execute_batch("ROLLBACK")
            .map_err(ExecutionError::driver)
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        if let Ok(conn) = self.lock() {
            if let Err(e) = conn.busy_timeout(timeout) {
                log::warn!("sqlite: cannot set busy timeout: {}", e);
            }
        }
    }
}

/// Plan `request` against `entity`, run it with its includes and commit.
pub async fn load(
    db: &SqliteExecutor,
    entity: &str,
    request: &QueryRequest,
) -> Vec<NamedRecordSet> {
    let mut context = Context::new(catalog(), entity).unwrap();
    let mut planner = QueryPlanner::new(&mut context);
    let strategy = planner.plan_execution(ROOT, request).unwrap();
    let includes = planner
        .plan_includes(strategy.result_plan(), request.includes())
        .unwrap();

    let mut uow = UnitOfWork::begin(db.clone(), &PlannerConfig::default())
        .await
        .unwrap();
    let writer = AnsiSqlWriter::default();
    let sets = QueryRunner::new(uow.handle().clone(), &writer)
        .run_with_includes(&strategy, &includes)
        .await
        .unwrap();
    uow.commit().await.unwrap();
    uow.close().await;
    sets
}

pub fn int_column(records: &RecordSet, column: &str) -> Vec<i64> {
    let index = records
        .column_index(column)
        .unwrap_or_else(|| panic!("no column {} in {:?}", column, records.columns));
    records
        .rows
        .iter()
        .filter_map(|row| row[index].as_i64())
        .collect()
}
