// Integration tests for planned queries against SQLite
use relplan::config::PlannerConfig;
use relplan::context_graph::{Context, ROOT};
use relplan::executor::{QueryRunner, UnitOfWork};
use relplan::query_planner::{
    BinaryOperator, ExecutionStrategy, FilterExpr, PlanScope, QueryPlanner, QueryRequest,
    SortDirection,
};
use relplan::sql_generator::AnsiSqlWriter;
use relplan::types::Value;

use super::support::{catalog, int_column, load, SqliteExecutor};

/// Five orders; a line "qualifies" when its quantity is above one.
/// Qualifying orders: 2 (three lines), 4 (two lines), 5 (one line).
fn seeded() -> SqliteExecutor {
    let db = SqliteExecutor::sales();
    db.run(
        "INSERT INTO orders (id, customer_id, status_id, total_cents) VALUES
            (1, 1, 1, 100), (2, 1, 2, 200), (3, 42, 1, 300), (4, 42, 2, 400), (5, 1, 1, 500);
         INSERT INTO order_lines (order_id, product_id, quantity) VALUES
            (1, 1, 1), (1, 2, 1),
            (2, 1, 3), (2, 2, 4), (2, 1, 5),
            (3, 1, 1),
            (4, 2, 2), (4, 1, 2),
            (5, 2, 7);",
    );
    db
}

fn qualifying_lines() -> FilterExpr {
    FilterExpr::compare("Lines.Quantity", BinaryOperator::Gt, 1)
}

#[tokio::test]
async fn test_take_over_collection_filter_returns_k_distinct_parents() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(qualifying_lines())
        .order_by("Id", SortDirection::Asc)
        .take(2);

    let mut context = Context::new(catalog(), "Order").unwrap();
    let strategy = QueryPlanner::new(&mut context)
        .plan_execution(ROOT, &request)
        .unwrap();
    assert!(strategy.is_two_phase());

    let sets = load(&db, "Order", &request).await;
    assert_eq!(int_column(&sets[0].records, "Id"), vec![2, 4]);
}

#[tokio::test]
async fn test_single_statement_would_fan_out_the_page() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(qualifying_lines())
        .order_by("Id", SortDirection::Asc)
        .take(2);

    let mut context = Context::new(catalog(), "Order").unwrap();
    let plan = QueryPlanner::new(&mut context)
        .plan(ROOT, &request, PlanScope::Outer)
        .unwrap();

    let mut uow = UnitOfWork::begin(db.clone(), &PlannerConfig::default())
        .await
        .unwrap();
    let writer = AnsiSqlWriter::default();
    let rows = QueryRunner::new(uow.handle().clone(), &writer)
        .run(&ExecutionStrategy::Direct(plan))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    uow.close().await;

    // Both rows belong to order 2: the join multiplied it by its lines.
    assert_eq!(int_column(&rows, "Id"), vec![2, 2]);
}

#[tokio::test]
async fn test_skip_and_take_page_over_parents() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(qualifying_lines())
        .order_by("Id", SortDirection::Asc)
        .skip(1)
        .take(2);
    let sets = load(&db, "Order", &request).await;
    assert_eq!(int_column(&sets[0].records, "Id"), vec![4, 5]);
}

#[tokio::test]
async fn test_empty_key_page_returns_no_rows() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(FilterExpr::compare("Lines.Quantity", BinaryOperator::Gt, 100))
        .order_by("Id", SortDirection::Asc)
        .take(2);
    let sets = load(&db, "Order", &request).await;
    assert!(sets[0].records.is_empty());
    assert!(sets[0].records.column_index("Id").is_some());
}

#[tokio::test]
async fn test_lookup_member_filters_and_selects_label() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(FilterExpr::equals("Status", "Shipped"))
        .order_by("Id", SortDirection::Asc);
    let sets = load(&db, "Order", &request).await;
    let records = &sets[0].records;
    assert_eq!(int_column(records, "Id"), vec![2, 4]);
    let status = records.column_index("Status").unwrap();
    assert!(records
        .rows
        .iter()
        .all(|row| row[status] == Value::Text("Shipped".into())));
}

#[tokio::test]
async fn test_filter_two_levels_away_repoints_base() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(FilterExpr::equals("Order.Customer.Name", "Initech"))
        .order_by("Id", SortDirection::Asc);
    let sets = load(&db, "OrderLine", &request).await;
    // Lines of orders 3 and 4.
    assert_eq!(int_column(&sets[0].records, "Id"), vec![6, 7, 8]);
}

#[tokio::test]
async fn test_forward_chain_filter_through_nullable_keys() {
    let db = seeded();
    let request = QueryRequest::new()
        .filter(FilterExpr::equals("Supplier.Country.Name", "Norway"))
        .order_by("Id", SortDirection::Asc);
    let sets = load(&db, "Product", &request).await;
    // Product 2 has no supplier and must not appear.
    assert_eq!(int_column(&sets[0].records, "Id"), vec![1]);
}

#[tokio::test]
async fn test_include_loads_nested_collections() {
    let db = seeded();
    let request = QueryRequest::new()
        .include("Orders.Lines")
        .filter(FilterExpr::equals("Id", 1));
    let sets = load(&db, "Customer", &request).await;

    let names: Vec<&str> = sets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["", "Orders", "Orders.Lines"]);
    assert_eq!(int_column(&sets[0].records, "Id"), vec![1]);

    let mut orders = int_column(&sets[1].records, "Id");
    orders.sort_unstable();
    assert_eq!(orders, vec![1, 2, 5]);
    assert!(int_column(&sets[1].records, "CustomerId")
        .iter()
        .all(|id| *id == 1));

    let mut line_orders = int_column(&sets[2].records, "OrderId");
    line_orders.sort_unstable();
    assert_eq!(line_orders, vec![1, 1, 2, 2, 2, 5]);
}
