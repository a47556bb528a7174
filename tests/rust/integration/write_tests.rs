// Integration tests for cascading writes against SQLite
use std::collections::BTreeMap;

use relplan::config::PlannerConfig;
use relplan::sql_generator::AnsiSqlWriter;
use relplan::types::Value;
use relplan::write_cascade::{EntityRecord, ErrorCategory, OperationKind, Repository, WriteError};

use super::support::{catalog, SqliteExecutor};

fn line(product: i64, quantity: i64) -> EntityRecord {
    EntityRecord::new("OrderLine")
        .with("ProductId", product)
        .with("Quantity", quantity)
}

fn note(body: &str) -> EntityRecord {
    EntityRecord::new("OrderNote").with("Body", body)
}

fn key(record: &EntityRecord) -> i64 {
    record
        .get("Id")
        .and_then(Value::as_i64)
        .expect("record has a key")
}

fn keys(records: &[EntityRecord]) -> Vec<i64> {
    records.iter().map(key).collect()
}

#[tokio::test]
async fn test_orphans_are_deleted_or_detached_by_fk_nullability() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    let mut order = EntityRecord::new("Order")
        .with("Id", 0)
        .with("CustomerId", 1)
        .with("Status", "Pending")
        .with_collection("Lines", vec![line(1, 1), line(2, 2), line(1, 3)])
        .with_collection("Notes", vec![note("a"), note("b"), note("c")]);
    repository.save(db.clone(), &mut order).await.unwrap();
    let order_id = key(&order);
    let first_lines = keys(order.collection("Lines"));
    let first_notes = keys(order.collection("Notes"));
    assert_eq!(db.count("order_lines", &format!("order_id = {}", order_id)), 3);
    assert_eq!(db.count("order_notes", &format!("order_id = {}", order_id)), 3);

    // {A, B, C} -> {A, D}
    for (name, added) in [("Lines", line(2, 9)), ("Notes", note("d"))] {
        let items = order.collections.get_mut(name).unwrap();
        items.truncate(1);
        items.push(added);
    }
    repository.save(db.clone(), &mut order).await.unwrap();

    let lines = keys(order.collection("Lines"));
    assert_eq!(lines[0], first_lines[0]);
    assert_eq!(
        db.ids(&format!("SELECT id FROM order_lines WHERE order_id = {} ORDER BY id", order_id)),
        lines
    );
    // Required foreign key: B and C are gone.
    assert_eq!(
        db.count(
            "order_lines",
            &format!("id IN ({}, {})", first_lines[1], first_lines[2])
        ),
        0
    );

    let notes = keys(order.collection("Notes"));
    assert_eq!(
        db.ids(&format!("SELECT id FROM order_notes WHERE order_id = {} ORDER BY id", order_id)),
        notes
    );
    // Nullable foreign key: B and C survive, detached.
    assert_eq!(
        db.ids("SELECT id FROM order_notes WHERE order_id IS NULL ORDER BY id"),
        vec![first_notes[1], first_notes[2]]
    );
}

#[tokio::test]
async fn test_default_key_inserts_and_explicit_key_updates() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    let mut acme = EntityRecord::new("Customer").with("Id", 0).with("Name", "Acme");
    repository.save(db.clone(), &mut acme).await.unwrap();
    let acme_id = key(&acme);
    assert!(acme_id > 42);
    assert_eq!(
        db.count("customers", &format!("id = {} AND tier = 0 AND active = 'Y'", acme_id)),
        1
    );

    let mut renamed = EntityRecord::new("Customer").with("Id", 42).with("Name", "Acme");
    repository.save(db.clone(), &mut renamed).await.unwrap();
    assert_eq!(db.count("customers", "id = 42 AND name = 'Acme'"), 1);
    assert_eq!(db.count("customers", "1 = 1"), 3);

    let mut ghost = EntityRecord::new("Customer").with("Id", 4242).with("Name", "Ghost");
    let err = repository.save(db.clone(), &mut ghost).await.unwrap_err();
    assert!(matches!(err, WriteError::RowNotFound { .. }));
    assert_eq!(err.category(), ErrorCategory::Data);
}

#[tokio::test]
async fn test_identity_insert_writes_explicit_key() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let config = PlannerConfig {
        identity_insert: true,
        ..Default::default()
    };
    let repository = Repository::new(catalog(), &writer, config);

    let mut explicit = EntityRecord::new("Customer").with("Id", 500).with("Name", "Explicit");
    repository.save(db.clone(), &mut explicit).await.unwrap();
    assert_eq!(db.count("customers", "id = 500 AND name = 'Explicit'"), 1);
}

#[tokio::test]
async fn test_lookup_label_is_resolved_on_write() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    let mut order = EntityRecord::new("Order")
        .with("CustomerId", 1)
        .with("Status", "Shipped")
        .with("Total", 19.99)
        .with("Reference", "po-7");
    repository.save(db.clone(), &mut order).await.unwrap();
    assert_eq!(
        db.count(
            "orders",
            &format!(
                "id = {} AND status_id = 2 AND total_cents = 1999 AND reference = 'PO-7'",
                key(&order)
            )
        ),
        1
    );

    let mut lost = EntityRecord::new("Order")
        .with("CustomerId", 1)
        .with("Status", "Lost");
    let err = repository.save(db.clone(), &mut lost).await.unwrap_err();
    assert!(matches!(err, WriteError::UnknownLookupValue { .. }));
    assert_eq!(err.category(), ErrorCategory::Data);
    assert_eq!(db.count("orders", "1 = 1"), 1);
}

#[tokio::test]
async fn test_permission_denied_writes_nothing() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    let mut status = EntityRecord::new("OrderStatus").with("Id", 0).with("Label", "Lost");
    let err = repository.save(db.clone(), &mut status).await.unwrap_err();
    assert_eq!(
        err,
        WriteError::NotPermitted {
            entity: "OrderStatus".into(),
            operation: OperationKind::Insert,
        }
    );
    assert_eq!(err.category(), ErrorCategory::Unsupported);
    assert_eq!(db.count("order_statuses", "1 = 1"), 2);
}

#[tokio::test]
async fn test_failure_rolls_back_every_write_and_keeps_record() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    // The customer and order inserts succeed; the line violates its
    // product foreign key.
    let mut order = EntityRecord::new("Order")
        .with("Status", "Pending")
        .with_reference("Customer", Some(EntityRecord::new("Customer").with("Name", "Temp")))
        .with_collection("Lines", vec![line(999, 1)]);
    let before = order.clone();
    let err = repository.save(db.clone(), &mut order).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);

    assert_eq!(order, before);
    assert_eq!(db.count("customers", "name = 'Temp'"), 0);
    assert_eq!(db.count("orders", "1 = 1"), 0);
    assert_eq!(db.count("order_lines", "1 = 1"), 0);
}

#[tokio::test]
async fn test_delete_cascades_through_required_and_detaches_nullable() {
    let db = SqliteExecutor::sales();
    db.run(
        "INSERT INTO orders (id, customer_id, status_id) VALUES (10, 42, 1), (11, 42, 2), (12, 1, 1);
         INSERT INTO order_lines (order_id, product_id, quantity) VALUES (10, 1, 1), (11, 2, 2), (12, 1, 3);
         INSERT INTO order_notes (order_id, body) VALUES (10, 'x'), (12, 'y');",
    );
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    repository
        .delete(db.clone(), &EntityRecord::new("Customer").with("Id", 42))
        .await
        .unwrap();

    assert_eq!(db.count("customers", "id = 42"), 0);
    assert_eq!(db.ids("SELECT id FROM orders"), vec![12]);
    assert_eq!(db.count("order_lines", "1 = 1"), 1);
    assert_eq!(db.count("order_notes", "order_id IS NULL AND body = 'x'"), 1);
    assert_eq!(db.count("order_notes", "order_id = 12"), 1);
}

#[tokio::test]
async fn test_delete_detaches_self_referencing_children() {
    let db = SqliteExecutor::sales();
    db.run(
        "INSERT INTO employees (id, name, manager_id) VALUES
            (1, 'Boss', NULL), (2, 'Ann', 1), (3, 'Bob', 1), (4, 'Cy', 2);",
    );
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    repository
        .delete(db.clone(), &EntityRecord::new("Employee").with("Id", 1))
        .await
        .unwrap();

    assert_eq!(db.ids("SELECT id FROM employees ORDER BY id"), vec![2, 3, 4]);
    assert_eq!(db.count("employees", "manager_id IS NULL"), 2);
    assert_eq!(db.count("employees", "id = 4 AND manager_id = 2"), 1);
}

#[tokio::test]
async fn test_patch_updates_named_members_only() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    let changes = BTreeMap::from([
        ("Active".to_string(), Value::Bool(false)),
        ("Tier".to_string(), Value::from("Platinum")),
    ]);
    repository
        .patch(db.clone(), "Customer", Value::Int(42), &changes)
        .await
        .unwrap();
    assert_eq!(
        db.count("customers", "id = 42 AND name = 'Initech' AND active = 'N' AND tier = 2"),
        1
    );

    let unknown = BTreeMap::from([("Nickname".to_string(), Value::from("Ini"))]);
    let err = repository
        .patch(db.clone(), "Customer", Value::Int(42), &unknown)
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::UnknownMember { .. }));
}

#[tokio::test]
async fn test_forward_reference_is_saved_first() {
    let db = SqliteExecutor::sales();
    let writer = AnsiSqlWriter::default();
    let repository = Repository::new(catalog(), &writer, PlannerConfig::default());

    let mut order = EntityRecord::new("Order")
        .with("Status", "Pending")
        .with_reference(
            "Customer",
            Some(
                EntityRecord::new("Customer")
                    .with("Name", "Hooli")
                    .with_reference("Region", Some(EntityRecord::new("Region").with("Name", "South"))),
            ),
        );
    repository.save(db.clone(), &mut order).await.unwrap();

    let customer = order.reference("Customer").unwrap();
    let region = customer.reference("Region").unwrap();
    assert_eq!(order.get("CustomerId"), customer.get("Id"));
    assert_eq!(customer.get("RegionId"), region.get("Id"));
    assert_eq!(
        db.count(
            "customers",
            &format!("id = {} AND region_id = {}", key(customer), key(region))
        ),
        1
    );
}
