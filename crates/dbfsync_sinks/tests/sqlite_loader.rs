//! Loader against a real SQLite database through the sqlx `Any` store.

use dbfsync_protocol::{FieldDescriptor, FieldType, NullProgress, Record, TableSchema, Value};
use dbfsync_sinks::{
    ensure_sync_log, record_sync, BulkLoader, Destination, LoaderOptions, SessionOptions,
    SqlxDestination,
};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn url_for(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

async fn open(url: &str) -> AnyPool {
    sqlx::any::install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .unwrap()
}

fn customer_schema() -> TableSchema {
    TableSchema::new(vec![
        FieldDescriptor::new("CUSTNO", FieldType::Character, 10, 0),
        FieldDescriptor::new("BALANCE", FieldType::Numeric, 12, 2),
        FieldDescriptor::new("DATE", FieldType::Date, 8, 0),
    ])
}

fn customer(custno: &str, balance: f64, date: Option<&str>) -> Record {
    Record::new(vec![
        Value::from(custno),
        Value::Float(balance),
        Value::from(date),
    ])
}

fn loader(url: &str) -> BulkLoader {
    let destination = SqlxDestination::new(url, SessionOptions::default()).unwrap();
    BulkLoader::new(
        Arc::new(destination),
        Arc::new(NullProgress),
        LoaderOptions::default(),
    )
}

#[tokio::test]
async fn creates_table_and_inserts_rows() {
    let dir = TempDir::new().unwrap();
    let url = url_for(&dir.path().join("sync.db"));

    let rows = vec![
        customer("A001", 12.5, Some("2025-12-12")),
        customer("A003", 0.0, None),
    ];
    let report = loader(&url)
        .load("ubs_ubsacc2015_arcust", &customer_schema(), &rows)
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);

    let pool = open(&url).await;
    let ddl: String = sqlx::query_scalar(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'ubs_ubsacc2015_arcust'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(ddl.contains("\"CUSTNO\" VARCHAR(10)"));
    assert!(ddl.contains("\"BALANCE\" DECIMAL(12,2)"));
    assert!(ddl.contains("\"DATE\" VARCHAR(255)"));

    let stored: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT \"CUSTNO\", \"DATE\" FROM \"ubs_ubsacc2015_arcust\" ORDER BY \"CUSTNO\"",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        stored,
        vec![
            ("A001".to_string(), Some("2025-12-12".to_string())),
            ("A003".to_string(), None),
        ]
    );
}

#[tokio::test]
async fn reload_leaves_only_the_second_rows() {
    let dir = TempDir::new().unwrap();
    let url = url_for(&dir.path().join("sync.db"));
    let loader = loader(&url);

    let first: Vec<_> = (0..5)
        .map(|i| customer(&format!("OLD{i}"), 1.0, None))
        .collect();
    loader.load("t", &customer_schema(), &first).await.unwrap();
    let second = vec![customer("NEW0", 2.0, None), customer("NEW1", 3.0, None)];
    loader.load("t", &customer_schema(), &second).await.unwrap();

    let pool = open(&url).await;
    let names: Vec<String> = sqlx::query_scalar("SELECT \"CUSTNO\" FROM \"t\" ORDER BY \"CUSTNO\"")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(names, vec!["NEW0", "NEW1"]);
}

#[tokio::test]
async fn long_strings_are_capped_by_bytes() {
    let dir = TempDir::new().unwrap();
    let url = url_for(&dir.path().join("sync.db"));
    let schema = TableSchema::new(vec![FieldDescriptor::new(
        "NOTES",
        FieldType::Character,
        1_000,
        0,
    )]);
    let long = "ü".repeat(8_000);
    loader(&url)
        .load("notes", &schema, &[Record::new(vec![Value::from(long)])])
        .await
        .unwrap();

    let pool = open(&url).await;
    let stored: String = sqlx::query_scalar("SELECT \"NOTES\" FROM \"notes\"")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(stored.len() <= LoaderOptions::default().string_cap_bytes);
    assert_eq!(stored.chars().count(), 5_000);
}

#[tokio::test]
async fn wide_tables_split_statements_under_the_parameter_limit() {
    let dir = TempDir::new().unwrap();
    let url = url_for(&dir.path().join("sync.db"));
    let fields: Vec<_> = (0..40)
        .map(|i| FieldDescriptor::new(format!("F{i}"), FieldType::Numeric, 6, 0))
        .collect();
    let schema = TableSchema::new(fields);
    let rows: Vec<_> = (0..1_000)
        .map(|i| Record::new((0..40).map(|_| Value::Integer(i)).collect()))
        .collect();

    let report = loader(&url).load("wide", &schema, &rows).await.unwrap();
    assert_eq!(report.inserted, 1_000);
}

#[tokio::test]
async fn sync_log_rows_accumulate() {
    let dir = TempDir::new().unwrap();
    let url = url_for(&dir.path().join("sync.db"));
    let destination = SqlxDestination::new(&url, SessionOptions::default()).unwrap();
    let dialect = destination.dialect();

    let mut session = destination.connect().await.unwrap();
    ensure_sync_log(session.as_mut(), dialect).await.unwrap();
    ensure_sync_log(session.as_mut(), dialect).await.unwrap();
    record_sync(session.as_mut(), dialect, "2025-12-12 10:00:00")
        .await
        .unwrap();
    session.close().await;

    let pool = open(&url).await;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    let stamp: String = sqlx::query_scalar("SELECT synced_at FROM sync_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stamp, "2025-12-12 10:00:00");
}
