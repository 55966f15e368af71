//! Integration tests for a full job run against mock databases

mod common;

use common::{day, sales_table, write_query, MockConnector};
use dbclient::{DataLoader, DataWriter, DbClientError, JobConfig, Pipeline, RetryPolicy, Table, Value};
use std::path::Path;
use std::sync::Arc;

fn config(root: &Path, extra: &str) -> JobConfig {
    let yaml = format!(
        r#"directories:
  cache_dir: {root}/cache
  query_dir: {root}/queries
  datadump_dir: {root}/datadump
load:
  host: db.internal
  username: etl
  password: secret
  database: shop
load_query: sales
index_columns: 1
use_cache: false
{extra}"#,
        root = root.display(),
        extra = extra
    );
    let config = JobConfig::from_yaml(&yaml).unwrap();
    config.validate().unwrap();
    config.ensure_directories().unwrap();
    config
}

fn pipeline(config: JobConfig, source: MockConnector, destination: Option<MockConnector>) -> Pipeline {
    let loader = DataLoader::new(
        Arc::new(source),
        config.cache_dir().unwrap(),
        config.query_dir().unwrap(),
    )
    .with_policy(RetryPolicy::no_retry())
    .with_date(day(1));
    let writer = DataWriter::new(destination.map(|d| Arc::new(d) as Arc<dyn dbclient::Connector>))
        .with_policy(RetryPolicy::no_retry());
    Pipeline::new(config, loader, writer)
}

#[tokio::test]
async fn test_run_prints_preview_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    write_query(&dir.path().join("queries"), "sales", "SELECT * FROM sales");
    let pipeline = pipeline(config(dir.path(), ""), MockConnector::returning(sales_table()), None);

    let mut out = Vec::new();
    let report = pipeline.run(&mut out).await.unwrap();

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("north"));
    assert!(printed.contains("3 rows x 4 columns"));
    assert!(printed.contains("statistic"));
    assert_eq!(report.rows_loaded, 3);
    assert_eq!(report.rows_written, None);
    assert_eq!(report.dump_path, None);
}

#[tokio::test]
async fn test_transform_output_is_written() {
    let dir = tempfile::tempdir().unwrap();
    write_query(&dir.path().join("queries"), "sales", "SELECT * FROM sales");
    let destination = MockConnector::returning(Table::default());
    let written = destination.state();
    let pipeline = pipeline(
        config(dir.path(), "write:\n  table: sales_adjusted\n  if_exists: replace\ndump_raw: true\n"),
        MockConnector::returning(sales_table()),
        Some(destination),
    );

    let report = pipeline
        .run_with(&mut std::io::sink(), |table| Ok(table.head(2)))
        .await
        .unwrap();

    assert_eq!(report.rows_loaded, 3);
    assert_eq!(report.rows_written, Some(2));

    // The dump holds the loaded data, not the transformed data
    let dump = std::fs::read_to_string(report.dump_path.unwrap()).unwrap();
    assert_eq!(dump.lines().count(), 4);

    let tables = written.written();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "sales_adjusted");
    assert_eq!(tables[0].table.column("region").unwrap().values()[1], Value::Text("south".into()));
}

#[tokio::test]
async fn test_write_without_store_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_query(&dir.path().join("queries"), "sales", "SELECT * FROM sales");
    let pipeline = pipeline(
        config(dir.path(), "write:\n  table: sales_adjusted\n"),
        MockConnector::returning(sales_table()),
        None,
    );

    let result = pipeline.run(&mut std::io::sink()).await;
    assert!(matches!(result, Err(DbClientError::Config(_))));
}

#[tokio::test]
async fn test_transform_error_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_query(&dir.path().join("queries"), "sales", "SELECT * FROM sales");
    let destination = MockConnector::returning(Table::default());
    let written = destination.state();
    let pipeline = pipeline(
        config(dir.path(), "write:\n  table: sales_adjusted\n"),
        MockConnector::returning(sales_table()),
        Some(destination),
    );

    let result = pipeline
        .run_with(&mut std::io::sink(), |_| Err(DbClientError::schema("bad adjustment")))
        .await;

    assert!(matches!(result, Err(DbClientError::Schema(_))));
    assert_eq!(written.connects(), 0);
}
