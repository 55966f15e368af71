//! End-to-end tests for the dbclient binary
//!
//! Each test writes a job file that reads from and writes to SQLite files
//! in a temporary directory, then runs the binary on it.

mod common;

use assert_cmd::Command;
use common::{file_names, sqlite_settings, write_query};
use dbclient::{Connector, DatabaseConnector};
use predicates::prelude::*;
use std::path::Path;

fn job_file(dir: &Path, extra: &str) -> std::path::PathBuf {
    let yaml = format!(
        r#"directories:
  cache_dir: {root}/cache
  query_dir: {root}/queries
  datadump_dir: {root}/datadump
load:
  driver: sqlite
  database: {root}/source.db
store:
  drivername: sqlite
  username: ""
  password: ""
  host: ""
  port: null
  database: {root}/warehouse.db
  encoding: utf8
load_query: regions
index_columns: 1
use_cache: true
retry:
  max_attempts: 1
{extra}"#,
        root = dir.display(),
        extra = extra
    );
    let path = dir.join("project_config.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn dbclient() -> Command {
    let mut cmd = Command::cargo_bin("dbclient").unwrap();
    cmd.env_remove("DBCLIENT_CONFIG")
        .env("LOG_LEVEL", "info")
        .env("LOG_OUTPUT", "console");
    cmd
}

#[test]
fn test_runs_job_and_prints_preview() {
    let dir = tempfile::tempdir().unwrap();
    write_query(
        &dir.path().join("queries"),
        "regions",
        "SELECT 1 AS Id, 'north' AS Region, 2.5 AS Revenue",
    );
    let config = job_file(dir.path(), "dump_raw: true\n");

    dbclient()
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("region"))
        .stdout(predicate::str::contains("north"))
        .stdout(predicate::str::contains("1 rows x 3 columns"))
        .stdout(predicate::str::contains("statistic"));

    assert_eq!(file_names(&dir.path().join("cache")).len(), 1);
    let dump = std::fs::read_to_string(dir.path().join("datadump").join("regions_raw.csv")).unwrap();
    assert_eq!(dump, "id,region,revenue\n1,north,2.5\n");
}

#[tokio::test]
async fn test_writes_configured_table() {
    let dir = tempfile::tempdir().unwrap();
    write_query(
        &dir.path().join("queries"),
        "regions",
        "SELECT 1 AS Id, 'north' AS Region UNION ALL SELECT 2, 'south'",
    );
    let config = job_file(dir.path(), "write:\n  table: regions_copy\n  if_exists: replace\n");

    dbclient().arg("--config").arg(&config).assert().success();

    let warehouse = DatabaseConnector::new(sqlite_settings(&dir.path().join("warehouse.db")));
    let mut session = warehouse.connect().await.unwrap();
    let copied = session.fetch_table("SELECT * FROM regions_copy ORDER BY id").await.unwrap();
    session.close().await.unwrap();

    assert_eq!(copied.column_names(), vec!["id", "region"]);
    assert_eq!(copied.num_rows(), 2);
}

#[test]
fn test_config_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    write_query(&dir.path().join("queries"), "regions", "SELECT 1 AS id");
    let config = job_file(dir.path(), "");

    dbclient().env("DBCLIENT_CONFIG", &config).assert().success();
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();

    dbclient()
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to load job configuration"));
}

#[test]
fn test_missing_query_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = job_file(dir.path(), "");

    dbclient()
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Query file not found"));
}
