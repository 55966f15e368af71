//! Common test utilities for dbclient integration tests
//!
//! [`MockConnector`] stands in for a database: it hands out sessions that
//! return a fixed table, remember what was written, and count connects and
//! closes so tests can check the acquire-use-release discipline.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{sales_table, MockConnector};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let connector = MockConnector::returning(sales_table());
//!     let state = connector.state();
//!     // build a loader or writer around Arc::new(connector)
//!     assert_eq!(state.connects(), 0);
//! }
//! ```

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::NaiveDate;
use dbclient::db::WritePlan;
use dbclient::{
    ColumnType, Connector, DatabaseKind, DatabaseSettings, DbClientError, IfExists, Result, Session, Table, Value,
    WireTypeMap,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Fixtures
// ============================================================================

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

/// Upper-case column names, the way some databases report them
pub fn sales_table() -> Table {
    Table::from_rows(
        vec![
            ("REGION".to_string(), ColumnType::Text),
            ("Year".to_string(), ColumnType::Integer),
            ("Revenue".to_string(), ColumnType::Float),
            ("Closed".to_string(), ColumnType::Boolean),
        ],
        vec![
            vec![Value::Text("north".into()), Value::Integer(2023), Value::Float(10.5), Value::Boolean(true)],
            vec![Value::Text("south".into()), Value::Integer(2023), Value::Null, Value::Boolean(false)],
            vec![Value::Text("east".into()), Value::Integer(2024), Value::Float(7.25), Value::Null],
        ],
    )
    .unwrap()
}

/// Write `{dir}/{name}.sql`
pub fn write_query(dir: &Path, name: &str, sql: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(format!("{}.sql", name)), sql).unwrap();
}

/// Names of the files in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn sqlite_settings(path: &Path) -> DatabaseSettings {
    DatabaseSettings {
        kind: DatabaseKind::Sqlite,
        host: String::new(),
        port: None,
        username: String::new(),
        password: String::new(),
        database: path.to_string_lossy().into_owned(),
        charset: None,
    }
}

fn transient(what: &str) -> DbClientError {
    DbClientError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, what.to_string()))
}

// ============================================================================
// Mock database
// ============================================================================

/// A table as the mock database received it
#[derive(Debug, Clone)]
pub struct WrittenTable {
    pub name: String,
    pub if_exists: IfExists,
    pub table: Table,
    pub wire_types: WireTypeMap,
}

/// Everything the mock saw, shared between the connector and its sessions
#[derive(Debug, Default)]
pub struct MockState {
    connects: AtomicU32,
    closes: AtomicU32,
    fetches: AtomicU32,
    queries: Mutex<Vec<String>>,
    existing: Mutex<BTreeSet<String>>,
    written: Mutex<Vec<WrittenTable>>,
}

impl MockState {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<WrittenTable> {
        self.written.lock().unwrap().clone()
    }

    /// Pretend `name` is already in the database.
    pub fn add_existing(&self, name: &str) {
        self.existing.lock().unwrap().insert(name.to_string());
    }
}

pub struct MockConnector {
    result: Table,
    failing_connects: u32,
    failing_fetches: u32,
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn returning(result: Table) -> Self {
        Self {
            result,
            failing_connects: 0,
            failing_fetches: 0,
            state: Arc::new(MockState::default()),
        }
    }

    /// The first `n` connects fail with a retryable error.
    pub fn failing_connects(mut self, n: u32) -> Self {
        self.failing_connects = n;
        self
    }

    /// The first `n` queries fail with a retryable error after connecting.
    pub fn failing_fetches(mut self, n: u32) -> Self {
        self.failing_fetches = n;
        self
    }

    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let attempt = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failing_connects {
            return Err(transient("connection refused"));
        }
        Ok(Box::new(MockSession {
            result: self.result.clone(),
            failing_fetches: self.failing_fetches,
            state: Arc::clone(&self.state),
        }))
    }

    fn target(&self) -> String {
        "mock://".to_string()
    }
}

struct MockSession {
    result: Table,
    failing_fetches: u32,
    state: Arc<MockState>,
}

#[async_trait]
impl Session for MockSession {
    async fn fetch_table(&mut self, sql: &str) -> Result<Table> {
        self.state.queries.lock().unwrap().push(sql.to_string());
        let attempt = self.state.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failing_fetches {
            return Err(transient("lost connection during query"));
        }
        Ok(self.result.clone())
    }

    async fn write_table(
        &mut self,
        table: &Table,
        table_name: &str,
        if_exists: IfExists,
        wire_types: &WireTypeMap,
    ) -> Result<u64> {
        let exists = self.state.existing.lock().unwrap().contains(table_name);
        WritePlan::decide(table_name, if_exists, exists)?;

        self.state.existing.lock().unwrap().insert(table_name.to_string());
        self.state.written.lock().unwrap().push(WrittenTable {
            name: table_name.to_string(),
            if_exists,
            table: table.clone(),
            wire_types: wire_types.clone(),
        });
        Ok(table.num_rows() as u64)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
