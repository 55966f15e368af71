//! Database sessions
//!
//! A [`Connector`] knows how to reach one database; every call to
//! [`Connector::connect`] hands out a fresh, exclusively owned [`Session`].
//! Callers close the session when they are done, on success and on
//! failure alike. Dropping a session without closing it still releases
//! the driver connection, only less politely.
//!
//! MySQL, PostgreSQL and SQLite are supported through sqlx. Each driver
//! module maps the driver's type names onto [`ColumnType`]s and binds
//! [`Value`]s back when writing.

pub mod dialect;
mod mysql;
mod postgres;
mod sqlite;

use crate::error::{DbClientError, Result};
use crate::table::{ColumnType, Table, Value};
use crate::wire_types::WireTypeMap;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};
use std::ops::Range;
use tracing::{debug, warn};

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
}

impl DatabaseKind {
    /// Parse a driver name such as `mysql+pymysql` or `postgresql`.
    ///
    /// Only the part before `+` matters.
    pub fn from_driver_name(driver: &str) -> Result<Self> {
        let base = driver.split('+').next().unwrap_or_default().trim().to_lowercase();
        match base.as_str() {
            "mysql" | "mariadb" => Ok(DatabaseKind::MySql),
            "postgres" | "postgresql" | "pg" => Ok(DatabaseKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DatabaseKind::Sqlite),
            _ => Err(DbClientError::config(format!("unsupported database driver '{}'", driver))),
        }
    }

    pub fn default_port(self) -> Option<u16> {
        match self {
            DatabaseKind::MySql => Some(3306),
            DatabaseKind::Postgres => Some(5432),
            DatabaseKind::Sqlite => None,
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseKind::MySql => f.write_str("mysql"),
            DatabaseKind::Postgres => f.write_str("postgres"),
            DatabaseKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// What to do when the destination table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    #[default]
    Fail,
    Replace,
    Append,
}

impl std::str::FromStr for IfExists {
    type Err = DbClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            _ => Err(DbClientError::config(format!(
                "invalid if_exists '{}', expected fail, replace or append",
                s
            ))),
        }
    }
}

/// DDL needed before inserting rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    pub drop_existing: bool,
    pub create: bool,
}

impl WritePlan {
    pub fn decide(table_name: &str, if_exists: IfExists, exists: bool) -> Result<Self> {
        match (if_exists, exists) {
            (IfExists::Fail, true) => Err(DbClientError::TableExists(table_name.to_string())),
            (IfExists::Fail, false) | (IfExists::Replace, false) | (IfExists::Append, false) => Ok(Self {
                drop_existing: false,
                create: true,
            }),
            (IfExists::Replace, true) => Ok(Self {
                drop_existing: true,
                create: true,
            }),
            (IfExists::Append, true) => Ok(Self {
                drop_existing: false,
                create: false,
            }),
        }
    }
}

/// Everything needed to open a connection
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub kind: DatabaseKind,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    /// Database name, or the file path for SQLite
    pub database: String,
    /// Connection character set (MySQL only)
    pub charset: Option<String>,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .finish()
    }
}

impl DatabaseSettings {
    /// Connection target for logs, never includes the password
    pub fn display_target(&self) -> String {
        match self.kind {
            DatabaseKind::Sqlite => format!("sqlite://{}", self.database),
            kind => format!(
                "{}://{}@{}:{}/{}",
                kind,
                self.username,
                self.host,
                self.port.or(kind.default_port()).unwrap_or_default(),
                self.database
            ),
        }
    }
}

/// An open, exclusively owned connection
#[async_trait]
pub trait Session: Send {
    /// Run `sql` and materialize every row.
    async fn fetch_table(&mut self, sql: &str) -> Result<Table>;

    /// Write all columns of `table`, index first, into `table_name`.
    ///
    /// Returns the number of rows inserted.
    async fn write_table(
        &mut self,
        table: &Table,
        table_name: &str,
        if_exists: IfExists,
        wire_types: &WireTypeMap,
    ) -> Result<u64>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Hands out sessions against one database
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>>;

    /// Human-readable target for logs
    fn target(&self) -> String;
}

/// Close `session` and hand back `result`.
///
/// A failure to close is logged, never reported over the operation's own
/// outcome.
pub async fn close_after<T>(session: Box<dyn Session>, result: Result<T>) -> Result<T> {
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close connection");
    }
    result
}

/// [`Connector`] backed by the sqlx drivers
#[derive(Debug, Clone)]
pub struct DatabaseConnector {
    settings: DatabaseSettings,
}

impl DatabaseConnector {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }
}

#[async_trait]
impl Connector for DatabaseConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        debug!(target_db = %self.settings.display_target(), "Opening connection");
        let session: Box<dyn Session> = match self.settings.kind {
            DatabaseKind::MySql => Box::new(mysql::MySqlSession::connect(&self.settings).await?),
            DatabaseKind::Postgres => Box::new(postgres::PgSession::connect(&self.settings).await?),
            DatabaseKind::Sqlite => Box::new(sqlite::SqliteSession::connect(&self.settings).await?),
        };
        Ok(session)
    }

    fn target(&self) -> String {
        self.settings.display_target()
    }
}

fn assemble(schema: Vec<(String, ColumnType)>, rows: Vec<Vec<Value>>) -> Result<Table> {
    let table = Table::from_rows(schema, rows)?;
    debug!(rows = table.num_rows(), columns = table.num_columns(), "Materialized result");
    Ok(table)
}

/// A value the driver returned but we could not turn into a [`Value`].
///
/// Decoding is deterministic, so this is a schema error rather than a
/// retryable database error.
fn decode_failed(column: &str, type_name: &str, err: sqlx::Error) -> DbClientError {
    DbClientError::schema(format!("cannot decode column '{}' of type {}: {}", column, type_name, err))
}

fn out_of_range(what: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("{} does not fit the column type", what).into())
}

/// `INSERT` statements for all rows of `table`, each with the row range it binds
fn insert_batches(kind: DatabaseKind, table_name: &str, table: &Table) -> Vec<(String, Range<usize>)> {
    let names = table.column_names();
    let per_insert = kind.rows_per_insert(names.len());
    let total = table.num_rows();

    (0..total)
        .step_by(per_insert)
        .map(|start| {
            let end = (start + per_insert).min(total);
            (kind.insert_sql(table_name, &names, end - start), start..end)
        })
        .collect()
}

type BoundQuery<'q, DB> = Query<'q, DB, <DB as Database>::Arguments<'q>>;

/// Bind every cell of row `row`, in column order.
///
/// Nulls are bound with the column's type so that engines with typed
/// parameters (PostgreSQL) accept them.
fn bind_row<'q, DB>(mut query: BoundQuery<'q, DB>, table: &'q Table, row: usize) -> BoundQuery<'q, DB>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    NaiveDateTime: Encode<'q, DB> + Type<DB>,
    NaiveDate: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
    Option<bool>: Encode<'q, DB>,
    Option<i64>: Encode<'q, DB>,
    Option<f64>: Encode<'q, DB>,
    Option<&'q str>: Encode<'q, DB>,
    Option<NaiveDateTime>: Encode<'q, DB>,
    Option<NaiveDate>: Encode<'q, DB>,
    Option<&'q [u8]>: Encode<'q, DB>,
{
    for column in table.columns() {
        query = match &column.values()[row] {
            Value::Boolean(v) => query.bind(*v),
            Value::Integer(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Timestamp(v) => query.bind(*v),
            Value::Date(v) => query.bind(*v),
            Value::Binary(v) => query.bind(v.as_slice()),
            Value::Null => match column.column_type() {
                ColumnType::Boolean => query.bind(None::<bool>),
                ColumnType::Integer => query.bind(None::<i64>),
                ColumnType::Float => query.bind(None::<f64>),
                ColumnType::Text => query.bind(None::<&'q str>),
                ColumnType::Timestamp => query.bind(None::<NaiveDateTime>),
                ColumnType::Date => query.bind(None::<NaiveDate>),
                ColumnType::Binary => query.bind(None::<&'q [u8]>),
            },
        };
    }
    query
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names() {
        assert_eq!(DatabaseKind::from_driver_name("mysql+pymysql").unwrap(), DatabaseKind::MySql);
        assert_eq!(
            DatabaseKind::from_driver_name("postgresql+psycopg2").unwrap(),
            DatabaseKind::Postgres
        );
        assert_eq!(DatabaseKind::from_driver_name("SQLite").unwrap(), DatabaseKind::Sqlite);
        assert!(DatabaseKind::from_driver_name("oracle").is_err());
    }

    #[test]
    fn test_if_exists_parse() {
        assert_eq!("Replace".parse::<IfExists>().unwrap(), IfExists::Replace);
        assert!("upsert".parse::<IfExists>().is_err());
        assert_eq!(IfExists::default(), IfExists::Fail);
    }

    #[test]
    fn test_write_plan() {
        assert!(matches!(
            WritePlan::decide("t", IfExists::Fail, true),
            Err(DbClientError::TableExists(_))
        ));
        let plan = WritePlan::decide("t", IfExists::Replace, true).unwrap();
        assert!(plan.drop_existing && plan.create);
        let plan = WritePlan::decide("t", IfExists::Append, true).unwrap();
        assert!(!plan.drop_existing && !plan.create);
        let plan = WritePlan::decide("t", IfExists::Append, false).unwrap();
        assert!(plan.create);
    }

    #[test]
    fn test_debug_hides_password() {
        let settings = DatabaseSettings {
            kind: DatabaseKind::MySql,
            host: "db.internal".into(),
            port: None,
            username: "etl".into(),
            password: "hunter2".into(),
            database: "shop".into(),
            charset: Some("utf8".into()),
        };
        assert!(!format!("{:?}", settings).contains("hunter2"));
        assert_eq!(settings.display_target(), "mysql://etl@db.internal:3306/shop");
    }

    #[test]
    fn test_insert_batches_split_on_bind_limit() {
        let rows = (0..250).map(|i| vec![Value::Integer(i), Value::Null, Value::Null, Value::Null]).collect();
        let schema = ["a", "b", "c", "d"].iter().map(|n| (n.to_string(), ColumnType::Integer)).collect();
        let table = Table::from_rows(schema, rows).unwrap();

        let batches = insert_batches(DatabaseKind::Sqlite, "t", &table);
        let ranges: Vec<Range<usize>> = batches.iter().map(|(_, r)| r.clone()).collect();
        assert_eq!(ranges, vec![0..249, 249..250]);
        assert_eq!(batches[1].0, "INSERT INTO \"t\" (\"a\", \"b\", \"c\", \"d\") VALUES (?, ?, ?, ?)");
    }

    #[test]
    fn test_insert_batches_empty_table() {
        let table = Table::from_rows(vec![("a".to_string(), ColumnType::Text)], vec![]).unwrap();
        assert!(insert_batches(DatabaseKind::MySql, "t", &table).is_empty());
    }
}
