//! SQLite session
//!
//! SQLite types values, not columns. The declared column type decides the
//! semantic type; expression columns without one take the type of their
//! first non-null value.

use super::{assemble, bind_row, decode_failed, insert_batches};
use super::{DatabaseKind, DatabaseSettings, IfExists, Session, WritePlan};
use crate::error::Result;
use crate::table::{ColumnType, Table, Value};
use crate::wire_types::WireTypeMap;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

const KIND: DatabaseKind = DatabaseKind::Sqlite;

pub(super) struct SqliteSession {
    conn: SqliteConnection,
}

impl SqliteSession {
    pub(super) async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&settings.database)
            .create_if_missing(true);

        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }
}

fn column_type_of(type_name: &str) -> ColumnType {
    match type_name {
        "BOOLEAN" => ColumnType::Boolean,
        "INTEGER" => ColumnType::Integer,
        "REAL" | "NUMERIC" => ColumnType::Float,
        "DATETIME" => ColumnType::Timestamp,
        "DATE" => ColumnType::Date,
        "BLOB" => ColumnType::Binary,
        _ => ColumnType::Text,
    }
}

/// Type name of column `idx`, looking at the values when nothing was declared
fn resolve_type_name(rows: &[SqliteRow], idx: usize, declared: &str) -> String {
    if declared != "NULL" {
        return declared.to_string();
    }

    rows.iter()
        .filter_map(|row| row.try_get_raw(idx).ok())
        .find(|value| !value.is_null())
        .map(|value| value.type_info().name().to_string())
        .unwrap_or_else(|| "TEXT".to_string())
}

fn decode_value(row: &SqliteRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match column_type_of(type_name) {
        ColumnType::Boolean => Value::Boolean(row.try_get(idx)?),
        ColumnType::Integer => Value::Integer(row.try_get(idx)?),
        // NUMERIC affinity keeps whole numbers as integers
        ColumnType::Float => match row.try_get::<f64, _>(idx) {
            Ok(v) => Value::Float(v),
            Err(_) => Value::Float(row.try_get::<i64, _>(idx)? as f64),
        },
        ColumnType::Timestamp => Value::Timestamp(row.try_get(idx)?),
        ColumnType::Date => Value::Date(row.try_get(idx)?),
        ColumnType::Binary => Value::Binary(row.try_get(idx)?),
        ColumnType::Text => {
            let v: String = row.try_get(idx).unwrap_or_else(|_| format!("<{}>", type_name));
            Value::Text(v)
        },
    };

    Ok(value)
}

#[async_trait]
impl Session for SqliteSession {
    async fn fetch_table(&mut self, sql: &str) -> Result<Table> {
        let rows = sqlx::query(sql).fetch_all(&mut self.conn).await?;

        let described: Vec<(String, String)> = match rows.first() {
            Some(row) => row
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, c)| {
                    (
                        c.name().to_string(),
                        resolve_type_name(&rows, idx, c.type_info().name()),
                    )
                })
                .collect(),
            None => {
                let statement = (&mut self.conn).prepare(sql).await?;
                statement
                    .columns()
                    .iter()
                    .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
                    .collect()
            },
        };

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoded = described
                .iter()
                .enumerate()
                .map(|(idx, (name, type_name))| {
                    decode_value(row, idx, type_name).map_err(|e| decode_failed(name, type_name, e))
                })
                .collect::<Result<Vec<_>>>()?;
            values.push(decoded);
        }

        let schema = described
            .into_iter()
            .map(|(name, type_name)| (name, column_type_of(&type_name)))
            .collect();
        assemble(schema, values)
    }

    async fn write_table(
        &mut self,
        table: &Table,
        table_name: &str,
        if_exists: IfExists,
        wire_types: &WireTypeMap,
    ) -> Result<u64> {
        let mut tx = self.conn.begin().await?;

        let existing: i64 = sqlx::query_scalar(KIND.table_exists_sql())
            .bind(table_name)
            .fetch_one(&mut *tx)
            .await?;
        let plan = WritePlan::decide(table_name, if_exists, existing > 0)?;

        if plan.drop_existing {
            sqlx::query(&KIND.drop_table_sql(table_name)).execute(&mut *tx).await?;
        }
        if plan.create {
            sqlx::query(&KIND.create_table_sql(table_name, wire_types.columns()))
                .execute(&mut *tx)
                .await?;
        }

        let mut written = 0;
        for (sql, rows) in insert_batches(KIND, table_name, table) {
            let mut query = sqlx::query(&sql);
            for row in rows {
                query = bind_row(query, table, row);
            }
            written += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(table = table_name, rows = written, ?plan, "Wrote table");
        Ok(written)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let session = *self;
        session.conn.close().await?;
        Ok(())
    }
}
