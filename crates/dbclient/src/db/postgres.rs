//! PostgreSQL session

use super::{assemble, bind_row, decode_failed, insert_batches, out_of_range};
use super::{DatabaseKind, DatabaseSettings, IfExists, Session, WritePlan};
use crate::error::Result;
use crate::table::{ColumnType, Table, Value};
use crate::wire_types::WireTypeMap;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

const KIND: DatabaseKind = DatabaseKind::Postgres;

pub(super) struct PgSession {
    conn: PgConnection,
}

impl PgSession {
    pub(super) async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port.or(KIND.default_port()).unwrap_or(5432))
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database);

        let conn = PgConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }
}

fn column_type_of(type_name: &str) -> ColumnType {
    match type_name {
        "BOOL" => ColumnType::Boolean,
        "INT2" | "INT4" | "INT8" => ColumnType::Integer,
        "FLOAT4" | "FLOAT8" | "NUMERIC" => ColumnType::Float,
        "TIMESTAMP" | "TIMESTAMPTZ" => ColumnType::Timestamp,
        "DATE" => ColumnType::Date,
        "BYTEA" => ColumnType::Binary,
        _ => ColumnType::Text,
    }
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOL" => Value::Boolean(row.try_get(idx)?),
        "INT2" => Value::Integer(i64::from(row.try_get::<i16, _>(idx)?)),
        "INT4" => Value::Integer(i64::from(row.try_get::<i32, _>(idx)?)),
        "INT8" => Value::Integer(row.try_get(idx)?),
        "FLOAT4" => Value::Float(f64::from(row.try_get::<f32, _>(idx)?)),
        "FLOAT8" => Value::Float(row.try_get(idx)?),
        "NUMERIC" => {
            let v: BigDecimal = row.try_get(idx)?;
            Value::Float(v.to_f64().ok_or_else(|| out_of_range(&v))?)
        },
        "TIMESTAMP" => Value::Timestamp(row.try_get(idx)?),
        // Stored in UTC; the offset is dropped
        "TIMESTAMPTZ" => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(idx)?.naive_utc()),
        "DATE" => Value::Date(row.try_get(idx)?),
        "BYTEA" => Value::Binary(row.try_get(idx)?),
        "UUID" => Value::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "JSON" | "JSONB" => Value::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()),
        _ => {
            let v: String = row.try_get(idx).unwrap_or_else(|_| format!("<{}>", type_name));
            Value::Text(v)
        },
    };

    Ok(value)
}

#[async_trait]
impl Session for PgSession {
    async fn fetch_table(&mut self, sql: &str) -> Result<Table> {
        let rows = sqlx::query(sql).fetch_all(&mut self.conn).await?;

        let described: Vec<(String, String)> = match rows.first() {
            Some(row) => row
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
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
