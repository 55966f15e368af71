//! MySQL / MariaDB session

use super::{assemble, bind_row, decode_failed, insert_batches, out_of_range};
use super::{DatabaseKind, DatabaseSettings, IfExists, Session, WritePlan};
use crate::error::Result;
use crate::table::{ColumnType, Table, Value};
use crate::wire_types::WireTypeMap;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

const KIND: DatabaseKind = DatabaseKind::MySql;

pub(super) struct MySqlSession {
    conn: MySqlConnection,
}

impl MySqlSession {
    pub(super) async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port.or(KIND.default_port()).unwrap_or(3306))
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database);
        if let Some(charset) = &settings.charset {
            options = options.charset(charset);
        }

        let conn = MySqlConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }
}

/// Semantic type for a MySQL column type name
fn column_type_of(type_name: &str) -> ColumnType {
    match type_name {
        "BOOLEAN" => ColumnType::Boolean,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnType::Integer,
        name if name.ends_with(" UNSIGNED") => ColumnType::Integer,
        "FLOAT" | "DOUBLE" | "DECIMAL" => ColumnType::Float,
        "DATETIME" | "TIMESTAMP" => ColumnType::Timestamp,
        "DATE" => ColumnType::Date,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => ColumnType::Binary,
        _ => ColumnType::Text,
    }
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match column_type_of(type_name) {
        ColumnType::Boolean => Value::Boolean(row.try_get(idx)?),
        ColumnType::Integer if type_name.ends_with(" UNSIGNED") => {
            let v: u64 = row.try_get(idx)?;
            Value::Integer(i64::try_from(v).map_err(|_| out_of_range(v))?)
        },
        ColumnType::Integer => Value::Integer(row.try_get(idx)?),
        ColumnType::Float => match type_name {
            "FLOAT" => Value::Float(f64::from(row.try_get::<f32, _>(idx)?)),
            "DECIMAL" => {
                let v: BigDecimal = row.try_get(idx)?;
                Value::Float(v.to_f64().ok_or_else(|| out_of_range(&v))?)
            },
            _ => Value::Float(row.try_get(idx)?),
        },
        ColumnType::Timestamp => Value::Timestamp(row.try_get(idx)?),
        ColumnType::Date => Value::Date(row.try_get(idx)?),
        ColumnType::Binary => Value::Binary(row.try_get(idx)?),
        ColumnType::Text => match type_name {
            // Durations outside 00:00:00..24:00:00 fall through to the placeholder
            "TIME" => match row.try_get::<chrono::NaiveTime, _>(idx) {
                Ok(v) => Value::Text(v.to_string()),
                Err(_) => Value::Text(format!("<{}>", type_name)),
            },
            "JSON" => Value::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()),
            // ENUM, SET and friends come back as text; anything that
            // cannot is shown as a placeholder
            _ => {
                let v: String = row.try_get(idx).unwrap_or_else(|_| format!("<{}>", type_name));
                Value::Text(v)
            },
        },
    };

    Ok(value)
}

#[async_trait]
impl Session for MySqlSession {
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
        // MySQL commits DDL implicitly; the transaction still groups the inserts
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
