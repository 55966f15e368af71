//! Data writer: tables back into a destination database

use crate::db::{close_after, Connector, IfExists};
use crate::error::{DbClientError, Result};
use crate::retry::{retry_async, RetryPolicy};
use crate::table::Table;
use crate::wire_types::WireTypeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DataWriter {
    connector: Option<Arc<dyn Connector>>,
    policy: RetryPolicy,
}

impl DataWriter {
    /// Writer for `connector`; `None` when no destination is configured.
    pub fn new(connector: Option<Arc<dyn Connector>>) -> Self {
        Self {
            connector,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn has_destination(&self) -> bool {
        self.connector.is_some()
    }

    /// Write `table`, index columns included, to `table_name`.
    ///
    /// Without a destination this fails straight away with a configuration
    /// error. Otherwise wire types are inferred once and the write is
    /// retried according to the writer's policy. Returns the number of rows
    /// inserted.
    pub async fn write(&self, table: &Table, table_name: &str, if_exists: IfExists) -> Result<u64> {
        info!(table = table_name, rows = table.num_rows(), ?if_exists, "Writing table to database");

        let connector = self
            .connector
            .as_deref()
            .ok_or_else(|| DbClientError::config("no destination is given to store data, add a `store` section"))?;

        if table.num_columns() == 0 {
            return Err(DbClientError::schema(format!("cannot write '{}' without any columns", table_name)));
        }

        let table = table.clone().reset_index();
        let wire_types = WireTypeMap::infer(&table);
        debug!(target_db = %connector.target(), table = table_name, "Resolved destination");

        let operation = format!("write_data({})", table_name);
        let written = retry_async(&operation, &self.policy, || {
            write_once(connector, &table, table_name, if_exists, &wire_types)
        })
        .await?;

        info!(table = table_name, rows = written, "Wrote table");
        Ok(written)
    }
}

async fn write_once(
    connector: &dyn Connector,
    table: &Table,
    table_name: &str,
    if_exists: IfExists,
    wire_types: &WireTypeMap,
) -> Result<u64> {
    let mut session = connector.connect().await?;
    let written = session.write_table(table, table_name, if_exists, wire_types).await;
    close_after(session, written).await
}
