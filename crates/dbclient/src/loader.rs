//! Data loader: cached or fresh query results

use crate::cache::QueryCache;
use crate::db::{close_after, Connector};
use crate::error::{DbClientError, Result};
use crate::retry::{retry_async, RetryPolicy};
use crate::table::Table;
use chrono::{NaiveDate, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs named queries from a query directory, with an optional daily cache
pub struct DataLoader {
    connector: Arc<dyn Connector>,
    cache: QueryCache,
    query_dir: PathBuf,
    policy: RetryPolicy,
    date: NaiveDate,
}

impl DataLoader {
    /// Loader stamping cache artifacts with today's UTC date
    pub fn new(connector: Arc<dyn Connector>, cache_dir: impl Into<PathBuf>, query_dir: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            cache: QueryCache::new(cache_dir),
            query_dir: query_dir.into(),
            policy: RetryPolicy::default(),
            date: Utc::now().date_naive(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use `date` instead of today for cache lookups and new artifacts.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn query_dir(&self) -> &Path {
        &self.query_dir
    }

    pub fn query_path(&self, query_name: &str) -> PathBuf {
        self.query_dir.join(format!("{}.sql", query_name))
    }

    /// Load the result of `query_name`.
    ///
    /// With `use_cache`, today's artifact is returned when there is one and
    /// no connection is made. Otherwise the query runs, column names are
    /// lower-cased, the first `index_column_count` columns become the index,
    /// older artifacts of the query are removed and, with `use_cache`, the
    /// result is cached for the rest of the day.
    ///
    /// The whole operation is retried according to the loader's policy.
    pub async fn load(&self, query_name: &str, index_column_count: usize, use_cache: bool) -> Result<Table> {
        let operation = format!("load_data({})", query_name);
        retry_async(&operation, &self.policy, || {
            self.load_once(query_name, index_column_count, use_cache)
        })
        .await
    }

    async fn load_once(&self, query_name: &str, index_column_count: usize, use_cache: bool) -> Result<Table> {
        if use_cache {
            match self.cache.load(query_name, self.date) {
                Ok(Some(table)) => {
                    info!(query = query_name, date = %self.date, "Loading {} data from cache", query_name);
                    return Ok(table);
                },
                Ok(None) => {
                    debug!(query = query_name, date = %self.date, "No cache artifact");
                },
                Err(e) => {
                    warn!(query = query_name, error = %e, "Ignoring unreadable cache artifact");
                },
            }
        }

        info!(query = query_name, "Querying {} from database", query_name);
        let sql = self.read_query(query_name).await?;

        let mut session = self.connector.connect().await?;
        let fetched = session.fetch_table(&sql).await;
        let mut table = close_after(session, fetched).await?;

        table.lowercase_column_names();
        table.set_index(index_column_count)?;

        let evicted = self.cache.evict(query_name)?;
        if !evicted.is_empty() {
            debug!(query = query_name, count = evicted.len(), "Removed stale cache artifacts");
        }

        if use_cache {
            let path = self.cache.store(query_name, self.date, &table)?;
            info!(query = query_name, path = %path.display(), "Cached query result");
        }

        Ok(table)
    }

    async fn read_query(&self, query_name: &str) -> Result<String> {
        let path = self.query_path(query_name);
        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DbClientError::QueryFileNotFound {
                query: query_name.to_string(),
                path: path.clone(),
            },
            _ => DbClientError::Io(e),
        })
    }
}
