//! Error types for dbclient
//!
//! Every failure carries enough context to act on, and knows whether it is
//! worth retrying. The retry policy consults [`DbClientError::is_retryable`]
//! so that configuration mistakes fail on the first attempt while network
//! and database hiccups get the full backoff schedule.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dbclient operations
pub type Result<T> = std::result::Result<T, DbClientError>;

#[derive(Error, Debug)]
pub enum DbClientError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check the job configuration file.")]
    Config(String),

    /// The YAML job file could not be parsed
    #[error("Failed to parse YAML: {0}. Check the file syntax at the indicated line/column.")]
    Yaml(#[from] serde_yaml::Error),

    /// No `{query_name}.sql` in the query directory
    #[error("Query file not found for '{query}': '{}'. Add the SQL file or fix `load_query`.", path.display())]
    QueryFileNotFound { query: String, path: PathBuf },

    /// The data does not fit the requested shape
    #[error("Schema error: {0}")]
    Schema(String),

    /// `if_exists: fail` and the destination table is already there
    #[error("Table '{0}' already exists. Use `if_exists: replace` or `append` to overwrite or extend it.")]
    TableExists(String),

    /// Connection, query or write failed in the driver
    #[error("Database error: {0}. Check your database connection settings.")]
    Database(#[from] sqlx::Error),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Cache artifact could not be encoded or decoded
    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Raw data dump failed
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

impl DbClientError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Whether running the same operation again could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::Yaml(_)
            | Self::QueryFileNotFound { .. }
            | Self::Schema(_)
            | Self::TableExists(_) => false,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::Csv(_) => true,
        }
    }
}
