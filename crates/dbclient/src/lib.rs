//! dbclient library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Building blocks for recurring SQL extract jobs: run a named query, keep
//! one cached copy of its result per day, look at it, change it, and write
//! it back to a (possibly different) database.
//!
//! # Overview
//!
//! - **Loading**: [`DataLoader`] reads `{query_dir}/{name}.sql`, runs it and
//!   returns a [`Table`] with lower-case column names and an optional index.
//! - **Caching**: [`QueryCache`] keeps at most one artifact per query name.
//! - **Writing**: [`DataWriter`] infers destination column types
//!   ([`WireTypeMap`]) and creates, replaces or appends to a table.
//! - **Retrying**: both are wrapped in [`retry_async`] with a [`RetryPolicy`].
//! - **Jobs**: [`Pipeline`] runs a whole [`JobConfig`].
//!
//! # Example
//!
//! ```no_run
//! use dbclient::{JobConfig, Pipeline};
//!
//! async fn run() -> dbclient::Result<()> {
//!     let config = JobConfig::load("project_config.yaml")?;
//!     let pipeline = Pipeline::from_config(config)?;
//!     pipeline
//!         .run_with(&mut std::io::stdout(), |table| {
//!             // adjust the table here
//!             Ok(table)
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod retry;
pub mod table;
pub mod wire_types;
pub mod writer;

// Re-export commonly used types
pub use cache::QueryCache;
pub use config::JobConfig;
pub use db::{Connector, DatabaseConnector, DatabaseKind, DatabaseSettings, IfExists, Session};
pub use error::{DbClientError, Result};
pub use loader::DataLoader;
pub use pipeline::{Pipeline, RunReport};
pub use retry::{retry_async, RetryPolicy};
pub use table::{Column, ColumnType, Table, Value};
pub use wire_types::{WireType, WireTypeMap};
pub use writer::DataWriter;
