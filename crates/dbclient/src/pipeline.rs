//! One job run: load, preview, transform, dump, write

use crate::config::JobConfig;
use crate::db::{Connector, DatabaseConnector};
use crate::error::Result;
use crate::loader::DataLoader;
use crate::table::{self, Table};
use crate::writer::DataWriter;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Rows shown in the preview
pub const PREVIEW_ROWS: usize = 5;

/// What a run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub rows_loaded: usize,
    pub dump_path: Option<PathBuf>,
    pub rows_written: Option<u64>,
}

pub struct Pipeline {
    config: JobConfig,
    loader: DataLoader,
    writer: DataWriter,
}

impl Pipeline {
    /// Create the configured directories and connect loader and writer to
    /// the configured databases.
    pub fn from_config(config: JobConfig) -> Result<Self> {
        config.ensure_directories()?;
        let policy = config.retry.to_policy()?;

        let source: Arc<dyn Connector> = Arc::new(DatabaseConnector::new(config.load.to_settings()?));
        let loader = DataLoader::new(source, config.cache_dir()?, config.query_dir()?).with_policy(policy.clone());

        let destination = match &config.store {
            Some(store) => Some(Arc::new(DatabaseConnector::new(store.to_settings()?)) as Arc<dyn Connector>),
            None => None,
        };
        let writer = DataWriter::new(destination).with_policy(policy);

        Ok(Self::new(config, loader, writer))
    }

    pub fn new(config: JobConfig, loader: DataLoader, writer: DataWriter) -> Self {
        Self { config, loader, writer }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn writer(&self) -> &DataWriter {
        &self.writer
    }

    /// Run with the identity transform.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<RunReport> {
        self.run_with(out, Ok).await
    }

    /// Load the configured query, print a preview and summary to `out`,
    /// apply `transform`, then dump and write as configured.
    pub async fn run_with<W, F>(&self, out: &mut W, transform: F) -> Result<RunReport>
    where
        W: Write,
        F: FnOnce(Table) -> Result<Table>,
    {
        let config = &self.config;
        let loaded = self
            .loader
            .load(&config.load_query, config.index_columns, config.use_cache)
            .await?;
        let rows_loaded = loaded.num_rows();

        writeln!(out, "{}", table::render(&loaded.head(PREVIEW_ROWS)))?;
        writeln!(out, "{}", table::render(&table::describe(&loaded)))?;

        let dump_path = if config.dump_raw {
            let path = config.datadump_dir()?.join(format!("{}_raw.csv", config.load_query));
            loaded.write_csv(&path)?;
            info!(path = %path.display(), "Dumped raw data");
            Some(path)
        } else {
            None
        };

        let transformed = transform(loaded)?;

        let rows_written = match &config.write {
            Some(write) => Some(self.writer.write(&transformed, &write.table, write.if_exists).await?),
            None => None,
        };

        Ok(RunReport {
            rows_loaded,
            dump_path,
            rows_written,
        })
    }
}
