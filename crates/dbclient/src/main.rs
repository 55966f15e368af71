//! dbclient - run one SQL extract job

use anyhow::{Context, Result};
use clap::Parser;
use dbclient::config::DEFAULT_CONFIG_FILE;
use dbclient::{JobConfig, Pipeline};
use dbclient_common::logging::{init_logging, LogConfig, LogLevel};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dbclient")]
#[command(author, version, about = "Load a SQL query result, preview it and optionally write it back")]
struct Cli {
    /// Job configuration file
    #[arg(short, long, env = "DBCLIENT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("dbclient")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_or(log_config)?;
    let _guard = init_logging(&log_config)?;

    let config = JobConfig::load(&cli.config)
        .with_context(|| format!("Failed to load job configuration from {}", cli.config.display()))?;
    info!(query = %config.load_query, "Starting job");

    let pipeline = Pipeline::from_config(config)?;
    let mut stdout = std::io::stdout().lock();
    let report = match pipeline.run(&mut stdout).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Job failed");
            return Err(e.into());
        },
    };

    info!(
        rows_loaded = report.rows_loaded,
        rows_written = ?report.rows_written,
        "Job complete"
    );
    Ok(())
}
