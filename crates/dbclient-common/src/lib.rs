//! dbclient common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by every dbclient binary. Today that is the logging setup:
//! one place decides how `tracing` output is formatted, filtered and where
//! it ends up.
//!
//! # Example
//!
//! ```no_run
//! use dbclient_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! fn main() -> anyhow::Result<()> {
//!     let base = LogConfig::builder().level(LogLevel::Debug).build();
//!     let _guard = init_logging(&LogConfig::from_env_or(base)?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LoggingGuard};
