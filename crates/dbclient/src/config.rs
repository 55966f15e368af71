//! Job configuration (project_config.yaml)
//!
//! One YAML file describes a run: the directories to use, where to read
//! from, where (optionally) to write to, which query to run and how.
//!
//! ```yaml
//! directories:
//!   cache_dir: cache
//!   query_dir: queries
//!   datadump_dir: datadump
//! load:
//!   host: db.internal
//!   port: 3306
//!   username: etl
//!   password: secret
//!   database: shop
//! store:
//!   drivername: mysql+pymysql
//!   username: etl
//!   password: secret
//!   host: warehouse.internal
//!   port: 3306
//!   database: reporting
//!   encoding: utf8
//! load_query: sales
//! index_columns: 1
//! use_cache: true
//! ```

use crate::db::{DatabaseKind, DatabaseSettings, IfExists};
use crate::error::{DbClientError, Result};
use crate::retry::RetrySettings;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default job file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "project_config.yaml";

pub const LOAD_PASSWORD_ENV: &str = "DBCLIENT_LOAD_PASSWORD";
pub const STORE_PASSWORD_ENV: &str = "DBCLIENT_STORE_PASSWORD";

const DEFAULT_CHARSET: &str = "utf8";

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Named directories, all created at startup
    pub directories: BTreeMap<String, PathBuf>,

    /// Source database
    pub load: SourceConfig,

    /// Destination database; writing is disabled without it
    #[serde(default, deserialize_with = "lenient_store")]
    pub store: Option<StoreConfig>,

    /// Query to run, `{query_dir}/{load_query}.sql`
    pub load_query: String,

    #[serde(default)]
    pub index_columns: usize,

    #[serde(default)]
    pub use_cache: bool,

    /// Write the (transformed) result back
    #[serde(default)]
    pub write: Option<WriteConfig>,

    /// Dump the loaded result to `{datadump_dir}/{load_query}_raw.csv`
    #[serde(default)]
    pub dump_raw: bool,

    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Clone, Deserialize)]
pub struct SourceConfig {
    /// `mysql` unless stated otherwise
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
}

#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    pub drivername: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub encoding: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteConfig {
    pub table: String,
    #[serde(default)]
    pub if_exists: IfExists,
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

// A store section with missing keys counts as no store section.
fn lenient_store<'de, D>(deserializer: D) -> std::result::Result<Option<StoreConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(value) => match serde_yaml::from_value::<StoreConfig>(value) {
            Ok(store) => Ok(Some(store)),
            Err(e) => {
                warn!(error = %e, "Incomplete store section, writing is disabled");
                Ok(None)
            },
        },
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .finish()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("drivername", &self.drivername)
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl SourceConfig {
    pub fn to_settings(&self) -> Result<DatabaseSettings> {
        let kind = match &self.driver {
            Some(driver) => DatabaseKind::from_driver_name(driver)?,
            None => DatabaseKind::MySql,
        };
        Ok(DatabaseSettings {
            kind,
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            charset: (kind == DatabaseKind::MySql).then(|| self.charset.clone()),
        })
    }
}

impl StoreConfig {
    pub fn to_settings(&self) -> Result<DatabaseSettings> {
        let kind = DatabaseKind::from_driver_name(&self.drivername)?;
        Ok(DatabaseSettings {
            kind,
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            charset: (kind == DatabaseKind::MySql).then(|| self.encoding.clone()),
        })
    }
}

impl JobConfig {
    /// Read, override from the environment and validate the job file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DbClientError::config(format!("cannot read job file '{}': {}", path.display(), e))
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        debug!(path = %path.display(), query = %config.load_query, "Loaded job configuration");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Replace passwords with the values of `DBCLIENT_LOAD_PASSWORD` and
    /// `DBCLIENT_STORE_PASSWORD` when `lookup` has them.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup(LOAD_PASSWORD_ENV) {
            self.load.password = password;
        }
        if let (Some(store), Some(password)) = (self.store.as_mut(), lookup(STORE_PASSWORD_ENV)) {
            store.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for key in ["cache_dir", "query_dir"] {
            if !self.directories.contains_key(key) {
                return Err(DbClientError::config(format!("directories.{} is required", key)));
            }
        }

        if self.load_query.trim().is_empty() {
            return Err(DbClientError::config("load_query cannot be empty"));
        }

        if self.dump_raw && !self.directories.contains_key("datadump_dir") {
            return Err(DbClientError::config("dump_raw needs directories.datadump_dir"));
        }

        if let Some(write) = &self.write {
            if write.table.trim().is_empty() {
                return Err(DbClientError::config("write.table cannot be empty"));
            }
            if self.store.is_none() {
                warn!(table = %write.table, "A write is configured but there is no store section");
            }
        }

        self.load.to_settings()?;
        if let Some(store) = &self.store {
            store.to_settings()?;
        }
        self.retry.to_policy()?;

        Ok(())
    }

    fn directory(&self, key: &str) -> Result<&Path> {
        self.directories
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| DbClientError::config(format!("directories.{} is required", key)))
    }

    pub fn cache_dir(&self) -> Result<&Path> {
        self.directory("cache_dir")
    }

    pub fn query_dir(&self) -> Result<&Path> {
        self.directory("query_dir")
    }

    pub fn datadump_dir(&self) -> Result<&Path> {
        self.directory("datadump_dir")
    }

    /// Create every configured directory that does not exist yet.
    pub fn ensure_directories(&self) -> Result<()> {
        for (name, path) in &self.directories {
            if path.is_dir() {
                debug!(name = %name, path = %path.display(), "Directory already exists");
            } else {
                std::fs::create_dir_all(path)?;
                debug!(name = %name, path = %path.display(), "Directory created");
            }
        }
        Ok(())
    }
}
