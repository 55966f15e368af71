//! Daily on-disk cache of query results
//!
//! Each query has at most one artifact at a time, named
//! `{query}_cache_{YYYYMMDD}.json.gz`: a gzip-compressed JSON snapshot of
//! the [`Table`] plus the query name and creation time. Artifacts are
//! written once, never updated, and removed when a newer result for the
//! same query is stored.

use crate::error::{DbClientError, Result};
use crate::table::Table;
use chrono::{DateTime, NaiveDate, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CACHE_EXTENSION: &str = "json.gz";

#[derive(Debug, Serialize, Deserialize)]
struct CacheArtifact {
    query: String,
    created_at: DateTime<Utc>,
    table: Table,
}

/// Cache artifacts for all queries in one directory
#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: PathBuf,
}

impl QueryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of `query`'s artifact for `date`
    pub fn artifact_name(query: &str, date: NaiveDate) -> String {
        format!("{}_cache_{}.{}", query, date.format("%Y%m%d"), CACHE_EXTENSION)
    }

    pub fn artifact_path(&self, query: &str, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::artifact_name(query, date))
    }

    /// Read `query`'s artifact for `date`.
    ///
    /// Returns `Ok(None)` when there is none. An unreadable or malformed
    /// artifact is an error.
    pub fn load(&self, query: &str, date: NaiveDate) -> Result<Option<Table>> {
        let path = self.artifact_path(query, date);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let artifact: CacheArtifact = serde_json::from_reader(GzDecoder::new(BufReader::new(file)))?;
        if artifact.query != query {
            return Err(DbClientError::schema(format!(
                "cache artifact '{}' belongs to query '{}'",
                path.display(),
                artifact.query
            )));
        }
        artifact.table.validate()?;

        debug!(path = %path.display(), created_at = %artifact.created_at, "Read cache artifact");
        Ok(Some(artifact.table))
    }

    /// Write `table` as `query`'s artifact for `date`.
    ///
    /// The artifact is written next to its final name and renamed into
    /// place, so readers never see a partial file.
    pub fn store(&self, query: &str, date: NaiveDate, table: &Table) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.artifact_path(query, date);
        let staging = self.dir.join(format!("{}.tmp", Self::artifact_name(query, date)));

        let artifact = CacheArtifact {
            query: query.to_string(),
            created_at: Utc::now(),
            table: table.clone(),
        };

        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&staging)?), Compression::default());
        serde_json::to_writer(&mut encoder, &artifact)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        drop(writer);

        fs::rename(&staging, &path)?;
        debug!(path = %path.display(), rows = table.num_rows(), "Wrote cache artifact");
        Ok(path)
    }

    /// Every file in the cache directory that belongs to `query`, any date.
    fn owned_files(&self, query: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}_cache_", query);
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Artifacts currently stored for `query`
    pub fn artifacts(&self, query: &str) -> Result<Vec<PathBuf>> {
        let suffix = format!(".{}", CACHE_EXTENSION);
        Ok(self
            .owned_files(query)?
            .into_iter()
            .filter(|p| p.to_string_lossy().ends_with(&suffix))
            .collect())
    }

    /// Delete every file belonging to `query`, whatever its date.
    pub fn evict(&self, query: &str) -> Result<Vec<PathBuf>> {
        let files = self.owned_files(query)?;
        for file in &files {
            fs::remove_file(file)?;
            debug!(path = %file.display(), "Evicted cache artifact");
        }
        Ok(files)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::{ColumnType, Value};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sample() -> Table {
        let mut table = Table::from_rows(
            vec![
                ("region".to_string(), ColumnType::Text),
                ("revenue".to_string(), ColumnType::Float),
                ("booked_at".to_string(), ColumnType::Timestamp),
            ],
            vec![vec![
                Value::Text("north".into()),
                Value::Float(0.1 + 0.2),
                Value::Timestamp(day(1).and_hms_opt(9, 30, 0).unwrap()),
            ]],
        )
        .unwrap();
        table.set_index(1).unwrap();
        table
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(QueryCache::artifact_name("sales", day(1)), "sales_cache_20240101.json.gz");
    }

    #[test]
    fn test_store_then_load_returns_same_table() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path());

        let path = cache.store("sales", day(1), &sample()).unwrap();
        assert!(path.exists());
        assert_eq!(cache.load("sales", day(1)).unwrap(), Some(sample()));
    }

    #[test]
    fn test_non_finite_floats_survive() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path());
        let table = Table::from_rows(
            vec![("ratio".to_string(), ColumnType::Float)],
            vec![
                vec![Value::Float(f64::NAN)],
                vec![Value::Float(f64::INFINITY)],
                vec![Value::Float(f64::NEG_INFINITY)],
                vec![Value::Float(1.0)],
            ],
        )
        .unwrap();

        cache.store("ratios", day(1), &table).unwrap();
        let loaded = cache.load("ratios", day(1)).unwrap().unwrap();

        let values = loaded.column("ratio").unwrap().values();
        assert!(matches!(values[0], Value::Float(v) if v.is_nan()));
        assert_eq!(values[1], Value::Float(f64::INFINITY));
        assert_eq!(values[2], Value::Float(f64::NEG_INFINITY));
        assert_eq!(values[3], Value::Float(1.0));
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path());
        assert_eq!(cache.load("sales", day(1)).unwrap(), None);
        assert_eq!(QueryCache::new(dir.path().join("absent")).load("sales", day(1)).unwrap(), None);
    }

    #[test]
    fn test_load_corrupt_artifact_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path());
        fs::write(cache.artifact_path("sales", day(1)), b"not gzip").unwrap();
        assert!(cache.load("sales", day(1)).is_err());
    }

    #[test]
    fn test_evict_removes_every_date() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path());
        cache.store("sales", day(1), &sample()).unwrap();
        cache.store("sales", day(2), &sample()).unwrap();

        let evicted = cache.evict("sales").unwrap();
        assert_eq!(evicted.len(), 2);
        assert!(cache.artifacts("sales").unwrap().is_empty());
    }

    #[test]
    fn test_evict_leaves_other_queries_alone() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path());
        cache.store("sales", day(1), &sample()).unwrap();
        cache.store("sales_eu", day(1), &sample()).unwrap();
        fs::write(dir.path().join("sales.sql"), "SELECT 1").unwrap();

        cache.evict("sales").unwrap();

        assert!(cache.artifacts("sales").unwrap().is_empty());
        assert_eq!(cache.artifacts("sales_eu").unwrap().len(), 1);
        assert!(dir.path().join("sales.sql").exists());
    }

    #[test]
    fn test_evict_missing_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(dir.path().join("absent"));
        assert!(cache.evict("sales").unwrap().is_empty());
    }
}
