//! Durable run-identity cache.
//!
//! Remembers the TestRail plan/run created by an earlier invocation so a
//! retried CI job attaches to the same remote run instead of creating a
//! duplicate. The file-backed cache lives at
//! `{cache_dir}/.testrail-reporter/cache.json`.
//!
//! # Cache Structure
//!
//! A flat JSON object mapping keys to arbitrary JSON values. The reporter
//! uses the keys in [`keys`]:
//!
//! ```json
//! {
//!   "planId": 17,
//!   "runs": { "plan_id": 17, "run_ids": [101, 102] },
//!   "tests": { "plan_id": 17, "tests": { "1234": [9001] } }
//! }
//! ```
//!
//! `runId` is a bare id in run mode (`"runId": 42`). In plan entry mode it
//! names its plan as well (`"runId": { "plan_id": 17, "run_id": 501 }`).
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use testrail_reporter::cache::{FileCache, RunCache, keys};
//!
//! let cache = FileCache::open(Path::new("/path/to/project"));
//! cache.store(keys::RUN_ID, serde_json::json!(42))?;
//! assert_eq!(cache.retrieve(keys::RUN_ID), Some(serde_json::json!(42)));
//! cache.purge()?;
//! # Ok::<(), testrail_reporter::cache::CacheError>(())
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Keys written by the reporter.
pub mod keys {
    /// Id of the plan created (plan mode).
    pub const PLAN_ID: &str = "planId";
    /// Id of the run created (run mode).
    pub const RUN_ID: &str = "runId";
    /// Case id to test id mapping of the cached plan.
    pub const TESTS: &str = "tests";
    /// Run ids contained in the cached plan.
    pub const RUNS: &str = "runs";
}

const CACHE_DIR: &str = ".testrail-reporter";
const CACHE_FILE: &str = "cache.json";

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised while persisting the cache.
///
/// Reads never fail: a missing or unreadable cache is an empty cache.
/// Writes always report their failure, since a silently lost cache leads to
/// duplicate remote runs.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A key/value store for run identities.
///
/// Implementations use interior mutability so one cache can be shared by the
/// reporter and its API client.
pub trait RunCache: Send + Sync {
    /// Inserts or replaces `key`, persisting the change.
    fn store(&self, key: &str, value: Value) -> CacheResult<()>;

    /// Returns the value stored under `key`, if any.
    fn retrieve(&self, key: &str) -> Option<Value>;

    /// Removes every key, persisting the change.
    fn purge(&self) -> CacheResult<()>;
}

impl dyn RunCache {
    /// Serializes `value` and stores it under `key`.
    pub fn store_as<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.store(key, value)
    }

    /// Retrieves `key` and deserializes it as `T`.
    ///
    /// A value of the wrong shape is treated as absent.
    pub fn retrieve_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.retrieve(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Ignoring cached '{}' with unexpected shape: {}", key, e);
                None
            }
        }
    }
}

/// File-backed cache, written through on every change.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileCache {
    /// Opens the cache stored under `cache_dir`.
    ///
    /// If the file doesn't exist or is invalid, starts from an empty cache.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(CACHE_DIR).join(CACHE_FILE);

        tracing::debug!("Loading run cache from: {}", path.display());

        let entries = if !path.exists() {
            tracing::debug!("Cache file does not exist, starting empty");
            BTreeMap::new()
        } else {
            match fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<BTreeMap<String, Value>>(&contents) {
                    Ok(entries) => {
                        tracing::debug!("Loaded {} cache entries", entries.len());
                        entries
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse cache file, starting empty: {}", e);
                        BTreeMap::new()
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read cache file, starting empty: {}", e);
                    BTreeMap::new()
                }
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, entries: &BTreeMap<String, Value>) -> CacheResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let contents = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, contents).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!("Saved {} cache entries", entries.len());
        Ok(())
    }
}

impl RunCache for FileCache {
    fn store(&self, key: &str, value: Value) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!("Caching '{}' = {}", key, value);
        entries.insert(key.to_string(), value);
        self.save(&entries)
    }

    fn retrieve(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn purge(&self) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        self.save(&entries)
    }
}

/// Process-local cache with no persistence.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunCache for MemoryCache {
    fn store(&self, key: &str, value: Value) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn purge(&self) -> CacheResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}
