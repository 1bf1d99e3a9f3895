//! Durable key-value store for fetched responses
//!
//! Provides a `CacheStore` that persists serializable values to JSON files with
//! expiry timestamps. Entries are keyed by an arbitrary string (usually the
//! request URL) and only served while `now < expires_at`.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};

/// Errors that can occur when writing to the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Directory creation or file write failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded as JSON
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The TTL does not fit in a timestamp
    #[error("Cache TTL out of range: {0:?}")]
    TtlOutOfRange(Duration),
}

/// Entry as stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// The original key, kept so hash collisions read as misses
    key: String,
    /// The cached value
    value: T,
    /// When the value was cached
    cached_at: DateTime<Utc>,
    /// When the entry stops being served
    expires_at: DateTime<Utc>,
}

/// Result of peeking at the cache, including freshness metadata
#[derive(Debug)]
pub struct CachedData<T> {
    /// The cached value
    pub value: T,
    /// When the value was cached
    pub cached_at: DateTime<Utc>,
    /// When the entry expires
    pub expires_at: DateTime<Utc>,
    /// Whether the entry has expired
    pub is_expired: bool,
}

/// Disk-backed cache with time-based expiry
///
/// Each entry lives in its own JSON file named after the SHA-256 of its key,
/// inside an XDG-compliant cache directory (`~/.cache/dealsource/` on Linux)
/// unless a directory is given explicitly. Stale entries are left on disk
/// until a later `set` replaces them.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Opens a store rooted at `cache_dir` using the system clock
    ///
    /// The directory is created lazily on the first write.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(cache_dir, Arc::new(SystemClock))
    }

    /// Opens a store rooted at `cache_dir` reading time from `clock`
    pub fn with_clock(cache_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            clock,
        }
    }

    /// Returns the XDG cache directory for this tool
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn default_location() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "dealsource")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Returns the path to the cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.cache_dir.join(format!("{name}.json"))
    }

    /// Reads and decodes the entry for `key`, ignoring freshness
    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        let entry: CacheEntry<T> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key, error = %e, "unreadable cache entry treated as miss");
                return None;
            }
        };
        (entry.key == key).then_some(entry)
    }

    /// Returns the value for `key` if a fresh entry exists
    ///
    /// Missing, expired and unreadable entries all report `None`. Expired
    /// entries are not removed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.read_entry::<T>(key)?;
        if self.clock.now() < entry.expires_at {
            trace!(key, "cache hit");
            Some(entry.value)
        } else {
            trace!(key, expired_at = %entry.expires_at, "cache entry expired");
            None
        }
    }

    /// Returns whether a fresh entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.get::<serde_json::Value>(key).is_some()
    }

    /// Reads the entry for `key` whether or not it has expired
    pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let entry = self.read_entry::<T>(key)?;
        Some(CachedData {
            value: entry.value,
            cached_at: entry.cached_at,
            expires_at: entry.expires_at,
            is_expired: self.clock.now() >= entry.expires_at,
        })
    }

    /// Stores `value` under `key`, replacing any prior entry
    ///
    /// The entry expires `ttl` after the current time. The file is written to
    /// a temporary name and renamed into place, so concurrent writers of the
    /// same key leave exactly one complete entry behind.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir)?;

        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(CacheError::TtlOutOfRange(ttl))?;

        let entry = CacheEntry {
            key: key.to_string(),
            value,
            cached_at: now,
            expires_at,
        };
        let json = serde_json::to_vec(&entry)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.cache_path(key)).map_err(|e| e.error)?;

        trace!(key, %expires_at, "cache entry written");
        Ok(())
    }
}

/// Builds a namespaced cache key such as `research:12345`
///
/// Derived results (extractions, reports) share the store with raw response
/// bodies; the namespace keeps them from colliding with URLs.
pub fn cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut key = namespace.to_string();
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}
