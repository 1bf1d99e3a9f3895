//! Cache module for storing fetched responses on disk
//!
//! Entries persist across process restarts so an interrupted pipeline can
//! resume without re-fetching URLs it already has. Expiry is passive: a stale
//! entry reads as absent and is replaced by the next successful write.

mod manager;

pub use manager::{cache_key, CacheError, CacheStore, CachedData};
