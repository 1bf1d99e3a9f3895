//! HTTP fetching through the cache and rate limiter
//!
//! `Fetcher` is the entry point pipelines use to download registry pages,
//! feeds and other documents. Failures are returned once and never retried.

mod fetcher;

pub use fetcher::{
    destination, CachePolicy, FetchError, FetchSource, Fetched, Fetcher, DEFAULT_TTL,
};
