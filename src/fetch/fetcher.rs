//! Cached, rate-limited HTTP GET
//!
//! A fresh cache entry short-circuits the request entirely. Otherwise the
//! fetcher waits for a permit for the URL's host, issues the request, and
//! caches the body only when the server answered 200.

use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::rate_limit::RateLimiterRegistry;

/// How long fetched bodies are served from cache by default (one day)
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Default upper bound on a single request
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when fetching a URL
///
/// None of these are retried; the caller decides whether to skip the item,
/// log it, or abort. Messages leave out the URL since callers already report
/// it; it is kept in the `url` field.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or has no host to rate limit on
    #[error("invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection, DNS, timeout or body read failure
    #[error("request failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with something other than 200
    #[error("server returned HTTP {status}")]
    Http { url: String, status: u16 },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Where a fetched body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Fresh cache entry, no request made
    Cache,
    /// Network response
    Network,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchSource::Cache => f.write_str("cache"),
            FetchSource::Network => f.write_str("network"),
        }
    }
}

/// Whether a fetch may be answered from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Serve a fresh cache entry if present
    #[default]
    UseCache,
    /// Always hit the network; successful bodies are still cached
    Refresh,
}

/// A successfully fetched body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// The requested URL
    pub url: String,
    /// Response body as text
    pub body: String,
    /// HTTP status; always 200 since only 200 responses are cached or returned
    pub status: u16,
    /// Whether the body came from the cache or the network
    pub source: FetchSource,
}

/// Returns the rate limiting destination (host) of `url`
pub fn destination(url: &str) -> Result<String, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs can be fetched"));
    }
    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| invalid("URL has no host"))
}

/// HTTP fetcher backed by a shared cache and rate limiter registry
///
/// Cloning is cheap; clones share the HTTP connection pool, the cache and the
/// limiter state.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    cache: Arc<CacheStore>,
    limiter: Arc<RateLimiterRegistry>,
    ttl: Duration,
}

impl Fetcher {
    /// Creates a fetcher with a 30 second request timeout and a one-day TTL
    pub fn new(cache: Arc<CacheStore>, limiter: Arc<RateLimiterRegistry>) -> Result<Self, FetchError> {
        Self::with_timeout(cache, limiter, DEFAULT_TIMEOUT)
    }

    /// Creates a fetcher whose requests give up after `timeout`
    pub fn with_timeout(
        cache: Arc<CacheStore>,
        limiter: Arc<RateLimiterRegistry>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dealsource/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::with_client(client, cache, limiter))
    }

    /// Creates a fetcher around an existing HTTP client
    pub fn with_client(
        client: Client,
        cache: Arc<CacheStore>,
        limiter: Arc<RateLimiterRegistry>,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            ttl: DEFAULT_TTL,
        }
    }

    /// Sets how long successful bodies stay fresh in the cache
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The shared cache store
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetches `url`, serving a fresh cache entry if one exists
    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        self.fetch_with(url, CachePolicy::UseCache).await
    }

    /// Fetches `url` from the network even if it is cached
    pub async fn fetch_fresh(&self, url: &str) -> Result<Fetched, FetchError> {
        self.fetch_with(url, CachePolicy::Refresh).await
    }

    /// Fetches `url` according to `policy`
    ///
    /// # Returns
    /// * `Ok(Fetched)` - body from a fresh cache entry or a 200 response
    /// * `Err(FetchError)` - invalid URL, transport failure or non-200 status;
    ///   the cache is left untouched
    pub async fn fetch_with(&self, url: &str, policy: CachePolicy) -> Result<Fetched, FetchError> {
        let destination = destination(url)?;

        if policy == CachePolicy::UseCache {
            if let Some(body) = self.cache.get::<String>(url) {
                debug!(url, "served from cache");
                return Ok(Fetched {
                    url: url.to_string(),
                    body,
                    status: StatusCode::OK.as_u16(),
                    source: FetchSource::Cache,
                });
            }
        }

        self.limiter.acquire(&destination).await;

        let transport = |source: reqwest::Error| {
            warn!(url, error = %source, "request failed");
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if status != StatusCode::OK {
            warn!(url, status = status.as_u16(), "unsuccessful response");
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        if let Err(e) = self.cache.set(url, &body, self.ttl) {
            warn!(url, error = %e, "failed to cache response body");
        }
        debug!(url, bytes = body.len(), "fetched from network");

        Ok(Fetched {
            url: url.to_string(),
            body,
            status: status.as_u16(),
            source: FetchSource::Network,
        })
    }

    /// Fetches every URL concurrently
    ///
    /// Results come back in input order. One URL failing does not affect the
    /// others; each destination's quota still applies across the batch.
    pub async fn fetch_all<S: AsRef<str>>(
        &self,
        urls: &[S],
        policy: CachePolicy,
    ) -> Vec<Result<Fetched, FetchError>> {
        futures::future::join_all(urls.iter().map(|url| self.fetch_with(url.as_ref(), policy))).await
    }
}
