//! Fetch-layer configuration
//!
//! Settings come from an optional TOML file. Anything left out falls back to
//! the built-in values: a one-day cache TTL, a 30 second request timeout and
//! the built-in per-host quotas.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::rate_limit::{RateLimitRule, RateLimiterRegistry, RuleError};

/// Key of the mandatory fallback quota in `[rate_limits]`
pub const DEFAULT_RULE_KEY: &str = "default";

/// Default cache TTL in seconds (one day)
const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// Default per-request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `[rate_limits]` is present but has no `default` entry
    #[error("rate_limits must contain a 'default' entry")]
    MissingDefault,

    /// A quota can never issue a permit
    #[error("Invalid rate limit for '{destination}': {source}")]
    InvalidRule {
        destination: String,
        #[source]
        source: RuleError,
    },

    /// A duration setting was zero
    #[error("'{0}' must be greater than zero")]
    ZeroDuration(&'static str),
}

/// A quota as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSpec {
    /// Requests allowed per period
    pub max_requests: u32,
    /// Period length in seconds
    pub period_secs: u64,
}

impl RateLimitSpec {
    fn to_rule(self, destination: &str) -> Result<RateLimitRule, ConfigError> {
        RateLimitRule::new(self.max_requests, Duration::from_secs(self.period_secs)).map_err(
            |source| ConfigError::InvalidRule {
                destination: destination.to_string(),
                source,
            },
        )
    }
}

/// Raw file layout
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cache_ttl_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
    rate_limits: Option<BTreeMap<String, RateLimitSpec>>,
}

/// Settings for the cache, HTTP client and rate limiter
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// How long fetched bodies stay fresh
    pub cache_ttl: Duration,
    /// Upper bound on a single HTTP request
    pub request_timeout: Duration,
    /// Cache location; `None` means the XDG cache directory
    pub cache_dir: Option<PathBuf>,
    /// Per-destination quotas including `default`; `None` means built-in quotas
    pub rate_limits: Option<BTreeMap<String, RateLimitSpec>>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cache_dir: None,
            rate_limits: None,
        }
    }
}

impl FetchConfig {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text
    ///
    /// # Returns
    /// * `Ok(FetchConfig)` with unspecified settings at their defaults
    /// * `Err(ConfigError)` if the text is malformed, a quota is zero, or
    ///   `[rate_limits]` lacks a `default` entry
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let defaults = Self::default();

        let cache_ttl = file
            .cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);
        if cache_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("cache_ttl_secs"));
        }

        let request_timeout = file
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout_secs"));
        }

        let config = Self {
            cache_ttl,
            request_timeout,
            cache_dir: file.cache_dir,
            rate_limits: file.rate_limits,
        };
        config.build_registry()?;
        Ok(config)
    }

    /// Builds the rate limiter registry described by `rate_limits`
    pub fn build_registry(&self) -> Result<RateLimiterRegistry, ConfigError> {
        let Some(limits) = &self.rate_limits else {
            return Ok(RateLimiterRegistry::default());
        };

        let default_rule = limits
            .get(DEFAULT_RULE_KEY)
            .ok_or(ConfigError::MissingDefault)?
            .to_rule(DEFAULT_RULE_KEY)?;

        limits
            .iter()
            .filter(|(destination, _)| destination.as_str() != DEFAULT_RULE_KEY)
            .try_fold(
                RateLimiterRegistry::new(default_rule),
                |registry, (destination, spec)| -> Result<_, ConfigError> {
                    Ok(registry.with_rule(destination.as_str(), spec.to_rule(destination)?))
                },
            )
    }
}
