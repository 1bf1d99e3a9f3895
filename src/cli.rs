//! Command-line interface parsing for dealsource
//!
//! This module handles parsing of CLI arguments using clap and resolving them,
//! together with the optional config file, into the settings for a run.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheStore;
use crate::config::{ConfigError, FetchConfig};
use crate::fetch::{CachePolicy, FetchError, Fetched};

/// Error types for CLI-level failures
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No cache directory was given and none could be derived from the home directory
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    /// At least one URL could not be fetched
    #[error("{failed} of {total} fetches failed")]
    FetchFailures { failed: usize, total: usize },
}

/// dealsource - fetch URLs through a persistent cache with per-host rate limits
#[derive(Parser, Debug)]
#[command(name = "dealsource")]
#[command(about = "Cached, per-host rate-limited fetching for deal-sourcing pipelines")]
#[command(version)]
pub struct Cli {
    /// URLs to fetch
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// TOML config file with cache TTL, timeout and per-host rate limits
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides the config file and the XDG default)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Ignore cached bodies and fetch everything from the network
    #[arg(long)]
    pub fresh: bool,

    /// Write fetched bodies to stdout (summaries move to stderr)
    #[arg(long)]
    pub print: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Settings for a run, resolved from CLI arguments and the config file
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Cache TTL, timeout and rate limits
    pub fetch: FetchConfig,
    /// Where cached bodies live
    pub cache_dir: PathBuf,
    /// Whether cached bodies may be served
    pub policy: CachePolicy,
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// The cache directory is taken from `--cache-dir`, then the config file,
    /// then the XDG cache directory.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with the resolved settings
    /// * `Err(CliError)` if the config file is invalid or no cache directory is available
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let fetch = match &cli.config {
            Some(path) => FetchConfig::load(path)?,
            None => FetchConfig::default(),
        };

        let cache_dir = cli
            .cache_dir
            .clone()
            .or_else(|| fetch.cache_dir.clone())
            .or_else(CacheStore::default_location)
            .ok_or(CliError::NoCacheDir)?;

        let policy = if cli.fresh {
            CachePolicy::Refresh
        } else {
            CachePolicy::UseCache
        };

        Ok(RunConfig {
            fetch,
            cache_dir,
            policy,
        })
    }
}

/// Formats the one-line outcome for a URL
///
/// `ok <url> <source> <bytes>` on success, `fail <url> <error>` otherwise.
pub fn summary_line(url: &str, result: &Result<Fetched, FetchError>) -> String {
    match result {
        Ok(fetched) => format!("ok {} {} {}", url, fetched.source, fetched.body.len()),
        Err(e) => format!("fail {} {}", url, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchSource;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parse_urls() {
        let cli = Cli::parse_from(["dealsource", "https://a.test/1", "https://b.test/2"]);
        assert_eq!(cli.urls, vec!["https://a.test/1", "https://b.test/2"]);
        assert!(!cli.fresh);
        assert!(!cli.print);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_requires_a_url() {
        assert!(Cli::try_parse_from(["dealsource"]).is_err());
    }

    #[test]
    fn test_cli_verbose_counts() {
        let cli = Cli::parse_from(["dealsource", "-vv", "https://a.test/"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["dealsource", "-q", "-v", "https://a.test/"]).is_err());
    }

    #[test]
    fn test_run_config_fresh_policy() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["dealsource", "--fresh", "--cache-dir", &cache_dir, "https://a.test/"]);

        let run = RunConfig::from_cli(&cli).unwrap();

        assert_eq!(run.policy, CachePolicy::Refresh);
        assert_eq!(run.cache_dir, temp_dir.path());
        assert_eq!(run.fetch, FetchConfig::default());
    }

    #[test]
    fn test_run_config_cache_dir_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("dealsource.toml");
        std::fs::write(
            &config_path,
            "cache_ttl_secs = 120\ncache_dir = \"/from/config\"\n",
        )
        .unwrap();
        let config_arg = config_path.to_string_lossy().to_string();

        let cli = Cli::parse_from(["dealsource", "--config", &config_arg, "https://a.test/"]);
        let run = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(run.cache_dir, PathBuf::from("/from/config"));
        assert_eq!(run.fetch.cache_ttl, Duration::from_secs(120));

        let cli = Cli::parse_from([
            "dealsource",
            "--config",
            &config_arg,
            "--cache-dir",
            "/from/flag",
            "https://a.test/",
        ]);
        let run = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(run.cache_dir, PathBuf::from("/from/flag"));
    }

    #[test]
    fn test_run_config_invalid_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        std::fs::write(&config_path, "[rate_limits.\"a.test\"]\nmax_requests = 1\nperiod_secs = 1\n")
            .unwrap();
        let config_arg = config_path.to_string_lossy().to_string();

        let cli = Cli::parse_from(["dealsource", "--config", &config_arg, "https://a.test/"]);
        let result = RunConfig::from_cli(&cli);

        assert!(matches!(result, Err(CliError::Config(ConfigError::MissingDefault))));
    }

    #[test]
    fn test_summary_line() {
        let ok: Result<Fetched, FetchError> = Ok(Fetched {
            url: "https://a.test/".to_string(),
            body: "hello".to_string(),
            status: 200,
            source: FetchSource::Cache,
        });
        assert_eq!(summary_line("https://a.test/", &ok), "ok https://a.test/ cache 5");

        let failed: Result<Fetched, FetchError> = Err(FetchError::Http {
            url: "https://a.test/".to_string(),
            status: 404,
        });
        assert_eq!(
            summary_line("https://a.test/", &failed),
            "fail https://a.test/ server returned HTTP 404"
        );
    }
}
