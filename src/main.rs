//! dealsource - fetch URLs through the shared cache and per-host rate limits
//!
//! Fetches every URL given on the command line concurrently, reusing bodies
//! cached by earlier runs, and reports one line per URL.

use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;

use dealsource::cache::CacheStore;
use dealsource::cli::{summary_line, Cli, CliError, RunConfig};
use dealsource::fetch::Fetcher;
use dealsource::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet)?;

    let run = RunConfig::from_cli(&cli)?;
    tracing::info!(cache_dir = %run.cache_dir.display(), "starting fetch run");

    let cache = Arc::new(CacheStore::open(&run.cache_dir));
    let limiter = Arc::new(run.fetch.build_registry()?);
    let fetcher = Fetcher::with_timeout(cache, limiter, run.fetch.request_timeout)?
        .with_ttl(run.fetch.cache_ttl);

    let results = fetcher.fetch_all(&cli.urls, run.policy).await;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let stderr = io::stderr();
    let mut stderr = stderr.lock();
    for (url, result) in cli.urls.iter().zip(&results) {
        let line = summary_line(url, result);
        if cli.print {
            writeln!(stderr, "{}", line)?;
            if let Ok(fetched) = result {
                stdout.write_all(fetched.body.as_bytes())?;
                writeln!(stdout)?;
            }
        } else {
            writeln!(stdout, "{}", line)?;
        }
    }
    stdout.flush()?;

    let failed = results.iter().filter(|result| result.is_err()).count();
    if failed > 0 {
        return Err(CliError::FetchFailures {
            failed,
            total: results.len(),
        }
        .into());
    }

    Ok(())
}
