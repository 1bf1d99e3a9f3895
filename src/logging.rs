//! Logging initialization
//!
//! Installs a `tracing` fmt subscriber on stderr so stdout stays free for
//! fetch results.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Maps verbosity flags to a log level
///
/// WARN by default, INFO with `-v`, DEBUG with `-vv`, TRACE beyond that.
/// `--quiet` wins and drops to ERROR.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize the global tracing subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber was already set.
pub fn init(verbose: u8, quiet: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_for(verbose, quiet))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
