//! Logging init: tracing events to stderr, filtered by RUST_LOG or the CLI verbosity flags.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Default filter for the given flags. RUST_LOG, when set, takes precedence.
fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "info,clipfetch=debug"
    } else {
        "warn"
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(verbose: bool, quiet: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("could not initialize logging: {}", e))
}
