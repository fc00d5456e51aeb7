//! Logging setup for the CLI.
//!
//! Library crates only emit `tracing` events; the binary decides what is
//! shown. The level is chosen in this order:
//!
//! 1. `--verbose`: debug for the stitch crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`
//! 4. info for the stitch crates
//!
//! # Example
//!
//! ```rust,no_run
//! use stitch_cli::logger::init_logger;
//! use tracing::{debug, info};
//!
//! init_logger(false, false, false);
//!
//! info!("resolving configuration");
//! debug!(plugins = 7, "plugins applied");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str =
    "stitch=debug,stitch_cli=debug,stitch_service=debug,stitch_config=debug,stitch_chain=debug";
const QUIET_FILTER: &str = "error";
const DEFAULT_FILTER: &str =
    "stitch=info,stitch_cli=info,stitch_service=info,stitch_config=info,stitch_chain=info";

pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .compact();

    // A second call (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pick_the_filter() {
        assert_eq!(filter_for(true, false).to_string(), EnvFilter::new(VERBOSE_FILTER).to_string());
        assert_eq!(filter_for(false, true).to_string(), QUIET_FILTER);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_logger(false, true, true);
        init_logger(true, false, true);
    }
}
