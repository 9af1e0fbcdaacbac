//! Structured logging via `tracing`.
//!
//! Log output goes to stderr so it never mixes with values written to
//! stdout.  The filter comes from the `SB_LOG` environment variable when set
//! (any `EnvFilter` directive, e.g. `SB_LOG=scriptblock::engine=trace`),
//! otherwise from the command-line verbosity.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "SB_LOG";

/// Level used when `SB_LOG` is unset, by number of `-v` flags.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn build_env_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level_for(verbose)))
}

/// Install the global subscriber.  Fails if one is already installed.
pub fn init_logging(verbose: u8) -> Result<(), TryInitError> {
    Registry::default()
        .with(build_env_filter(verbose))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }
}
