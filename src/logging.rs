//! Logging configuration for dbquery.
//!
//! Logs always go to stderr so stdout carries only rendered results.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,dbquery=debug"
    } else {
        "warn"
    }
}

/// Initializes logging to stderr.
///
/// `RUST_LOG` wins over the `--verbose` default.
pub fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "warn");
        assert_eq!(default_filter(true), "warn,dbquery=debug");
        assert!(default_filter(true).parse::<EnvFilter>().is_ok());
    }
}
