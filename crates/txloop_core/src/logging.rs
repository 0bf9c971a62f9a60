//! Process-wide log subscriber setup.
//!
//! Library code only emits `tracing` events. Binaries and test harnesses
//! install one subscriber for the whole process at startup instead of
//! deriving loggers per thread or per task.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `verbose` selects
/// `debug` or `info`. Returns `false` if a global subscriber was already
/// installed.
pub fn init_logging(verbose: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .try_init()
        .is_ok()
}

/// Runs `f` with a subscriber that is removed when `f` returns.
pub fn with_logging<R>(directives: &str, f: impl FnOnce() -> R) -> R {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}
