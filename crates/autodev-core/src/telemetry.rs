//! Tracing initialisation for autodev binaries.
//!
//! Call [`init_tracing`] once at program start. Respects `AUTODEV_LOG` (or
//! `RUST_LOG`) for fine-grained filtering. Safe to call more than once;
//! the global subscriber can only be set once per process and later calls
//! are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines instead of the human
///   format.
/// * `level`: default verbosity when no filter env var is set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = std::env::var("AUTODEV_LOG")
        .ok()
        .and_then(|directive| directive.parse::<EnvFilter>().ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
