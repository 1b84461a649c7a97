//! Logger configuration for the wallet bridge.
//!
//! - [`try_init`] and [`init_for_testing`] set up a stdout logger for
//!   desktop builds, tools, and tests.
//! - [`host::init_host`] sets up a logger which ships formatted log lines to
//!   the mobile host, since stdout gets swallowed on mobile.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

/// Forward formatted log lines to the mobile host.
pub mod host;

/// Use this to initialize the global logger in tests.
pub fn init_for_testing() {
    // Quickly skip logger setup if no env var set.
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }

    // Don't panic if there's already a logger setup. Multiple tests might try
    // setting the global logger.
    let _ = try_init();
}

/// Try to initialize a global `tracing` logger which prints enabled events and
/// spans to stdout. Will return an `Err` if there is another global logger
/// already set.
///
/// The default log level includes INFO, WARN, and ERROR events. Change the
/// level or module filtering with a `RUST_LOG` env var. Read more about the
/// syntax here:
/// <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/targets/struct.Targets.html>
pub fn try_init() -> Result<(), TryInitError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let rust_log_filter = targets_or_info(rust_log.as_deref());

    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_target(true)
        .with_ansi(true)
        .with_filter(rust_log_filter);

    tracing_subscriber::registry().with(stdout_log).try_init()
}

/// Parse a `RUST_LOG`-style targets filter. Defaults to INFO logs if there is
/// no filter or we can't parse it.
pub(crate) fn targets_or_info(rust_log: Option<&str>) -> Targets {
    rust_log
        .and_then(|rust_log| Targets::from_str(rust_log).ok())
        .unwrap_or_else(|| Targets::new().with_default(Level::INFO))
}

#[cfg(test)]
mod test {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn targets_default_to_info() {
        let targets = targets_or_info(None);
        assert_eq!(targets.default_level(), Some(LevelFilter::INFO));

        // Garbage falls back to the default too
        let targets = targets_or_info(Some("wallet_bridge=notalevel"));
        assert_eq!(targets.default_level(), Some(LevelFilter::INFO));
    }

    #[test]
    fn targets_parse_rust_log() {
        let targets = targets_or_info(Some("warn,wallet_bridge=debug"));
        assert_eq!(targets.default_level(), Some(LevelFilter::WARN));
        assert!(targets.would_enable("wallet_bridge::repository", &Level::DEBUG));
        assert!(!targets.would_enable("tokio", &Level::INFO));
    }
}
