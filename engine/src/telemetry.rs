//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. The log level comes
//! from config and can be overridden with `RUST_LOG`; output is pretty in
//! debug builds and JSON in release builds.

use std::sync::OnceLock;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Build the default filter directive for a level.
///
/// The HTTP client and the connection pool are kept at `warn` so a `debug`
/// gateway log is not drowned in per-request connection chatter.
fn default_directive(log_level: &str) -> String {
    format!(
        "{level},chorus_engine={level},chorus={level},hyper=warn,reqwest=warn,sqlx=warn",
        level = log_level
    )
}

/// Handle for swapping the filter of the installed subscriber
static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn filter_for(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)))
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// The first call installs the global subscriber; later calls replace its
/// filter, so the level read from config takes effect after startup logging
/// has already begun.
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = filter_for(log_level);

    if let Some(handle) = FILTER_HANDLE.get() {
        if let Err(e) = handle.reload(env_filter) {
            tracing::warn!("Failed to apply log level '{}': {}", log_level, e);
        }
        return;
    }

    let (filter_layer, handle) = reload::Layer::new(env_filter);

    #[cfg(debug_assertions)]
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().pretty().with_target(false).with_writer(std::io::stderr))
        .try_init();

    #[cfg(not(debug_assertions))]
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr),
        )
        .try_init();

    // Another subscriber may already own the process (e.g. a test harness).
    if installed.is_ok() {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Initialize the tracing subscriber with default settings.
///
/// Used before the config file has been read.
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_quiets_transport_crates() {
        let directive = default_directive("debug");
        assert!(directive.starts_with("debug,chorus_engine=debug"));
        assert!(directive.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(directive).is_ok());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_telemetry_with_level("warn");
        init_telemetry();
    }
}
