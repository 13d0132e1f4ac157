use flowctl_core::config::EnvSettings;
use tracing_subscriber::EnvFilter;

/// Default level after applying the `FLOWCTL_SKIPLOG` and `FLOWCTL_DEBUG` flags.
pub fn level<'a>(settings: &EnvSettings, requested: &'a str) -> &'a str {
    if settings.skiplog {
        "error"
    } else if settings.debug {
        "debug"
    } else {
        requested
    }
}

/// Initialize structured logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the provided level.
pub fn init(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
