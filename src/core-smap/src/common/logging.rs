use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for the sitemap binaries when RUST_LOG is unset.
pub const DEFAULT_LOG_SETTINGS: &str = "core_smap=info,api_smap=debug,tower_http=debug";

/// Sets the logging (tracing) level using RUST_LOG, falling back to the supplied default log settings.
/// A second call is a no-op, so tests and binaries can both install it.
pub fn setup_logging(default_log_settings: &str) {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_log_settings.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
