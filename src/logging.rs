//! Logging initialization helpers

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with an env-filter and compact formatting
///
/// Respects `RUST_LOG`; defaults to `info`. Safe to call more than once
/// (subsequent calls are no-ops), which keeps it usable from tests.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
