//! Logging initialization for Pramaan services.
//!
//! Security events are emitted under the `pramaan::security` target, so an
//! operator can route them separately with e.g.
//! `RUST_LOG=info,pramaan::security=warn`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize human-readable logging. Level comes from `RUST_LOG`, default `info`.
///
/// # Example
/// ```no_run
/// use pramaan_core::logging;
///
/// logging::init();
/// tracing::info!("node started");
/// ```
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

/// Initialize JSON logging for log aggregation.
///
/// # Example
/// ```no_run
/// use pramaan_core::logging;
///
/// logging::init_json();
/// tracing::info!(service = "pramaan-node", "node started");
/// ```
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init();
}

/// Pick the format from configuration.
pub fn init_with(json: bool) {
    if json {
        init_json()
    } else {
        init()
    }
}
