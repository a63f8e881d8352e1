//! Tracing/logging initialization.
//!
//! JSON lines on stdout, filtered with an `EnvFilter`. Spans opened by the
//! order engine (`create_order`, `transition_status`, ...) carry the owner and
//! order id, so they show up on every log line emitted inside them.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor configuration supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Initialize tracing from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

/// Initialize tracing with an explicit directive string (e.g. `brewforce_infra=debug`).
///
/// `RUST_LOG` still wins when set, so operators can override a configured level.
/// Malformed directives fall back to [`DEFAULT_FILTER`].
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

fn install(filter: EnvFilter) {
    // A global subscriber may already be set (tests, embedding apps).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
