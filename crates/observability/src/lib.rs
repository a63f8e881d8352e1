//! Process-wide tracing setup shared by every binary and test harness.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::{init_with_filter, DEFAULT_FILTER};

/// Initialize process-wide observability from `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
