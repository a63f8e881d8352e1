//! Projection implementations (read model builders).
//!
//! Projections consume committed event envelopes and build query-optimized
//! read models. All projections are:
//! - **Rebuildable**: can be reconstructed from the event store
//! - **Idempotent**: envelopes at or below a stream's cursor are skipped
//! - **Ordered per stream**: a sequence gap is reported, never papered over

pub mod catalog;
pub mod orders;

pub use catalog::{CatalogItemView, CatalogItemsProjection, CatalogProjectionError};
pub use orders::{OrderProjectionError, OrderView, OrdersProjection};
