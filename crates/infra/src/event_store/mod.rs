//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. Implementations: [`InMemoryEventStore`]
//! for tests and single-process use, [`PostgresEventStore`] for a durable store
//! shared by several service instances.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
