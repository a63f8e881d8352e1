//! Wiring helpers for embedding applications.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use tracing::info;

use brewforce_events::{EventEnvelope, InMemoryEventBus};

use crate::config::EngineConfig;
use crate::event_store::{InMemoryEventStore, PostgresEventStore};
use crate::services::PosService;

pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type InMemoryPosService = PosService<InMemoryEventStore, SharedBus>;
pub type PostgresPosService = PosService<PostgresEventStore, SharedBus>;

/// Install the JSON tracing subscriber with the configured filter.
pub fn init_observability(config: &EngineConfig) {
    brewforce_observability::init_with_filter(&config.log_filter);
}

/// Service over a process-local store; state is lost on exit.
pub fn in_memory(config: EngineConfig) -> InMemoryPosService {
    PosService::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()), config)
}

/// Service over the Postgres event store at `config.database_url`.
///
/// Creates the schema if needed and replays existing events into the
/// listing projections. Must not be called from inside an async runtime.
pub fn postgres(config: EngineConfig) -> anyhow::Result<PostgresPosService> {
    let url = config
        .database_url
        .clone()
        .context("DATABASE_URL is required for the Postgres event store")?;

    let store = PostgresEventStore::connect_blocking(&url, config.db_max_connections)
        .context("failed to connect to the event store database")?;
    store
        .ensure_schema_blocking()
        .context("failed to create the event store schema")?;

    let service = PosService::new(store, Arc::new(InMemoryEventBus::new()), config);
    service
        .rebuild_read_models()
        .context("failed to replay stored events into read models")?;
    info!("postgres-backed service ready");
    Ok(service)
}
