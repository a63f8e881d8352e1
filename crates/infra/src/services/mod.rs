//! `PosService`: the in-process contract of the order engine.
//!
//! Every write goes through the [`CommandDispatcher`] (event store first,
//! bus second) and is then fed synchronously into the listing projections.
//! Single-entity reads (`get_order`, `get_item`) rehydrate from the store, so
//! they never lag behind a commit; listings read the projections.

mod catalog;
mod inventory;
mod lifecycle;
mod transitions;

pub use lifecycle::parse_statuses;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use brewforce_catalog::CatalogItemId;
use brewforce_core::{AggregateId, DomainError};
use brewforce_events::{EventBus, EventEnvelope, Subscription};
use brewforce_orders::OrderStatus;

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::EngineConfig;
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{CatalogItemView, CatalogItemsProjection, CatalogProjectionError, OrderProjectionError, OrderView, OrdersProjection};
use crate::read_model::InMemoryReadModelStore;

pub type CatalogView = CatalogItemsProjection<InMemoryReadModelStore<CatalogItemId, CatalogItemView>>;
pub type OrdersView = OrdersProjection<InMemoryReadModelStore<brewforce_orders::OrderId, OrderView>>;

/// Errors returned by [`PosService`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Business conflict, or optimistic retries exhausted.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: CatalogItemId,
        available: i64,
        requested: i64,
    },

    #[error("item {item_id} is deleted")]
    DeletedItem { item_id: CatalogItemId },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Persistence or infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::InsufficientStock {
                item_id,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                item_id: CatalogItemId::new(item_id),
                available,
                requested,
            },
            DomainError::ItemDeleted { item_id } => ServiceError::DeletedItem {
                item_id: CatalogItemId::new(item_id),
            },
            DomainError::InvalidTransition { from, to } => match (from.parse(), to.parse()) {
                (Ok(from), Ok(to)) => ServiceError::InvalidTransition { from, to },
                _ => ServiceError::Internal(format!("unknown statuses in transition {from} -> {to}")),
            },
            DomainError::Unauthorized(msg) => ServiceError::Unauthorized(msg),
            DomainError::InvariantViolation(msg) => ServiceError::Internal(format!("invariant violated: {msg}")),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => err.into(),
            DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// Order lifecycle and inventory engine.
///
/// `Send + Sync` whenever the store and bus are; share it behind an `Arc`
/// across request threads.
#[derive(Debug)]
pub struct PosService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    catalog_view: CatalogView,
    orders_view: OrdersView,
    config: EngineConfig,
}

impl<S, B> PosService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            catalog_view: CatalogItemsProjection::new(InMemoryReadModelStore::new()),
            orders_view: OrdersProjection::new(InMemoryReadModelStore::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Every event committed from now on (kitchen displays, receipts).
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    /// Clear both listing projections and replay every stored event.
    pub fn rebuild_read_models(&self) -> Result<(), ServiceError> {
        let items = self
            .dispatcher
            .store()
            .load_by_type(brewforce_catalog::AGGREGATE_TYPE)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.catalog_view
            .rebuild_from_scratch(items.iter().map(StoredEvent::to_envelope))
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let orders = self
            .dispatcher
            .store()
            .load_by_type(brewforce_orders::AGGREGATE_TYPE)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.orders_view
            .rebuild_from_scratch(orders.iter().map(StoredEvent::to_envelope))
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        tracing::info!(items = items.len(), orders = orders.len(), "read models rebuilt");
        Ok(())
    }

    /// Feed freshly committed events into the projections.
    ///
    /// Commits are already durable here, so projection trouble is logged and
    /// never turned into a command failure. A gap means a concurrent commit of
    /// the same stream has not been projected yet; replaying the stream from
    /// the store closes it (duplicates are skipped by the cursors).
    pub(crate) fn project(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let envelope = stored.to_envelope();
            match stored.aggregate_type.as_str() {
                brewforce_catalog::AGGREGATE_TYPE => match self.catalog_view.apply_envelope(&envelope) {
                    Ok(()) => {}
                    Err(CatalogProjectionError::Gap { .. }) => self.catch_up(stored.aggregate_id, |env| {
                        self.catalog_view.apply_envelope(env).map_err(|e| e.to_string())
                    }),
                    Err(err) => warn!(aggregate_id = %stored.aggregate_id, error = %err, "catalog projection failed"),
                },
                brewforce_orders::AGGREGATE_TYPE => match self.orders_view.apply_envelope(&envelope) {
                    Ok(()) => {}
                    Err(OrderProjectionError::Gap { .. }) => self.catch_up(stored.aggregate_id, |env| {
                        self.orders_view.apply_envelope(env).map_err(|e| e.to_string())
                    }),
                    Err(err) => warn!(aggregate_id = %stored.aggregate_id, error = %err, "orders projection failed"),
                },
                _ => {}
            }
        }
    }

    fn catch_up(&self, aggregate_id: AggregateId, apply: impl Fn(&EventEnvelope<JsonValue>) -> Result<(), String>) {
        let stream = match self.dispatcher.store().load_stream(aggregate_id) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%aggregate_id, error = %err, "failed to load stream for projection catch-up");
                return;
            }
        };
        for stored in &stream {
            if let Err(err) = apply(&stored.to_envelope()) {
                warn!(%aggregate_id, sequence_number = stored.sequence_number, error = %err, "projection catch-up failed");
                return;
            }
        }
    }
}
