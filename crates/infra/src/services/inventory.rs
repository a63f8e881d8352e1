use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::debug;

use brewforce_catalog::{AGGREGATE_TYPE, CatalogCommand, CatalogItem, CatalogItemId, ReleaseStock, ReserveStock};
use brewforce_events::{EventBus, EventEnvelope};
use brewforce_orders::{InventoryGuard, OrderId};

use super::{PosService, ServiceError};
use crate::event_store::EventStore;

/// Stock mutations are catalog commands; the per-item stream version makes
/// each check-then-decrement atomic, and conflicts are re-decided against the
/// fresh stock.
///
/// Reservations give up after `reserve_max_attempts` conflicts. Releases
/// undo a reservation that already committed, so they retry until they land.
impl<S, B> InventoryGuard for PosService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    type Error = ServiceError;

    fn reserve(&self, item_id: CatalogItemId, quantity: i64, order_id: OrderId) -> Result<(), ServiceError> {
        let command = CatalogCommand::ReserveStock(ReserveStock {
            item_id,
            order_id: order_id.0,
            quantity,
            occurred_at: Utc::now(),
        });
        self.stock_command(item_id, &command)?;
        debug!(%item_id, %order_id, quantity, "stock reserved");
        Ok(())
    }

    fn release(&self, item_id: CatalogItemId, quantity: i64, order_id: OrderId) -> Result<(), ServiceError> {
        let command = CatalogCommand::ReleaseStock(ReleaseStock {
            item_id,
            order_id: order_id.0,
            quantity,
            occurred_at: Utc::now(),
        });
        let dispatched = self.dispatcher.dispatch_until_committed(item_id.0, AGGREGATE_TYPE, &command, || {
            CatalogItem::empty(item_id)
        })?;
        self.project(&dispatched.committed);
        debug!(%item_id, %order_id, quantity, "stock released");
        Ok(())
    }
}

impl<S, B> PosService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a catalog command with the reservation retry budget and
    /// project what it committed.
    pub(crate) fn stock_command(
        &self,
        item_id: CatalogItemId,
        command: &CatalogCommand,
    ) -> Result<CatalogItem, ServiceError> {
        let dispatched = self.dispatcher.dispatch_with_retry(
            item_id.0,
            AGGREGATE_TYPE,
            command,
            self.config.reserve_max_attempts,
            || CatalogItem::empty(item_id),
        )?;
        self.project(&dispatched.committed);
        Ok(dispatched.aggregate)
    }
}
