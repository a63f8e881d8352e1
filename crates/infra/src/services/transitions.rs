use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};

use brewforce_events::{EventBus, EventEnvelope};
use brewforce_orders::{ChangeStatus, InventoryGuard, Order, OrderCommand, OrderId, OrderStatus};

use super::lifecycle::order_view;
use super::{PosService, ServiceError};
use crate::event_store::EventStore;
use crate::projections::OrderView;

impl<S, B> PosService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Move an order to `new_status`, recording `requester` on the change.
    ///
    /// Cancelling gives the order's stock back; reaching a terminal status
    /// frees the owner's active-order slot. Both happen only after the
    /// status change committed, so concurrent callers cannot repeat them.
    #[instrument(skip_all, fields(order_id = %order_id, to = %new_status, requester = %requester), err)]
    pub fn transition_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        requester: &str,
    ) -> Result<OrderView, ServiceError> {
        let command = OrderCommand::ChangeStatus(ChangeStatus {
            order_id,
            to: new_status,
            requested_by: requester.to_string(),
            occurred_at: Utc::now(),
        });
        let dispatched = self.dispatcher.dispatch_with_retry(
            order_id.0,
            brewforce_orders::AGGREGATE_TYPE,
            &command,
            self.config.transition_max_attempts,
            || Order::empty(order_id),
        )?;
        self.project(&dispatched.committed);
        let order = dispatched.aggregate;

        if new_status == OrderStatus::Cancelled {
            self.restore_stock(&order)?;
        }
        if new_status.is_terminal() {
            if let Err(err) = self.close_slot(order.owner(), order_id) {
                // Store failure; the next create_order of this owner frees it.
                warn!(%order_id, owner = order.owner(), error = %err, "failed to free active-order slot");
            }
        }

        info!(%order_id, status = %new_status, requester, "order status changed");
        order_view(&order)
    }

    /// Customer-side cancel: owner only, and only while awaiting payment.
    #[instrument(skip_all, fields(order_id = %order_id, requester = %requester), err)]
    pub fn cancel_order(&self, order_id: OrderId, requester: &str) -> Result<OrderView, ServiceError> {
        let order = self.load_order(order_id)?;
        if order.owner() != requester {
            return Err(ServiceError::Unauthorized(format!(
                "only the owner may cancel order {order_id}"
            )));
        }
        if order.status() != OrderStatus::AwaitingPayment {
            return Err(ServiceError::InvalidTransition {
                from: order.status(),
                to: OrderStatus::Cancelled,
            });
        }
        self.transition_status(order_id, OrderStatus::Cancelled, requester)
    }

    /// Release every line of a cancelled order. Releases retry through
    /// conflicts, so a line fails only when the store does; each line is still
    /// attempted and failures are reported after the rest ran.
    // TODO: record per-order holds on CatalogItem so releases become idempotent
    // and a restock interrupted by a crash can be replayed at startup.
    fn restore_stock(&self, order: &Order) -> Result<(), ServiceError> {
        let order_id = order.id_typed();
        let mut failed = 0usize;
        for line in order.lines() {
            if let Err(err) = self.release(line.catalog_item_id, line.quantity, order_id) {
                error!(
                    %order_id,
                    item_id = %line.catalog_item_id,
                    quantity = line.quantity,
                    error = %err,
                    "failed to restore stock of cancelled order"
                );
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(ServiceError::Internal(format!(
                "order {order_id} cancelled but {failed} line(s) could not be restocked"
            )));
        }
        Ok(())
    }
}
