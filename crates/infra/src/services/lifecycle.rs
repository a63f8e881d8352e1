use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};

use brewforce_auth::Principal;
use brewforce_catalog::CatalogItemId;
use brewforce_core::{AggregateId, DomainError};
use brewforce_events::{EventBus, EventEnvelope};
use brewforce_orders::active_slot;
use brewforce_orders::{
    ActiveOrderSlot, CloseActiveOrder, InventoryGuard, OpenActiveOrder, Order, OrderCommand, OrderDraft,
    OrderId, OrderStatus, SlotCommand, VoidOrder,
};

use super::{PosService, ServiceError};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::projections::OrderView;

/// Parse status names (`"AWAITING_PAYMENT"`, case-insensitive) for listing filters.
pub fn parse_statuses<T: AsRef<str>>(names: &[T]) -> Result<Vec<OrderStatus>, ServiceError> {
    names
        .iter()
        .map(|n| n.as_ref().parse::<OrderStatus>().map_err(ServiceError::from))
        .collect()
}

impl<S, B> PosService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create an order for `owner` from `(item, quantity)` pairs.
    ///
    /// All or nothing: on any failure the reservations made so far are
    /// released and the owner's slot is freed before the error is returned.
    #[instrument(skip_all, fields(owner = %owner, lines = items.len(), order_id), err)]
    pub fn create_order(&self, owner: &str, items: &[(CatalogItemId, i64)]) -> Result<OrderView, ServiceError> {
        if owner.trim().is_empty() {
            return Err(ServiceError::Validation("owner cannot be empty".to_string()));
        }
        if items.is_empty() {
            return Err(ServiceError::Validation("order must contain at least one item".to_string()));
        }

        let order_id = OrderId::new(AggregateId::new());
        tracing::Span::current().record("order_id", tracing::field::display(order_id));

        self.claim_slot(owner, order_id)?;

        let mut draft = OrderDraft::new(order_id, owner);
        for (item_id, quantity) in items {
            let added = self
                .load_item(*item_id)
                .and_then(|item| draft.add_line(&item, *quantity, self).map(|_| ()));
            if let Err(err) = added {
                self.abandon(&draft, &err);
                return Err(err);
            }
        }

        let total_price = draft.total_price();
        let command = OrderCommand::PlaceOrder(draft.clone().into_command(Utc::now()));
        let placed = match self.dispatcher.dispatch(order_id.0, brewforce_orders::AGGREGATE_TYPE, &command, || {
            Order::empty(order_id)
        }) {
            Ok(placed) => placed,
            Err(err) => {
                let err = ServiceError::from(err);
                self.abandon(&draft, &err);
                return Err(err);
            }
        };
        self.project(&placed.committed);

        info!(%order_id, owner, total_price, "order created");
        order_view(&placed.aggregate)
    }

    /// Current state of one order, straight from its stream.
    pub fn get_order(&self, order_id: OrderId) -> Result<OrderView, ServiceError> {
        let order = self.load_order(order_id)?;
        order_view(&order)
    }

    /// Like [`PosService::get_order`], but customers may only read their own orders.
    pub fn get_order_for(&self, order_id: OrderId, principal: &Principal) -> Result<OrderView, ServiceError> {
        let view = self.get_order(order_id)?;
        if !principal.can_view_order_of(&view.owner) {
            return Err(ServiceError::Unauthorized(format!(
                "{} may not view order {order_id}",
                principal.username()
            )));
        }
        Ok(view)
    }

    /// Every order of `owner` (all statuses), oldest first.
    pub fn list_orders_by_owner(&self, owner: &str) -> Vec<OrderView> {
        self.orders_view.list_by_owner(owner)
    }

    /// Orders in any of `statuses`; every order when the filter is absent or empty.
    pub fn list_orders(&self, statuses: Option<&[OrderStatus]>) -> Vec<OrderView> {
        self.orders_view.list(statuses.unwrap_or(&[]))
    }

    pub(crate) fn load_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let order: Order = self.dispatcher.load(order_id.0, || Order::empty(order_id))?;
        if !order.is_placed() {
            return Err(ServiceError::NotFound {
                entity: "order",
                id: order_id.to_string(),
            });
        }
        Ok(order)
    }

    /// Free `owner`'s slot if `order_id` still holds it. Retries until the
    /// close commits; only a store failure is returned.
    pub(crate) fn close_slot(&self, owner: &str, order_id: OrderId) -> Result<(), ServiceError> {
        let close = SlotCommand::Close(CloseActiveOrder {
            owner: owner.to_string(),
            order_id,
            occurred_at: Utc::now(),
        });
        self.dispatcher.dispatch_until_committed(
            ActiveOrderSlot::id_for(owner),
            active_slot::AGGREGATE_TYPE,
            &close,
            || ActiveOrderSlot::empty(owner),
        )?;
        Ok(())
    }

    fn claim_slot(&self, owner: &str, order_id: OrderId) -> Result<(), ServiceError> {
        let open = SlotCommand::Open(OpenActiveOrder {
            owner: owner.to_string(),
            order_id,
            occurred_at: Utc::now(),
        });
        match self.dispatch_slot(owner, &open) {
            Ok(()) => Ok(()),
            Err(DispatchError::Domain(DomainError::Conflict(msg))) => {
                if self.release_stale_slot(owner)? {
                    self.dispatch_slot(owner, &open)?;
                    Ok(())
                } else {
                    Err(ServiceError::Conflict(msg))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn dispatch_slot(&self, owner: &str, command: &SlotCommand) -> Result<(), DispatchError> {
        self.dispatcher.dispatch_with_retry(
            ActiveOrderSlot::id_for(owner),
            active_slot::AGGREGATE_TYPE,
            command,
            self.config.reserve_max_attempts,
            || ActiveOrderSlot::empty(owner),
        )?;
        Ok(())
    }

    /// Close `owner`'s slot if its holder can no longer become an active order.
    ///
    /// That is the case when the held order already finished, or when it was
    /// never placed and the claim is older than `slot_claim_timeout` (the
    /// creation that made it died). The unplaced order is voided first, so a
    /// creation that is merely slow fails to place it and rolls back. A
    /// younger unplaced claim belongs to a creation in flight.
    fn release_stale_slot(&self, owner: &str) -> Result<bool, ServiceError> {
        let slot: ActiveOrderSlot = self
            .dispatcher
            .load(ActiveOrderSlot::id_for(owner), || ActiveOrderSlot::empty(owner))?;
        let Some(active) = slot.active_order() else {
            return Ok(true);
        };

        let order: Order = self.dispatcher.load(active.0, || Order::empty(active))?;
        if order.is_placed() {
            if !order.status().is_terminal() {
                return Ok(false);
            }
            warn!(owner, order_id = %active, status = %order.status(), "freeing slot held by a finished order");
            self.close_slot(owner, active)?;
            return Ok(true);
        }

        if !order.is_voided() && !self.claim_expired(slot.opened_at()) {
            return Ok(false);
        }
        match self.void_order(active) {
            Ok(()) => {}
            // Placed in the meantime: the claim was live after all.
            Err(ServiceError::Conflict(_)) => return Ok(false),
            Err(err) => return Err(err),
        }
        warn!(owner, order_id = %active, opened_at = ?slot.opened_at(), "reclaiming slot of an order that was never placed");
        self.close_slot(owner, active)?;
        Ok(true)
    }

    fn claim_expired(&self, opened_at: Option<DateTime<Utc>>) -> bool {
        let Some(opened_at) = opened_at else {
            return true;
        };
        // A claim stamped in the future (clock skew) is treated as fresh.
        (Utc::now() - opened_at)
            .to_std()
            .map(|age| age >= self.config.slot_claim_timeout)
            .unwrap_or(false)
    }

    fn void_order(&self, order_id: OrderId) -> Result<(), ServiceError> {
        let command = OrderCommand::VoidOrder(VoidOrder {
            order_id,
            reason: "active-order claim expired before the order was placed".to_string(),
            occurred_at: Utc::now(),
        });
        self.dispatcher.dispatch_with_retry(
            order_id.0,
            brewforce_orders::AGGREGATE_TYPE,
            &command,
            self.config.transition_max_attempts,
            || Order::empty(order_id),
        )?;
        Ok(())
    }

    /// Undo a failed creation: give back every reserved line, then free the slot.
    /// Both steps retry through conflicts, so only a store failure can leave
    /// anything behind.
    fn abandon(&self, draft: &OrderDraft, cause: &ServiceError) {
        let order_id = draft.order_id();
        warn!(%order_id, owner = draft.owner(), cause = %cause, lines = draft.lines().len(), "compensating failed order creation");

        for reservation in draft.reservations() {
            if let Err(err) = self.release(reservation.item_id, reservation.quantity, order_id) {
                error!(
                    %order_id,
                    item_id = %reservation.item_id,
                    quantity = reservation.quantity,
                    error = %err,
                    "failed to release reservation"
                );
            }
        }
        if let Err(err) = self.close_slot(draft.owner(), order_id) {
            warn!(%order_id, owner = draft.owner(), error = %err, "failed to free active-order slot");
        }
    }
}

pub(crate) fn order_view(order: &Order) -> Result<OrderView, ServiceError> {
    OrderView::from_order(order).ok_or_else(|| ServiceError::NotFound {
        entity: "order",
        id: order.id_typed().to_string(),
    })
}
