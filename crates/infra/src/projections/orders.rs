use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use brewforce_core::AggregateId;
use brewforce_events::EventEnvelope;
use brewforce_orders::{AGGREGATE_TYPE, Order, OrderEvent, OrderId, OrderLine, OrderStatus};

use crate::read_model::ReadModelStore;

/// Queryable order, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub owner: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total_price: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    /// View of a rehydrated order; `None` if it was never placed.
    pub fn from_order(order: &Order) -> Option<Self> {
        let created_at = order.created_at()?;
        Some(Self {
            order_id: order.id_typed(),
            owner: order.owner().to_string(),
            status: order.status(),
            lines: order.lines().to_vec(),
            total_price: order.total_price(),
            created_at,
            updated_at: order.updated_at().unwrap_or(created_at),
        })
    }
}

#[derive(Debug, Error)]
pub enum OrderProjectionError {
    #[error("failed to deserialize order event: {0}")]
    Deserialize(String),

    #[error("event order_id does not match envelope aggregate_id")]
    StreamMismatch,

    /// Events were skipped; the caller should replay the stream.
    #[error("sequence gap (last={last}, found={found})")]
    Gap { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

/// Order listing projection (by owner, by status).
#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: ReadModelStore<OrderId, OrderView>,
{
    store: S,
    cursors: Mutex<HashMap<AggregateId, u64>>,
}

impl<S> OrdersProjection<S>
where
    S: ReadModelStore<OrderId, OrderView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderView> {
        self.store.get(order_id)
    }

    /// Every order of `owner`, oldest first.
    pub fn list_by_owner(&self, owner: &str) -> Vec<OrderView> {
        self.sorted(|o| o.owner == owner)
    }

    /// Orders whose status is in `statuses`; all orders when `statuses` is empty.
    pub fn list(&self, statuses: &[OrderStatus]) -> Vec<OrderView> {
        self.sorted(|o| statuses.is_empty() || statuses.contains(&o.status))
    }

    fn sorted(&self, keep: impl Fn(&OrderView) -> bool) -> Vec<OrderView> {
        let mut orders: Vec<_> = self.store.list().into_iter().filter(|o| keep(o)).collect();
        orders.sort_by_key(|o| (o.created_at, o.order_id));
        orders
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self.cursors.lock().map_err(|_| OrderProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(OrderProjectionError::Gap { last, found: seq });
        }

        let ev: OrderEvent = envelope
            .decode()
            .map_err(|e| OrderProjectionError::Deserialize(e.to_string()))?;
        let order_id = ev.order_id();
        if order_id.0 != aggregate_id {
            return Err(OrderProjectionError::StreamMismatch);
        }

        match ev {
            OrderEvent::OrderPlaced(e) => {
                self.store.upsert(
                    order_id,
                    OrderView {
                        order_id,
                        owner: e.owner,
                        status: OrderStatus::AwaitingPayment,
                        lines: e.lines,
                        total_price: e.total_price,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::StatusChanged(e) => {
                if let Some(mut view) = self.store.get(&order_id) {
                    view.status = e.to;
                    view.updated_at = e.occurred_at;
                    self.store.upsert(order_id, view);
                }
            }
            // Never placed, so never listed.
            OrderEvent::OrderVoided(_) => {}
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Clear everything and replay `envelopes` (any order).
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), OrderProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        self.store.clear();
        self.cursors
            .lock()
            .map_err(|_| OrderProjectionError::Poisoned)?
            .clear();

        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use brewforce_catalog::CatalogItemId;
    use brewforce_core::EntityId;
    use brewforce_events::Event;
    use brewforce_orders::{OrderPlaced, OrderVoided, StatusChanged};
    use uuid::Uuid;

    use crate::read_model::InMemoryReadModelStore;

    fn envelope(seq: u64, ev: &OrderEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            ev.order_id().0,
            AGGREGATE_TYPE,
            seq,
            ev.event_type(),
            ev.occurred_at(),
            serde_json::to_value(ev).unwrap(),
        )
    }

    fn placed(owner: &str, at: DateTime<Utc>) -> OrderEvent {
        let order_id = OrderId::new(AggregateId::new());
        OrderEvent::OrderPlaced(OrderPlaced {
            order_id,
            owner: owner.to_string(),
            lines: vec![OrderLine {
                id: EntityId::new(),
                line_no: 1,
                order_id,
                catalog_item_id: CatalogItemId::new(AggregateId::new()),
                item_name: "Kopi".to_string(),
                quantity: 2,
                unit_price: 5_000,
            }],
            total_price: 10_000,
            occurred_at: at,
        })
    }

    fn changed(order_id: OrderId, from: OrderStatus, to: OrderStatus) -> OrderEvent {
        OrderEvent::StatusChanged(StatusChanged {
            order_id,
            from,
            to,
            requested_by: "dina".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn projection() -> OrdersProjection<InMemoryReadModelStore<OrderId, OrderView>> {
        OrdersProjection::new(InMemoryReadModelStore::new())
    }

    #[test]
    fn filters_by_owner_and_status_in_creation_order() {
        let p = projection();
        let t0 = Utc::now();
        let a1 = placed("alice", t0);
        let b1 = placed("bob", t0 + Duration::seconds(1));
        let a2 = placed("alice", t0 + Duration::seconds(2));
        for ev in [&a2, &b1, &a1] {
            p.apply_envelope(&envelope(1, ev)).unwrap();
        }
        let cancel = changed(a1.order_id(), OrderStatus::AwaitingPayment, OrderStatus::Cancelled);
        p.apply_envelope(&envelope(2, &cancel)).unwrap();

        let alice: Vec<_> = p.list_by_owner("alice").into_iter().map(|o| o.order_id).collect();
        assert_eq!(alice, vec![a1.order_id(), a2.order_id()]);

        assert_eq!(p.list(&[]).len(), 3);
        let cancelled = p.list(&[OrderStatus::Cancelled]);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].order_id, a1.order_id());
        assert_eq!(
            p.list(&[OrderStatus::AwaitingPayment, OrderStatus::Preparing]).len(),
            2
        );
    }

    #[test]
    fn voided_orders_are_never_listed() {
        let p = projection();
        let voided = OrderEvent::OrderVoided(OrderVoided {
            order_id: OrderId::new(AggregateId::new()),
            reason: "claim expired".to_string(),
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&envelope(1, &voided)).unwrap();

        assert!(p.list(&[]).is_empty());
        assert!(p.get(&voided.order_id()).is_none());
        assert!(matches!(
            p.apply_envelope(&envelope(3, &voided)).unwrap_err(),
            OrderProjectionError::Gap { last: 1, found: 3 }
        ));
    }

    #[test]
    fn replays_are_idempotent() {
        let p = projection();
        let ev = placed("alice", Utc::now());
        let id = ev.order_id();
        let prep = changed(id, OrderStatus::AwaitingPayment, OrderStatus::Preparing);
        let envs = vec![envelope(1, &ev), envelope(2, &prep)];

        for env in &envs {
            p.apply_envelope(env).unwrap();
            p.apply_envelope(env).unwrap();
        }
        p.rebuild_from_scratch(envs).unwrap();

        let view = p.get(&id).unwrap();
        assert_eq!(view.status, OrderStatus::Preparing);
        assert_eq!(view.total_price, 10_000);
        assert_eq!(p.list(&[]).len(), 1);
    }
}
