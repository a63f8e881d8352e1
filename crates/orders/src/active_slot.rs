//! Per-owner active-order slot.
//!
//! One stream per owner, addressed by a UUIDv5 of the username. Opening the
//! slot is the versioned check-then-claim that keeps an owner to a single
//! non-terminal order, even across service instances sharing one store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brewforce_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use brewforce_events::Event;

use crate::order::OrderId;

/// Aggregate type name used for slot streams.
pub const AGGREGATE_TYPE: &str = "orders.active_slot";

const SLOT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b07_4d35_8e2f_51a0_c3d7_b9e1);

/// Aggregate root: ActiveOrderSlot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOrderSlot {
    id: AggregateId,
    owner: String,
    active_order: Option<OrderId>,
    opened_at: Option<DateTime<Utc>>,
    version: u64,
}

impl ActiveOrderSlot {
    /// Stream id of `owner`'s slot.
    pub fn id_for(owner: &str) -> AggregateId {
        AggregateId::derived(&SLOT_NAMESPACE, owner)
    }

    pub fn empty(owner: &str) -> Self {
        Self {
            id: Self::id_for(owner),
            owner: owner.to_string(),
            active_order: None,
            opened_at: None,
            version: 0,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn active_order(&self) -> Option<OrderId> {
        self.active_order
    }

    /// When the current holder claimed the slot.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }
}

impl AggregateRoot for ActiveOrderSlot {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenActiveOrder (claim the slot for a new order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenActiveOrder {
    pub owner: String,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseActiveOrder (the order ended or was never placed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseActiveOrder {
    pub owner: String,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotCommand {
    Open(OpenActiveOrder),
    Close(CloseActiveOrder),
}

/// Event: ActiveOrderOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrderOpened {
    pub owner: String,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActiveOrderClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrderClosed {
    pub owner: String,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotEvent {
    Opened(ActiveOrderOpened),
    Closed(ActiveOrderClosed),
}

impl Event for SlotEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SlotEvent::Opened(_) => "orders.active_slot.opened",
            SlotEvent::Closed(_) => "orders.active_slot.closed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SlotEvent::Opened(e) => e.occurred_at,
            SlotEvent::Closed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ActiveOrderSlot {
    type Command = SlotCommand;
    type Event = SlotEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SlotEvent::Opened(e) => {
                self.owner = e.owner.clone();
                self.active_order = Some(e.order_id);
                self.opened_at = Some(e.occurred_at);
            }
            SlotEvent::Closed(_) => {
                self.active_order = None;
                self.opened_at = None;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SlotCommand::Open(cmd) => {
                self.ensure_owner(&cmd.owner)?;
                if let Some(active) = self.active_order {
                    return Err(DomainError::conflict(format!("active order exists: {active}")));
                }
                Ok(vec![SlotEvent::Opened(ActiveOrderOpened {
                    owner: cmd.owner.clone(),
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            SlotCommand::Close(cmd) => {
                self.ensure_owner(&cmd.owner)?;
                // Closing for an order that no longer holds the slot is a no-op.
                if self.active_order != Some(cmd.order_id) {
                    return Ok(vec![]);
                }
                Ok(vec![SlotEvent::Closed(ActiveOrderClosed {
                    owner: cmd.owner.clone(),
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl ActiveOrderSlot {
    fn ensure_owner(&self, owner: &str) -> Result<(), DomainError> {
        if Self::id_for(owner) != self.id {
            return Err(DomainError::invariant("slot belongs to another owner"));
        }
        Ok(())
    }
}
