use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brewforce_catalog::CatalogItemId;
use brewforce_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity, EntityId};
use brewforce_events::Event;

use crate::status::OrderStatus;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order line: catalog item, quantity and the unit price captured when the
/// line was built. Lines never change after the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: EntityId,
    pub line_no: u32,
    pub order_id: OrderId,
    pub catalog_item_id: CatalogItemId,
    pub item_name: String,
    pub quantity: i64,
    /// Price in smallest currency unit, captured at line creation.
    pub unit_price: u64,
}

impl OrderLine {
    /// `quantity * unit_price`, or `None` on overflow / non-positive quantity.
    pub fn subtotal(&self) -> Option<u64> {
        u64::try_from(self.quantity)
            .ok()
            .filter(|q| *q > 0)?
            .checked_mul(self.unit_price)
    }
}

impl Entity for OrderLine {
    type Id = EntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Sum of line subtotals with overflow detection.
pub(crate) fn total_of(lines: &[OrderLine]) -> Result<u64, DomainError> {
    lines.iter().try_fold(0u64, |acc, line| {
        line.subtotal()
            .and_then(|s| acc.checked_add(s))
            .ok_or_else(|| DomainError::validation("order total overflows"))
    })
}

/// Aggregate root: Order.
///
/// Invariant: `total_price == sum(line.quantity * line.unit_price)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    owner: String,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total_price: u64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    voided: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            owner: String::new(),
            status: OrderStatus::AwaitingPayment,
            lines: Vec::new(),
            total_price: 0,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            voided: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_price(&self) -> u64 {
        self.total_price
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    /// The creation that claimed this id was given up before placing it.
    pub fn is_voided(&self) -> bool {
        self.voided
    }

    /// Recomputes the total from the lines (checks the total invariant).
    pub fn computed_total(&self) -> Option<u64> {
        total_of(&self.lines).ok()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder. Stock for every line has already been reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub owner: String,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: OrderId,
    pub to: OrderStatus,
    pub requested_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidOrder. Fences an order id that was never placed so a late
/// `PlaceOrder` for it can no longer commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ChangeStatus(ChangeStatus),
    VoidOrder(VoidOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub owner: String,
    pub lines: Vec<OrderLine>,
    pub total_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub requested_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderVoided {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    StatusChanged(StatusChanged),
    OrderVoided(OrderVoided),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => e.order_id,
            OrderEvent::StatusChanged(e) => e.order_id,
            OrderEvent::OrderVoided(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
            OrderEvent::OrderVoided(_) => "orders.order.voided",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::OrderVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.owner = e.owner.clone();
                self.status = OrderStatus::AwaitingPayment;
                self.lines = e.lines.clone();
                self.total_price = e.total_price;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                self.updated_at = Some(e.occurred_at);
            }
            OrderEvent::OrderVoided(e) => {
                self.id = e.order_id;
                self.voided = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            OrderCommand::VoidOrder(cmd) => self.handle_void(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if self.voided {
            return Err(DomainError::conflict("order was voided before it was placed"));
        }
        self.ensure_order_id(cmd.order_id)?;

        if cmd.owner.trim().is_empty() {
            return Err(DomainError::validation("owner cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation("non-positive quantity"));
            }
            if line.order_id != cmd.order_id {
                return Err(DomainError::invariant("line belongs to another order"));
            }
            if line.line_no as usize != idx + 1 {
                return Err(DomainError::invariant("line numbers must be contiguous from 1"));
            }
        }
        let total_price = total_of(&cmd.lines)?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            owner: cmd.owner.clone(),
            lines: cmd.lines.clone(),
            total_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("order", cmd.order_id));
        }
        self.ensure_order_id(cmd.order_id)?;
        self.status.ensure_transition(cmd.to)?;

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.to,
            requested_by: cmd.requested_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        if self.created {
            return Err(DomainError::conflict("order already placed"));
        }
        if self.voided {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::OrderVoided(OrderVoided {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
