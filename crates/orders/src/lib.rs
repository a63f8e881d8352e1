//! Orders domain module (event-sourced).
//!
//! This crate contains the order lifecycle rules: the status transition table,
//! the `Order` aggregate, the draft that turns catalog items into reserved
//! order lines, and the per-owner active-order slot. Everything here is
//! deterministic domain logic (no IO, no storage).

pub mod active_slot;
pub mod draft;
pub mod order;
pub mod status;

pub use active_slot::{
    ActiveOrderClosed, ActiveOrderOpened, ActiveOrderSlot, CloseActiveOrder, OpenActiveOrder,
    SlotCommand, SlotEvent,
};
pub use draft::{InventoryGuard, OrderDraft, Reservation};
pub use order::{
    ChangeStatus, Order, OrderCommand, OrderEvent, OrderId, OrderLine, OrderPlaced, OrderVoided,
    PlaceOrder, StatusChanged, VoidOrder,
};
pub use status::OrderStatus;

/// Aggregate type name used for order streams.
pub const AGGREGATE_TYPE: &str = "orders.order";
