//! Building an order line by line against live catalog stock.

use chrono::{DateTime, Utc};

use brewforce_catalog::{CatalogItem, CatalogItemId};
use brewforce_core::{DomainError, EntityId};

use crate::order::{OrderId, OrderLine, PlaceOrder};

/// The stock-mutation primitive an order draft reserves through.
///
/// Implementations must make `reserve` an atomic check-and-decrement per item
/// and `release` an unconditional increment.
pub trait InventoryGuard {
    type Error: From<DomainError>;

    fn reserve(
        &self,
        item_id: CatalogItemId,
        quantity: i64,
        order_id: OrderId,
    ) -> Result<(), Self::Error>;

    fn release(
        &self,
        item_id: CatalogItemId,
        quantity: i64,
        order_id: OrderId,
    ) -> Result<(), Self::Error>;
}

/// Stock taken for one line, as needed to give it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub item_id: CatalogItemId,
    pub quantity: i64,
}

/// An order under construction.
///
/// Every line in a draft has its stock reserved already; dropping a draft
/// without placing it requires releasing [`OrderDraft::reservations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    order_id: OrderId,
    owner: String,
    lines: Vec<OrderLine>,
    total_price: u64,
}

impl OrderDraft {
    pub fn new(order_id: OrderId, owner: impl Into<String>) -> Self {
        Self {
            order_id,
            owner: owner.into(),
            lines: Vec::new(),
            total_price: 0,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_price(&self) -> u64 {
        self.total_price
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.lines
            .iter()
            .map(|l| Reservation {
                item_id: l.catalog_item_id,
                quantity: l.quantity,
            })
            .collect()
    }

    /// Reserve `quantity` of `item` and append a line at the item's current price.
    ///
    /// All checks and the reservation happen before the draft changes, so a
    /// failed call leaves the draft exactly as it was.
    pub fn add_line<G: InventoryGuard>(
        &mut self,
        item: &CatalogItem,
        quantity: i64,
        guard: &G,
    ) -> Result<&OrderLine, G::Error> {
        if quantity <= 0 {
            return Err(DomainError::validation("non-positive quantity").into());
        }
        if !item.is_listed() {
            return Err(DomainError::not_found("catalog item", item.id_typed()).into());
        }
        if item.is_deleted() {
            return Err(DomainError::ItemDeleted {
                item_id: item.id_typed().0,
            }
            .into());
        }

        let unit_price = item.unit_price();
        let total_price = u64::try_from(quantity)
            .ok()
            .and_then(|q| q.checked_mul(unit_price))
            .and_then(|subtotal| self.total_price.checked_add(subtotal))
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        guard.reserve(item.id_typed(), quantity, self.order_id)?;

        self.lines.push(OrderLine {
            id: EntityId::new(),
            line_no: self.lines.len() as u32 + 1,
            order_id: self.order_id,
            catalog_item_id: item.id_typed(),
            item_name: item.name().to_string(),
            quantity,
            unit_price,
        });
        self.total_price = total_price;

        let idx = self.lines.len() - 1;
        Ok(&self.lines[idx])
    }

    pub fn into_command(self, occurred_at: DateTime<Utc>) -> PlaceOrder {
        PlaceOrder {
            order_id: self.order_id,
            owner: self.owner,
            lines: self.lines,
            occurred_at,
        }
    }
}
