use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brewforce_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use brewforce_events::Event;

/// Catalog item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogItemId(pub AggregateId);

impl CatalogItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CatalogItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: CatalogItem.
///
/// Invariant: `stock >= 0` after every applied event. A deleted item is kept
/// (orders keep referencing it) but can no longer be reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    id: CatalogItemId,
    name: String,
    description: String,
    /// Price in smallest currency unit.
    unit_price: u64,
    stock: i64,
    deleted: bool,
    listed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl CatalogItem {
    /// Create an empty, not-yet-listed aggregate instance for rehydration.
    pub fn empty(id: CatalogItemId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            unit_price: 0,
            stock: 0,
            deleted: false,
            listed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CatalogItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_listed(&self) -> bool {
        self.created
    }

    pub fn listed_at(&self) -> Option<DateTime<Utc>> {
        self.listed_at
    }
}

impl AggregateRoot for CatalogItem {
    type Id = CatalogItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ListItem (put a new item up for sale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub item_id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub unit_price: u64,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails (name, description, price).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub item_id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStock (restock or correct to an absolute count).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStock {
    pub item_id: CatalogItemId,
    pub stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (decrement on behalf of an order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub item_id: CatalogItemId,
    pub order_id: AggregateId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (give back a previously reserved quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub item_id: CatalogItemId,
    pub order_id: AggregateId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteItem (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItem {
    pub item_id: CatalogItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogCommand {
    ListItem(ListItem),
    UpdateDetails(UpdateDetails),
    SetStock(SetStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    DeleteItem(DeleteItem),
}

/// Event: ItemListed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListed {
    pub item_id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub unit_price: u64,
    pub stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub item_id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSet {
    pub item_id: CatalogItemId,
    pub stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub item_id: CatalogItemId,
    pub order_id: AggregateId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub item_id: CatalogItemId,
    pub order_id: AggregateId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeleted {
    pub item_id: CatalogItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogEvent {
    ItemListed(ItemListed),
    DetailsUpdated(DetailsUpdated),
    StockSet(StockSet),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    ItemDeleted(ItemDeleted),
}

impl CatalogEvent {
    pub fn item_id(&self) -> CatalogItemId {
        match self {
            CatalogEvent::ItemListed(e) => e.item_id,
            CatalogEvent::DetailsUpdated(e) => e.item_id,
            CatalogEvent::StockSet(e) => e.item_id,
            CatalogEvent::StockReserved(e) => e.item_id,
            CatalogEvent::StockReleased(e) => e.item_id,
            CatalogEvent::ItemDeleted(e) => e.item_id,
        }
    }
}

impl Event for CatalogEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::ItemListed(_) => "catalog.item.listed",
            CatalogEvent::DetailsUpdated(_) => "catalog.item.details_updated",
            CatalogEvent::StockSet(_) => "catalog.item.stock_set",
            CatalogEvent::StockReserved(_) => "catalog.item.stock_reserved",
            CatalogEvent::StockReleased(_) => "catalog.item.stock_released",
            CatalogEvent::ItemDeleted(_) => "catalog.item.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CatalogEvent::ItemListed(e) => e.occurred_at,
            CatalogEvent::DetailsUpdated(e) => e.occurred_at,
            CatalogEvent::StockSet(e) => e.occurred_at,
            CatalogEvent::StockReserved(e) => e.occurred_at,
            CatalogEvent::StockReleased(e) => e.occurred_at,
            CatalogEvent::ItemDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CatalogItem {
    type Command = CatalogCommand;
    type Event = CatalogEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CatalogEvent::ItemListed(e) => {
                self.id = e.item_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.unit_price = e.unit_price;
                self.stock = e.stock;
                self.deleted = false;
                self.listed_at = Some(e.occurred_at);
                self.created = true;
            }
            CatalogEvent::DetailsUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.unit_price = e.unit_price;
            }
            CatalogEvent::StockSet(e) => {
                self.stock = e.stock;
            }
            CatalogEvent::StockReserved(e) => {
                self.stock -= e.quantity;
            }
            CatalogEvent::StockReleased(e) => {
                self.stock += e.quantity;
            }
            CatalogEvent::ItemDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CatalogCommand::ListItem(cmd) => self.handle_list(cmd),
            CatalogCommand::UpdateDetails(cmd) => self.handle_update_details(cmd),
            CatalogCommand::SetStock(cmd) => self.handle_set_stock(cmd),
            CatalogCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            CatalogCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            CatalogCommand::DeleteItem(cmd) => self.handle_delete(cmd),
        }
    }
}

fn validate_details(name: &str, unit_price: u64) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if unit_price == 0 {
        return Err(DomainError::validation("unit_price must be positive"));
    }
    Ok(())
}

impl CatalogItem {
    fn ensure_listed(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("catalog item", self.id));
        }
        Ok(())
    }

    fn ensure_item_id(&self, item_id: CatalogItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), DomainError> {
        if self.deleted {
            return Err(DomainError::ItemDeleted { item_id: self.id.0 });
        }
        Ok(())
    }

    fn handle_list(&self, cmd: &ListItem) -> Result<Vec<CatalogEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("catalog item already exists"));
        }
        validate_details(&cmd.name, cmd.unit_price)?;
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }

        Ok(vec![CatalogEvent::ItemListed(ItemListed {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            unit_price: cmd.unit_price,
            stock: cmd.initial_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateDetails) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_item_id(cmd.item_id)?;
        self.ensure_not_deleted()?;
        validate_details(&cmd.name, cmd.unit_price)?;

        Ok(vec![CatalogEvent::DetailsUpdated(DetailsUpdated {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_stock(&self, cmd: &SetStock) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_item_id(cmd.item_id)?;
        self.ensure_not_deleted()?;

        if cmd.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }

        Ok(vec![CatalogEvent::StockSet(StockSet {
            item_id: cmd.item_id,
            stock: cmd.stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_item_id(cmd.item_id)?;
        self.ensure_not_deleted()?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("non-positive quantity"));
        }

        if self.stock < cmd.quantity {
            return Err(DomainError::InsufficientStock {
                item_id: self.id.0,
                available: self.stock,
                requested: cmd.quantity,
            });
        }

        Ok(vec![CatalogEvent::StockReserved(StockReserved {
            item_id: cmd.item_id,
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Releases are accepted on deleted items: they only give back stock that
    /// an order took earlier.
    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("non-positive quantity"));
        }

        let restored = self.stock.checked_add(cmd.quantity);
        if restored.is_none() {
            return Err(DomainError::invariant("stock overflow on release"));
        }

        Ok(vec![CatalogEvent::StockReleased(StockReleased {
            item_id: cmd.item_id,
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteItem) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_item_id(cmd.item_id)?;

        if self.deleted {
            return Ok(vec![]);
        }

        Ok(vec![CatalogEvent::ItemDeleted(ItemDeleted {
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
