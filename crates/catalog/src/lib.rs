//! Catalog domain module (event-sourced).
//!
//! Sellable items with a price and a finite stock. Stock reservations and
//! releases are decided here, purely (no IO, no storage); infra persists the
//! resulting events under optimistic concurrency, which makes every
//! check-then-decrement atomic per item.

pub mod item;

pub use item::{
    CatalogCommand, CatalogEvent, CatalogItem, CatalogItemId, DeleteItem, DetailsUpdated,
    ItemDeleted, ItemListed, ListItem, ReleaseStock, ReserveStock, SetStock, StockReleased,
    StockReserved, StockSet, UpdateDetails,
};

/// Aggregate type name used for catalog item streams.
pub const AGGREGATE_TYPE: &str = "catalog.item";
