use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use brewforce_catalog::{AGGREGATE_TYPE, CatalogEvent, CatalogItem, CatalogItemId};
use brewforce_core::AggregateId;
use brewforce_events::EventEnvelope;

use crate::read_model::ReadModelStore;

/// Queryable catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemView {
    pub item_id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub unit_price: u64,
    pub stock: i64,
    pub deleted: bool,
    pub listed_at: DateTime<Utc>,
}

impl CatalogItemView {
    /// View of a rehydrated item; `None` if it was never listed.
    pub fn from_item(item: &CatalogItem) -> Option<Self> {
        Some(Self {
            item_id: item.id_typed(),
            name: item.name().to_string(),
            description: item.description().to_string(),
            unit_price: item.unit_price(),
            stock: item.stock(),
            deleted: item.is_deleted(),
            listed_at: item.listed_at()?,
        })
    }
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize catalog event: {0}")]
    Deserialize(String),

    #[error("event item_id does not match envelope aggregate_id")]
    StreamMismatch,

    /// Events were skipped; the caller should replay the stream.
    #[error("sequence gap (last={last}, found={found})")]
    Gap { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

/// Catalog listing projection.
///
/// Idempotent per stream: envelopes at or below the stream cursor are skipped,
/// so at-least-once delivery and replays are safe.
#[derive(Debug)]
pub struct CatalogItemsProjection<S>
where
    S: ReadModelStore<CatalogItemId, CatalogItemView>,
{
    store: S,
    cursors: Mutex<HashMap<AggregateId, u64>>,
}

impl<S> CatalogItemsProjection<S>
where
    S: ReadModelStore<CatalogItemId, CatalogItemView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, item_id: &CatalogItemId) -> Option<CatalogItemView> {
        self.store.get(item_id)
    }

    /// Items in listing order; soft-deleted ones only when asked.
    pub fn list(&self, include_deleted: bool) -> Vec<CatalogItemView> {
        let mut items: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|i| include_deleted || !i.deleted)
            .collect();
        items.sort_by_key(|i| (i.listed_at, i.item_id));
        items
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Held for the whole apply: envelopes of one stream land in order.
        let mut cursors = self.cursors.lock().map_err(|_| CatalogProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(CatalogProjectionError::Gap { last, found: seq });
        }

        let ev: CatalogEvent = envelope
            .decode()
            .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;
        let item_id = ev.item_id();
        if item_id.0 != aggregate_id {
            return Err(CatalogProjectionError::StreamMismatch);
        }

        if let CatalogEvent::ItemListed(e) = &ev {
            self.store.upsert(
                item_id,
                CatalogItemView {
                    item_id,
                    name: e.name.clone(),
                    description: e.description.clone(),
                    unit_price: e.unit_price,
                    stock: e.stock,
                    deleted: false,
                    listed_at: e.occurred_at,
                },
            );
        } else if let Some(mut view) = self.store.get(&item_id) {
            match ev {
                CatalogEvent::ItemListed(_) => {}
                CatalogEvent::DetailsUpdated(e) => {
                    view.name = e.name;
                    view.description = e.description;
                    view.unit_price = e.unit_price;
                }
                CatalogEvent::StockSet(e) => view.stock = e.stock,
                CatalogEvent::StockReserved(e) => view.stock -= e.quantity,
                CatalogEvent::StockReleased(e) => view.stock += e.quantity,
                CatalogEvent::ItemDeleted(_) => view.deleted = true,
            }
            self.store.upsert(item_id, view);
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Clear everything and replay `envelopes` (any order).
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CatalogProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        self.store.clear();
        self.cursors
            .lock()
            .map_err(|_| CatalogProjectionError::Poisoned)?
            .clear();

        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
