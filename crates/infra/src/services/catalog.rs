use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use brewforce_catalog::{
    CatalogCommand, CatalogItem, CatalogItemId, DeleteItem, ListItem, SetStock, UpdateDetails,
};
use brewforce_core::AggregateId;
use brewforce_events::{EventBus, EventEnvelope};

use super::{PosService, ServiceError};
use crate::event_store::EventStore;
use crate::projections::CatalogItemView;

impl<S, B> PosService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Put a new item up for sale.
    #[instrument(skip_all, fields(name = %name, item_id), err)]
    pub fn list_item(
        &self,
        name: &str,
        description: &str,
        unit_price: u64,
        initial_stock: i64,
    ) -> Result<CatalogItemView, ServiceError> {
        let item_id = CatalogItemId::new(AggregateId::new());
        tracing::Span::current().record("item_id", tracing::field::display(item_id));

        let item = self.stock_command(
            item_id,
            &CatalogCommand::ListItem(ListItem {
                item_id,
                name: name.to_string(),
                description: description.to_string(),
                unit_price,
                initial_stock,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%item_id, unit_price, stock = initial_stock, "catalog item listed");
        view_of(&item)
    }

    /// Rename or reprice an item. Existing order lines keep their captured price.
    #[instrument(skip_all, fields(item_id = %item_id), err)]
    pub fn update_item_details(
        &self,
        item_id: CatalogItemId,
        name: &str,
        description: &str,
        unit_price: u64,
    ) -> Result<CatalogItemView, ServiceError> {
        let item = self.stock_command(
            item_id,
            &CatalogCommand::UpdateDetails(UpdateDetails {
                item_id,
                name: name.to_string(),
                description: description.to_string(),
                unit_price,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%item_id, unit_price, "catalog item updated");
        view_of(&item)
    }

    /// Restock or correct an item to an absolute count.
    #[instrument(skip_all, fields(item_id = %item_id), err)]
    pub fn set_item_stock(&self, item_id: CatalogItemId, stock: i64) -> Result<CatalogItemView, ServiceError> {
        let item = self.stock_command(
            item_id,
            &CatalogCommand::SetStock(SetStock {
                item_id,
                stock,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%item_id, stock, "catalog stock set");
        view_of(&item)
    }

    /// Soft delete; deleting twice is a no-op.
    #[instrument(skip_all, fields(item_id = %item_id), err)]
    pub fn delete_item(&self, item_id: CatalogItemId) -> Result<CatalogItemView, ServiceError> {
        let item = self.stock_command(
            item_id,
            &CatalogCommand::DeleteItem(DeleteItem {
                item_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%item_id, "catalog item deleted");
        view_of(&item)
    }

    /// Current state of one item, straight from its stream. Deleted items are
    /// still returned (flagged).
    pub fn get_item(&self, item_id: CatalogItemId) -> Result<CatalogItemView, ServiceError> {
        let item = self.load_item(item_id)?;
        view_of(&item)
    }

    pub fn list_items(&self, include_deleted: bool) -> Vec<CatalogItemView> {
        self.catalog_view.list(include_deleted)
    }

    pub(crate) fn load_item(&self, item_id: CatalogItemId) -> Result<CatalogItem, ServiceError> {
        let item: CatalogItem = self.dispatcher.load(item_id.0, || CatalogItem::empty(item_id))?;
        if !item.is_listed() {
            return Err(ServiceError::NotFound {
                entity: "catalog item",
                id: item_id.to_string(),
            });
        }
        Ok(item)
    }
}

fn view_of(item: &CatalogItem) -> Result<CatalogItemView, ServiceError> {
    CatalogItemView::from_item(item).ok_or_else(|| ServiceError::NotFound {
        entity: "catalog item",
        id: item.id_typed().to_string(),
    })
}
