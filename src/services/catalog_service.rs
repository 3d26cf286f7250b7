use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Client;
use thiserror::Error;

use crate::models::catalog_item::{BookableItem, ItemType};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Item not found")]
    NotFound,
    #[error("This item is not open for booking")]
    Inactive,
    #[error("Catalog lookup failed")]
    Unavailable,
}

/// Read-only view of the catalog. The booking core never mutates items; price
/// tables are owned by the catalog/admin subsystem.
#[async_trait]
pub trait BookableItemLookup: Send + Sync {
    /// Fetch an item by id, rejecting inactive items.
    async fn find_active(
        &self,
        item_type: ItemType,
        id: &ObjectId,
    ) -> Result<BookableItem, CatalogError>;

    async fn list_active(&self, item_type: ItemType) -> Result<Vec<BookableItem>, CatalogError>;
}

pub struct MongoCatalog {
    client: Arc<Client>,
}

impl MongoCatalog {
    pub fn new(client: Arc<Client>) -> Self {
        MongoCatalog { client }
    }

    fn collection(&self, item_type: ItemType) -> mongodb::Collection<BookableItem> {
        self.client
            .database("Catalog")
            .collection(item_type.collection())
    }
}

#[async_trait]
impl BookableItemLookup for MongoCatalog {
    async fn find_active(
        &self,
        item_type: ItemType,
        id: &ObjectId,
    ) -> Result<BookableItem, CatalogError> {
        let item = self
            .collection(item_type)
            .find_one(doc! { "_id": id })
            .await
            .map_err(|err| {
                log::error!("Catalog lookup failed for {} {}: {}", item_type.as_str(), id, err);
                CatalogError::Unavailable
            })?
            .ok_or(CatalogError::NotFound)?;

        if !item.is_active {
            return Err(CatalogError::Inactive);
        }
        Ok(item)
    }

    async fn list_active(&self, item_type: ItemType) -> Result<Vec<BookableItem>, CatalogError> {
        let cursor = self
            .collection(item_type)
            .find(doc! { "isActive": true })
            .await
            .map_err(|err| {
                log::error!("Catalog listing failed for {}: {}", item_type.as_str(), err);
                CatalogError::Unavailable
            })?;

        cursor.try_collect().await.map_err(|err| {
            log::error!("Catalog cursor failed for {}: {}", item_type.as_str(), err);
            CatalogError::Unavailable
        })
    }
}

/// In-memory catalog, used by tests and local runs without a database.
pub struct InMemoryCatalog {
    items: Vec<(ItemType, BookableItem)>,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<(ItemType, BookableItem)>) -> Self {
        InMemoryCatalog { items }
    }
}

#[async_trait]
impl BookableItemLookup for InMemoryCatalog {
    async fn find_active(
        &self,
        item_type: ItemType,
        id: &ObjectId,
    ) -> Result<BookableItem, CatalogError> {
        let item = self
            .items
            .iter()
            .find(|(kind, item)| *kind == item_type && item.id.as_ref() == Some(id))
            .map(|(_, item)| item.clone())
            .ok_or(CatalogError::NotFound)?;

        if !item.is_active {
            return Err(CatalogError::Inactive);
        }
        Ok(item)
    }

    async fn list_active(&self, item_type: ItemType) -> Result<Vec<BookableItem>, CatalogError> {
        Ok(self
            .items
            .iter()
            .filter(|(kind, item)| *kind == item_type && item.is_active)
            .map(|(_, item)| item.clone())
            .collect())
    }
}
