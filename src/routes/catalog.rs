use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::models::catalog_item::ItemType;
use crate::services::booking_service::BookingError;
use crate::services::catalog_service::BookableItemLookup;

async fn list_items(
    catalog: &dyn BookableItemLookup,
    item_type: ItemType,
) -> Result<HttpResponse, BookingError> {
    let items = catalog.list_active(item_type).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": items,
    })))
}

pub async fn get_treks(
    catalog: web::Data<Arc<dyn BookableItemLookup>>,
) -> Result<HttpResponse, BookingError> {
    list_items(catalog.get_ref().as_ref(), ItemType::Trek).await
}

pub async fn get_tours(
    catalog: web::Data<Arc<dyn BookableItemLookup>>,
) -> Result<HttpResponse, BookingError> {
    list_items(catalog.get_ref().as_ref(), ItemType::Tour).await
}
