use actix_web::{web, HttpResponse};
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::middleware::admin_auth::AdminPrincipal;
use crate::models::booking::{BookingRequest, PaymentMethod};
use crate::models::catalog_item::ItemType;
use crate::services::booking_service::{BookingError, BookingService};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineBookingInput {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub city: String,
    pub members_count: u32,
    #[serde(default)]
    pub trek_id: Option<String>,
    #[serde(default)]
    pub tour_id: Option<String>,
    #[serde(default)]
    pub booking_type: Option<ItemType>,
}

impl OfflineBookingInput {
    fn item_ref(&self) -> Result<(ItemType, ObjectId), BookingError> {
        let (item_type, raw_id) = match (&self.trek_id, &self.tour_id, self.booking_type) {
            (Some(id), None, _) => (ItemType::Trek, id),
            (None, Some(id), _) => (ItemType::Tour, id),
            (Some(trek), Some(_), Some(ItemType::Trek)) => (ItemType::Trek, trek),
            (Some(_), Some(tour), Some(ItemType::Tour)) => (ItemType::Tour, tour),
            _ => {
                return Err(BookingError::Validation(
                    "Exactly one of trekId or tourId is required".into(),
                ))
            }
        };
        let id = ObjectId::parse_str(raw_id)
            .map_err(|_| BookingError::Validation("Item id is not a valid id".into()))?;
        Ok((item_type, id))
    }
}

pub async fn create_offline_booking(
    service: web::Data<BookingService>,
    admin: AdminPrincipal,
    input: web::Json<OfflineBookingInput>,
) -> Result<HttpResponse, BookingError> {
    let input = input.into_inner();
    let (item_type, item_id) = input.item_ref()?;

    let request = BookingRequest::new(
        item_id,
        item_type,
        &input.name,
        &input.email,
        &input.phone_number,
        &input.city,
        input.members_count,
    )
    .map_err(BookingError::Validation)?;

    let booking = service.create_offline_booking(request, &admin).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": {
            "customerName": booking.customer_name,
            "amount": booking.total_amount,
        }
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

pub async fn list_bookings(
    service: web::Data<BookingService>,
    _admin: AdminPrincipal,
    query: web::Query<BookingListQuery>,
) -> Result<HttpResponse, BookingError> {
    let bookings = service.list_bookings(query.payment_method).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": bookings,
    })))
}
