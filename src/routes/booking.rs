use actix_web::{web, HttpResponse};
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::models::booking::BookingRequest;
use crate::models::catalog_item::ItemType;
use crate::services::booking_service::{BookingError, BookingService};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversalBookingInput {
    pub item_id: String,
    #[serde(default)]
    pub item_type: Option<ItemType>,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    pub city: String,
    pub members: u32,
    /// Client-computed total. Logged when it disagrees with the resolved
    /// amount, never used for the charge.
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub booking_type: Option<ItemType>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentInput {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(rename = "bookingId")]
    pub booking_id: String,
}

pub async fn book(
    service: web::Data<BookingService>,
    input: web::Json<UniversalBookingInput>,
) -> Result<HttpResponse, BookingError> {
    let input = input.into_inner();

    let item_type = input
        .item_type
        .or(input.booking_type)
        .ok_or_else(|| BookingError::Validation("itemType or bookingType is required".into()))?;
    let item_id = ObjectId::parse_str(&input.item_id)
        .map_err(|_| BookingError::Validation("itemId is not a valid id".into()))?;

    let request = BookingRequest::new(
        item_id,
        item_type,
        &input.user_name,
        &input.user_email,
        &input.user_phone,
        &input.city,
        input.members,
    )
    .map_err(BookingError::Validation)?
    .with_idempotency_key(input.idempotency_key)
    .with_amount_hint(input.total_amount);

    let created = service.create_order(request).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": {
            "bookingId": created.booking_id.to_hex(),
            "razorpayOrderId": created.gateway_order_id,
            "amount": created.total_amount,
        }
    })))
}

pub async fn verify_payment(
    service: web::Data<BookingService>,
    input: web::Json<VerifyPaymentInput>,
) -> Result<HttpResponse, BookingError> {
    let input = input.into_inner();

    let booking_id = ObjectId::parse_str(&input.booking_id)
        .map_err(|_| BookingError::Validation("bookingId is not a valid id".into()))?;

    service
        .verify(
            &booking_id,
            &input.razorpay_order_id,
            &input.razorpay_payment_id,
            &input.razorpay_signature,
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
