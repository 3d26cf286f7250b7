use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::models::catalog_item::ItemType;
use crate::services::pricing_service::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    #[serde(rename = "PENDING_PAYMENT")]
    PendingPayment,
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Failed => "FAILED",
        }
    }

    /// `CONFIRMED` and `FAILED` are terminal; nothing transitions out of them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::PendingPayment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Online,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Cash => "cash",
        }
    }
}

/// Persistent booking record. `total_amount` is frozen at creation time and is
/// never recomputed from the catalog afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub item_id: ObjectId,
    pub item_type: ItemType,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub members: u32,
    pub unit_price: i64,
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

impl Booking {
    /// Online booking awaiting a gateway callback.
    pub fn pending_online(request: &BookingRequest, quote: &Quote, idempotency_key: String) -> Self {
        Self::new(
            request,
            quote,
            PaymentMethod::Online,
            BookingStatus::PendingPayment,
            Some(idempotency_key),
        )
    }

    /// Offline booking; cash already received, so it starts out confirmed.
    pub fn confirmed_cash(request: &BookingRequest, quote: &Quote) -> Self {
        Self::new(
            request,
            quote,
            PaymentMethod::Cash,
            BookingStatus::Confirmed,
            None,
        )
    }

    fn new(
        request: &BookingRequest,
        quote: &Quote,
        payment_method: PaymentMethod,
        status: BookingStatus,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = DateTime::now();
        Booking {
            id: None,
            item_id: request.item_id,
            item_type: request.item_type,
            customer_name: request.customer_name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            city: request.city.clone(),
            members: request.members,
            unit_price: quote.unit_price,
            total_amount: quote.total_amount,
            payment_method,
            status,
            gateway_order_id: None,
            gateway_payment_id: None,
            idempotency_key,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Request-scoped booking intent. Built only through [`BookingRequest::new`],
/// which rejects structurally invalid input before anything touches the store;
/// the city and amount are still re-validated against the authoritative catalog
/// item by the booking service.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub item_id: ObjectId,
    pub item_type: ItemType,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub members: u32,
    pub idempotency_key: Option<String>,
    /// Client-computed total, kept only for anomaly logging. Never trusted.
    pub client_amount_hint: Option<i64>,
}

impl BookingRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        item_id: ObjectId,
        item_type: ItemType,
        customer_name: &str,
        email: &str,
        phone: &str,
        city: &str,
        members: u32,
    ) -> Result<Self, String> {
        let customer_name = customer_name.trim();
        let email = email.trim();
        let phone = phone.trim();
        let city = city.trim();

        if customer_name.is_empty() {
            return Err("Customer name is required".into());
        }
        if email.is_empty() || !email.contains('@') {
            return Err("A valid email address is required".into());
        }
        if phone.is_empty() {
            return Err("A phone number is required".into());
        }
        if city.is_empty() {
            return Err("A departure city is required".into());
        }
        if members < 1 {
            return Err("At least one member is required".into());
        }

        Ok(BookingRequest {
            item_id,
            item_type,
            customer_name: customer_name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            city: city.to_string(),
            members,
            idempotency_key: None,
            client_amount_hint: None,
        })
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_amount_hint(mut self, hint: Option<i64>) -> Self {
        self.client_amount_hint = hint;
        self
    }
}
