use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::middleware::admin_auth::AdminPrincipal;
use crate::models::booking::{Booking, BookingRequest, BookingStatus, PaymentMethod};
use crate::services::booking_store::{BookingStore, StoreError};
use crate::services::catalog_service::{BookableItemLookup, CatalogError};
use crate::services::notification_service::NotificationSink;
use crate::services::payment::interface::{GatewayError, PaymentGatewayAdapter};
use crate::services::pricing_service::{PricingError, PricingService};

/// Width of the window within which identical retried requests collapse onto
/// one derived idempotency key.
const IDEMPOTENCY_WINDOW_SECS: i64 = 600;

/// A pending booking older than this that never got a gateway order belongs
/// to an attempt that died mid-flight and may be retired; anything younger is
/// a live concurrent attempt.
const STALE_PENDING_MS: i64 = 60_000;

/// How long a losing concurrent submission waits for the winner's gateway
/// order id before giving up with a retryable error.
const ORDER_WAIT_ATTEMPTS: u32 = 20;
const ORDER_WAIT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("Item not found")]
    ItemNotFound,
    #[error("This item is not open for booking")]
    ItemInactive,
    #[error("Catalog lookup failed, please try again")]
    CatalogUnavailable,
    #[error("Could not reach the payment gateway, please try again")]
    GatewayUnavailable,
    #[error("Booking not found")]
    BookingNotFound,
    // Deliberately generic: integrity failures never explain themselves.
    #[error("Payment could not be confirmed, please contact support")]
    PaymentNotConfirmed,
    #[error("This booking is already being processed, please try again")]
    AlreadyInProgress,
    #[error("Booking service unavailable, please try again")]
    StoreUnavailable,
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => BookingError::ItemNotFound,
            CatalogError::Inactive => BookingError::ItemInactive,
            CatalogError::Unavailable => BookingError::CatalogUnavailable,
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey => BookingError::AlreadyInProgress,
            StoreError::Unavailable => BookingError::StoreUnavailable,
        }
    }
}

impl From<GatewayError> for BookingError {
    fn from(_: GatewayError) -> Self {
        BookingError::GatewayUnavailable
    }
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_)
            | BookingError::Pricing(_)
            | BookingError::ItemInactive
            | BookingError::PaymentNotConfirmed => StatusCode::BAD_REQUEST,
            BookingError::ItemNotFound | BookingError::BookingNotFound => StatusCode::NOT_FOUND,
            BookingError::AlreadyInProgress => StatusCode::CONFLICT,
            BookingError::GatewayUnavailable => StatusCode::BAD_GATEWAY,
            BookingError::CatalogUnavailable | BookingError::StoreUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "message": self.to_string(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct OrderCreated {
    pub booking_id: ObjectId,
    pub gateway_order_id: String,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Confirmed,
    /// Duplicate callback for a booking that already reached `CONFIRMED`;
    /// reported as success without touching the record.
    AlreadyConfirmed,
}

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn BookableItemLookup>,
    gateway: Arc<dyn PaymentGatewayAdapter>,
    notifier: Arc<dyn NotificationSink>,
    currency: String,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn BookableItemLookup>,
        gateway: Arc<dyn PaymentGatewayAdapter>,
        notifier: Arc<dyn NotificationSink>,
        currency: impl Into<String>,
    ) -> Self {
        BookingService {
            store,
            catalog,
            gateway,
            notifier,
            currency: currency.into(),
        }
    }

    /// Online path: resolve the authoritative price, persist a pending
    /// booking, and register the charge intent with the gateway.
    ///
    /// A retried request carrying the same idempotency key (explicit or
    /// derived) gets the existing pending order back instead of a second
    /// charge intent. A booking is never left pointing at a gateway order
    /// that does not exist: if order creation fails, the booking is moved to
    /// `FAILED` before the retryable error is returned.
    pub async fn create_order(&self, request: BookingRequest) -> Result<OrderCreated, BookingError> {
        let item = self
            .catalog
            .find_active(request.item_type, &request.item_id)
            .await?;
        let quote = PricingService::resolve(&item, &request.city, request.members)?;

        if let Some(hint) = request.client_amount_hint {
            if hint != quote.total_amount {
                log::warn!(
                    "Client amount hint {} disagrees with resolved total {} for item {}",
                    hint,
                    quote.total_amount,
                    request.item_id
                );
            }
        }

        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| derive_idempotency_key(&request));

        if let Some(existing) = self.store.find_pending_by_idempotency_key(&key).await? {
            let existing_id = existing.id.ok_or(BookingError::StoreUnavailable)?;
            match existing.gateway_order_id {
                Some(order_id) => {
                    log::info!("Reusing pending order {} for retried request", order_id);
                    return Ok(OrderCreated {
                        booking_id: existing_id,
                        gateway_order_id: order_id,
                        total_amount: existing.total_amount,
                    });
                }
                None if is_stale(&existing) => {
                    // The attempt that inserted this died between insert and
                    // the gateway call; retire it and start fresh.
                    self.store
                        .transition(
                            &existing_id,
                            BookingStatus::PendingPayment,
                            BookingStatus::Failed,
                            None,
                        )
                        .await?;
                }
                None => {
                    // A live concurrent attempt holds the key and has not
                    // heard back from the gateway yet.
                    return self.await_existing_order(&key).await;
                }
            }
        }

        let booking = Booking::pending_online(&request, &quote, key.clone());
        let booking_id = match self.store.insert(booking).await {
            Ok(id) => id,
            Err(StoreError::DuplicateKey) => {
                // Lost the insert race against a concurrent submission of
                // the same request; return its order instead of creating a
                // second charge intent.
                return self.await_existing_order(&key).await;
            }
            Err(err) => return Err(err.into()),
        };
        let receipt = format!("bk_{}", booking_id.to_hex());

        match self
            .gateway
            .create_order(quote.total_amount, &self.currency, &receipt)
            .await
        {
            Ok(order_id) => {
                self.store.set_gateway_order(&booking_id, &order_id).await?;
                Ok(OrderCreated {
                    booking_id,
                    gateway_order_id: order_id,
                    total_amount: quote.total_amount,
                })
            }
            Err(err) => {
                log::error!("Gateway order creation failed for {}: {}", booking_id, err);
                let _ = self
                    .store
                    .transition(
                        &booking_id,
                        BookingStatus::PendingPayment,
                        BookingStatus::Failed,
                        None,
                    )
                    .await;
                Err(BookingError::GatewayUnavailable)
            }
        }
    }

    /// Callback reconciliation. Safe to invoke any number of times for the
    /// same event: terminal bookings are reported as-is, and the guarded
    /// transition ensures concurrent callbacks apply exactly one change.
    pub async fn verify(
        &self,
        booking_id: &ObjectId,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<VerifyOutcome, BookingError> {
        let booking = self
            .store
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        match booking.status {
            BookingStatus::Confirmed => return Ok(VerifyOutcome::AlreadyConfirmed),
            BookingStatus::Failed => return Err(BookingError::PaymentNotConfirmed),
            BookingStatus::PendingPayment => {}
        }

        if booking.gateway_order_id.as_deref() != Some(order_id) {
            log::warn!(
                "Order id mismatch on booking {}: callback carried a different order",
                booking_id
            );
            return self.fail_pending(booking_id).await;
        }

        if !self.gateway.verify_signature(order_id, payment_id, signature) {
            log::warn!("Signature verification failed for booking {}", booking_id);
            return self.fail_pending(booking_id).await;
        }

        match self
            .store
            .transition(
                booking_id,
                BookingStatus::PendingPayment,
                BookingStatus::Confirmed,
                Some(payment_id),
            )
            .await?
        {
            Some(confirmed) => {
                self.notify_confirmed(confirmed);
                Ok(VerifyOutcome::Confirmed)
            }
            None => {
                // Lost a race against a duplicate callback; the terminal
                // state it applied is the outcome.
                let booking = self
                    .store
                    .find_by_id(booking_id)
                    .await?
                    .ok_or(BookingError::BookingNotFound)?;
                match booking.status {
                    BookingStatus::Confirmed => Ok(VerifyOutcome::AlreadyConfirmed),
                    _ => Err(BookingError::PaymentNotConfirmed),
                }
            }
        }
    }

    /// Offline path: same validation and pricing as the online path, but cash
    /// is already in hand so the booking starts out `CONFIRMED` and the
    /// gateway is never involved.
    pub async fn create_offline_booking(
        &self,
        request: BookingRequest,
        admin: &AdminPrincipal,
    ) -> Result<Booking, BookingError> {
        let item = self
            .catalog
            .find_active(request.item_type, &request.item_id)
            .await?;
        let quote = PricingService::resolve(&item, &request.city, request.members)?;

        let mut booking = Booking::confirmed_cash(&request, &quote);
        let booking_id = self.store.insert(booking.clone()).await?;
        booking.id = Some(booking_id);

        log::info!(
            "Offline booking {} recorded by {} for {} ({})",
            booking_id,
            admin.label,
            booking.customer_name,
            booking.total_amount
        );
        self.notify_confirmed(booking.clone());
        Ok(booking)
    }

    pub async fn list_bookings(
        &self,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self.store.list(payment_method).await?)
    }

    /// Wait for the concurrent attempt that holds `key` to finish its gateway
    /// call, then hand back its order. If that attempt fails its gateway call
    /// the pending booking disappears (it moves to `FAILED`) and the caller
    /// gets a retryable conflict instead of a second charge intent.
    async fn await_existing_order(&self, key: &str) -> Result<OrderCreated, BookingError> {
        for _ in 0..ORDER_WAIT_ATTEMPTS {
            match self.store.find_pending_by_idempotency_key(key).await? {
                Some(existing) => {
                    if let (Some(id), Some(order_id)) = (existing.id, existing.gateway_order_id) {
                        log::info!("Reusing pending order {} for concurrent request", order_id);
                        return Ok(OrderCreated {
                            booking_id: id,
                            gateway_order_id: order_id,
                            total_amount: existing.total_amount,
                        });
                    }
                }
                None => break,
            }
            tokio::time::sleep(ORDER_WAIT_INTERVAL).await;
        }
        Err(BookingError::AlreadyInProgress)
    }

    fn notify_confirmed(&self, booking: Booking) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier.booking_confirmed(&booking).await;
        });
    }

    async fn fail_pending(&self, booking_id: &ObjectId) -> Result<VerifyOutcome, BookingError> {
        let _ = self
            .store
            .transition(
                booking_id,
                BookingStatus::PendingPayment,
                BookingStatus::Failed,
                None,
            )
            .await;
        Err(BookingError::PaymentNotConfirmed)
    }
}

/// A pending booking with no gateway order id whose creator is no longer
/// running. Age is the only signal available: a live attempt gets its order
/// id within seconds, so anything past the threshold is an orphan.
fn is_stale(booking: &Booking) -> bool {
    match booking.created_at {
        Some(created) => {
            mongodb::bson::DateTime::now().timestamp_millis() - created.timestamp_millis()
                > STALE_PENDING_MS
        }
        None => true,
    }
}

/// Deterministic fallback key for clients that do not send one: identical
/// intent within a ten-minute window maps to the same key, so a double-submit
/// from a slow network cannot create two charge intents.
fn derive_idempotency_key(request: &BookingRequest) -> String {
    let window = Utc::now().timestamp() / IDEMPOTENCY_WINDOW_SECS;
    let mut hasher = Sha256::new();
    hasher.update(request.item_id.to_hex().as_bytes());
    hasher.update(b"|");
    hasher.update(request.city.to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(request.members.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(request.email.to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(window.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::catalog_item::{BookableItem, CityPricing, ItemType};
    use crate::services::booking_store::InMemoryBookingStore;
    use crate::services::catalog_service::InMemoryCatalog;
    use crate::services::notification_service::LogNotifier;
    use crate::services::pricing_service::Quote;

    struct MockGateway {
        orders_created: AtomicUsize,
        fail_orders: AtomicBool,
        accept_signature: AtomicBool,
    }

    impl MockGateway {
        fn new() -> Self {
            MockGateway {
                orders_created: AtomicUsize::new(0),
                fail_orders: AtomicBool::new(false),
                accept_signature: AtomicBool::new(true),
            }
        }

        fn order_count(&self) -> usize {
            self.orders_created.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGatewayAdapter for MockGateway {
        async fn create_order(
            &self,
            _amount_minor: i64,
            _currency: &str,
            _receipt: &str,
        ) -> Result<String, GatewayError> {
            if self.fail_orders.load(Ordering::SeqCst) {
                return Err(GatewayError::Unavailable);
            }
            let n = self.orders_created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("order_{}", n))
        }

        fn verify_signature(&self, _order_id: &str, _payment_id: &str, signature: &str) -> bool {
            self.accept_signature.load(Ordering::SeqCst) && signature == "valid"
        }
    }

    struct Harness {
        service: BookingService,
        store: Arc<InMemoryBookingStore>,
        gateway: Arc<MockGateway>,
        item_id: ObjectId,
        inactive_id: ObjectId,
    }

    fn harness() -> Harness {
        let item_id = ObjectId::new();
        let inactive_id = ObjectId::new();
        let item = BookableItem {
            id: Some(item_id),
            name: "Everest Base Camp".to_string(),
            city_pricing: vec![CityPricing {
                city: "Pune".to_string(),
                price: 25000,
                discount_price: Some(22000),
            }],
            is_active: true,
            max_group_size: 12,
            created_at: None,
        };
        let inactive = BookableItem {
            id: Some(inactive_id),
            is_active: false,
            ..item.clone()
        };

        let store = Arc::new(InMemoryBookingStore::new());
        let gateway = Arc::new(MockGateway::new());
        let catalog = Arc::new(InMemoryCatalog::new(vec![
            (ItemType::Trek, item),
            (ItemType::Trek, inactive),
        ]));
        let service = BookingService::new(
            store.clone(),
            catalog,
            gateway.clone(),
            Arc::new(LogNotifier),
            "INR",
        );
        Harness {
            service,
            store,
            gateway,
            item_id,
            inactive_id,
        }
    }

    fn pune_request_for(item_id: ObjectId) -> BookingRequest {
        BookingRequest::new(
            item_id,
            ItemType::Trek,
            "Asha Rao",
            "asha@example.com",
            "9876543210",
            "Pune",
            2,
        )
        .unwrap()
    }

    fn pune_request(h: &Harness) -> BookingRequest {
        pune_request_for(h.item_id)
    }

    /// Store wrapper that makes the idempotency-key lookup slow, widening the
    /// window in which two concurrent submissions both see "no pending
    /// booking" before racing to insert.
    struct SlowKeyLookupStore {
        inner: Arc<InMemoryBookingStore>,
        delay: Duration,
    }

    #[async_trait]
    impl BookingStore for SlowKeyLookupStore {
        async fn insert(&self, booking: Booking) -> Result<ObjectId, StoreError> {
            self.inner.insert(booking).await
        }

        async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Booking>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_pending_by_idempotency_key(
            &self,
            key: &str,
        ) -> Result<Option<Booking>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.find_pending_by_idempotency_key(key).await
        }

        async fn set_gateway_order(&self, id: &ObjectId, order_id: &str) -> Result<(), StoreError> {
            self.inner.set_gateway_order(id, order_id).await
        }

        async fn transition(
            &self,
            id: &ObjectId,
            from: BookingStatus,
            to: BookingStatus,
            payment_id: Option<&str>,
        ) -> Result<Option<Booking>, StoreError> {
            self.inner.transition(id, from, to, payment_id).await
        }

        async fn list(
            &self,
            payment_method: Option<PaymentMethod>,
        ) -> Result<Vec<Booking>, StoreError> {
            self.inner.list(payment_method).await
        }
    }

    #[tokio::test]
    async fn create_order_resolves_price_server_side() {
        let h = harness();
        let request = pune_request(&h).with_amount_hint(Some(1));
        let created = h.service.create_order(request).await.unwrap();

        assert_eq!(created.total_amount, 44000);
        assert_eq!(created.gateway_order_id, "order_1");
        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::PendingPayment);
        assert_eq!(booking.unit_price, 22000);
        assert_eq!(booking.payment_method, PaymentMethod::Online);
    }

    #[tokio::test]
    async fn unlisted_city_is_rejected_before_persisting() {
        let h = harness();
        let mut request = pune_request(&h);
        request.city = "Mumbai".to_string();

        let err = h.service.create_order(request).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::Pricing(PricingError::CityNotBookable)
        ));
        assert!(h.store.is_empty());
        assert_eq!(h.gateway.order_count(), 0);
    }

    #[tokio::test]
    async fn inactive_item_is_rejected() {
        let h = harness();
        let mut request = pune_request(&h);
        request.item_id = h.inactive_id;
        let err = h.service.create_order(request).await.unwrap_err();
        assert!(matches!(err, BookingError::ItemInactive));

        let mut request = pune_request(&h);
        request.item_id = ObjectId::new();
        let err = h.service.create_order(request).await.unwrap_err();
        assert!(matches!(err, BookingError::ItemNotFound));
    }

    #[tokio::test]
    async fn same_idempotency_key_returns_same_order() {
        let h = harness();
        let first = pune_request(&h).with_idempotency_key(Some("retry-1".into()));
        let second = pune_request(&h).with_idempotency_key(Some("retry-1".into()));

        let a = h.service.create_order(first).await.unwrap();
        let b = h.service.create_order(second).await.unwrap();

        assert_eq!(a.booking_id, b.booking_id);
        assert_eq!(a.gateway_order_id, b.gateway_order_id);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.gateway.order_count(), 1);
    }

    #[tokio::test]
    async fn derived_key_collapses_identical_double_submit() {
        let h = harness();
        let a = h.service.create_order(pune_request(&h)).await.unwrap();
        let b = h.service.create_order(pune_request(&h)).await.unwrap();
        assert_eq!(a.booking_id, b.booking_id);
        assert_eq!(h.gateway.order_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_pending_key_insert_is_rejected() {
        let h = harness();
        let request = pune_request(&h);
        let quote = Quote {
            unit_price: 22000,
            total_amount: 44000,
        };

        h.store
            .insert(Booking::pending_online(&request, &quote, "dup".into()))
            .await
            .unwrap();
        let err = h
            .store
            .insert(Booking::pending_online(&request, &quote, "dup".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey));
        assert_eq!(h.store.len(), 1);

        // Keyless confirmed bookings are outside the uniqueness rule.
        h.store
            .insert(Booking::confirmed_cash(&request, &quote))
            .await
            .unwrap();
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_double_submit_creates_one_gateway_order() {
        let item_id = ObjectId::new();
        let item = BookableItem {
            id: Some(item_id),
            name: "Everest Base Camp".to_string(),
            city_pricing: vec![CityPricing {
                city: "Pune".to_string(),
                price: 25000,
                discount_price: Some(22000),
            }],
            is_active: true,
            max_group_size: 12,
            created_at: None,
        };

        let inner = Arc::new(InMemoryBookingStore::new());
        let gateway = Arc::new(MockGateway::new());
        let service = Arc::new(BookingService::new(
            Arc::new(SlowKeyLookupStore {
                inner: inner.clone(),
                delay: Duration::from_millis(30),
            }),
            Arc::new(InMemoryCatalog::new(vec![(ItemType::Trek, item)])),
            gateway.clone(),
            Arc::new(LogNotifier),
            "INR",
        ));

        let spawn_submit = |service: Arc<BookingService>| {
            tokio::spawn(async move {
                service
                    .create_order(
                        pune_request_for(item_id).with_idempotency_key(Some("same-key".into())),
                    )
                    .await
            })
        };
        let a = spawn_submit(service.clone());
        let b = spawn_submit(service.clone());

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.booking_id, b.booking_id);
        assert_eq!(a.gateway_order_id, b.gateway_order_id);
        assert_eq!(gateway.order_count(), 1);
        assert_eq!(inner.len(), 1);
    }

    #[tokio::test]
    async fn stale_orphaned_attempt_is_retired_and_replaced() {
        let h = harness();
        let quote = Quote {
            unit_price: 22000,
            total_amount: 44000,
        };
        let mut orphan = Booking::pending_online(&pune_request(&h), &quote, "k2".into());
        orphan.created_at = Some(mongodb::bson::DateTime::from_millis(
            mongodb::bson::DateTime::now().timestamp_millis() - 2 * STALE_PENDING_MS,
        ));
        h.store.insert(orphan).await.unwrap();

        let created = h
            .service
            .create_order(pune_request(&h).with_idempotency_key(Some("k2".into())))
            .await
            .unwrap();
        assert_eq!(created.gateway_order_id, "order_1");

        let bookings = h.store.list(None).await.unwrap();
        assert_eq!(bookings.len(), 2);
        assert!(bookings
            .iter()
            .any(|b| b.status == BookingStatus::Failed && b.gateway_order_id.is_none()));
    }

    #[tokio::test]
    async fn fresh_concurrent_attempt_is_not_retired() {
        let h = harness();
        let quote = Quote {
            unit_price: 22000,
            total_amount: 44000,
        };
        // Freshly inserted, still waiting on its gateway call.
        h.store
            .insert(Booking::pending_online(&pune_request(&h), &quote, "k3".into()))
            .await
            .unwrap();

        let err = h
            .service
            .create_order(pune_request(&h).with_idempotency_key(Some("k3".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::AlreadyInProgress));

        // The in-flight attempt is untouched and no extra order was created.
        let bookings = h.store.list(None).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].status, BookingStatus::PendingPayment);
        assert_eq!(h.gateway.order_count(), 0);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_no_booking_pointing_at_nothing() {
        let h = harness();
        h.gateway.fail_orders.store(true, Ordering::SeqCst);

        let err = h
            .service
            .create_order(pune_request(&h).with_idempotency_key(Some("k1".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::GatewayUnavailable));

        let bookings = h.store.list(None).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].status, BookingStatus::Failed);
        assert!(bookings[0].gateway_order_id.is_none());

        // Retry after the gateway recovers gets a fresh order.
        h.gateway.fail_orders.store(false, Ordering::SeqCst);
        let created = h
            .service
            .create_order(pune_request(&h).with_idempotency_key(Some("k1".into())))
            .await
            .unwrap();
        assert_eq!(created.gateway_order_id, "order_1");
        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::PendingPayment);
    }

    #[tokio::test]
    async fn verify_confirms_and_records_payment_id() {
        let h = harness();
        let created = h.service.create_order(pune_request(&h)).await.unwrap();

        let outcome = h
            .service
            .verify(&created.booking_id, &created.gateway_order_id, "pay_1", "valid")
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Confirmed);

        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn reverifying_a_confirmed_booking_is_a_noop_success() {
        let h = harness();
        let created = h.service.create_order(pune_request(&h)).await.unwrap();
        h.service
            .verify(&created.booking_id, &created.gateway_order_id, "pay_1", "valid")
            .await
            .unwrap();

        let outcome = h
            .service
            .verify(&created.booking_id, &created.gateway_order_id, "pay_1", "valid")
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::AlreadyConfirmed);

        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn forged_signature_fails_the_booking_for_good() {
        let h = harness();
        let created = h.service.create_order(pune_request(&h)).await.unwrap();

        let err = h
            .service
            .verify(&created.booking_id, &created.gateway_order_id, "pay_1", "forged")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::PaymentNotConfirmed));

        // A later callback with the correct signature cannot reopen it.
        let err = h
            .service
            .verify(&created.booking_id, &created.gateway_order_id, "pay_1", "valid")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::PaymentNotConfirmed));

        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Failed);
    }

    #[tokio::test]
    async fn order_id_mismatch_is_an_integrity_failure() {
        let h = harness();
        let created = h.service.create_order(pune_request(&h)).await.unwrap();

        let err = h
            .service
            .verify(&created.booking_id, "order_someone_elses", "pay_1", "valid")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::PaymentNotConfirmed));

        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_booking_is_rejected() {
        let h = harness();
        let err = h
            .service
            .verify(&ObjectId::new(), "order_1", "pay_1", "valid")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::BookingNotFound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callbacks_apply_exactly_one_transition() {
        let h = harness();
        let created = h.service.create_order(pune_request(&h)).await.unwrap();
        let service = Arc::new(h.service);

        let a = {
            let service = service.clone();
            let id = created.booking_id;
            let order = created.gateway_order_id.clone();
            tokio::spawn(async move { service.verify(&id, &order, "pay_1", "valid").await })
        };
        let b = {
            let service = service.clone();
            let id = created.booking_id;
            let order = created.gateway_order_id.clone();
            tokio::spawn(async move { service.verify(&id, &order, "pay_1", "valid").await })
        };

        let outcomes = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let confirmed = outcomes
            .iter()
            .filter(|o| **o == VerifyOutcome::Confirmed)
            .count();
        assert_eq!(confirmed, 1);

        let booking = h.store.find_by_id(&created.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn offline_booking_is_confirmed_cash_with_no_gateway_call() {
        let h = harness();
        let admin = AdminPrincipal {
            label: "admin-key".to_string(),
        };

        let booking = h
            .service
            .create_offline_booking(pune_request(&h), &admin)
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_method, PaymentMethod::Cash);
        assert_eq!(booking.total_amount, 44000);
        assert!(booking.gateway_order_id.is_none());
        assert_eq!(h.gateway.order_count(), 0);

        let cash_only = h
            .service
            .list_bookings(Some(PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(cash_only.len(), 1);
    }

    #[tokio::test]
    async fn offline_booking_shares_online_validation() {
        let h = harness();
        let admin = AdminPrincipal {
            label: "admin-key".to_string(),
        };
        let mut request = pune_request(&h);
        request.city = "Mumbai".to_string();

        let err = h
            .service
            .create_offline_booking(request, &admin)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::Pricing(PricingError::CityNotBookable)
        ));
        assert!(h.store.is_empty());
    }
}
