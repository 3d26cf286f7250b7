use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, IndexModel};
use thiserror::Error;

use crate::models::booking::{Booking, BookingStatus, PaymentMethod};

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Booking store unavailable")]
    Unavailable,
    /// Another pending booking already holds this idempotency key.
    #[error("A booking with this idempotency key is already pending")]
    DuplicateKey,
}

/// Persistence seam for bookings. All status mutation goes through
/// [`BookingStore::transition`], which only succeeds when the booking is still
/// in the expected `from` state; that guard is what serializes duplicate
/// gateway callbacks racing on the same booking.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] when a `PENDING_PAYMENT`
    /// booking with the same idempotency key already exists, so two
    /// concurrent submissions of one logical request cannot both insert.
    async fn insert(&self, booking: Booking) -> Result<ObjectId, StoreError>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Booking>, StoreError>;

    /// Latest non-terminal booking carrying this idempotency key, if any.
    async fn find_pending_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Booking>, StoreError>;

    async fn set_gateway_order(&self, id: &ObjectId, order_id: &str) -> Result<(), StoreError>;

    /// Guarded state transition: applies `to` (and the payment id, when given)
    /// only if the booking currently has status `from`. Returns the updated
    /// booking when the guard matched, `None` when the caller lost the race.
    async fn transition(
        &self,
        id: &ObjectId,
        from: BookingStatus,
        to: BookingStatus,
        payment_id: Option<&str>,
    ) -> Result<Option<Booking>, StoreError>;

    async fn list(
        &self,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Vec<Booking>, StoreError>;
}

pub struct MongoBookingStore {
    client: Arc<Client>,
}

impl MongoBookingStore {
    pub fn new(client: Arc<Client>) -> Self {
        MongoBookingStore { client }
    }

    fn collection(&self) -> mongodb::Collection<Booking> {
        self.client.database("Bookings").collection("Bookings")
    }

    /// Unique index over `idempotencyKey`, restricted to `PENDING_PAYMENT`
    /// documents. The database is the arbiter when two submissions of the
    /// same logical request race: exactly one insert lands, the other gets a
    /// duplicate-key error.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder()
            .keys(doc! { "idempotencyKey": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! {
                        "status": BookingStatus::PendingPayment.as_str(),
                        "idempotencyKey": { "$exists": true },
                    })
                    .build(),
            )
            .build();

        self.collection().create_index(index).await.map_err(|err| {
            log::error!("Failed to create booking indexes: {}", err);
            StoreError::Unavailable
        })?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_err))
            if write_err.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl BookingStore for MongoBookingStore {
    async fn insert(&self, booking: Booking) -> Result<ObjectId, StoreError> {
        let result = self.collection().insert_one(&booking).await.map_err(|err| {
            if is_duplicate_key(&err) {
                return StoreError::DuplicateKey;
            }
            log::error!("Failed to insert booking: {}", err);
            StoreError::Unavailable
        })?;
        result
            .inserted_id
            .as_object_id()
            .ok_or(StoreError::Unavailable)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Booking>, StoreError> {
        self.collection()
            .find_one(doc! { "_id": id })
            .await
            .map_err(|err| {
                log::error!("Failed to fetch booking {}: {}", id, err);
                StoreError::Unavailable
            })
    }

    async fn find_pending_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        self.collection()
            .find_one(doc! {
                "idempotencyKey": key,
                "status": BookingStatus::PendingPayment.as_str(),
            })
            .await
            .map_err(|err| {
                log::error!("Idempotency lookup failed: {}", err);
                StoreError::Unavailable
            })
    }

    async fn set_gateway_order(&self, id: &ObjectId, order_id: &str) -> Result<(), StoreError> {
        self.collection()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "gatewayOrderId": order_id,
                    "updatedAt": DateTime::now(),
                }},
            )
            .await
            .map_err(|err| {
                log::error!("Failed to record gateway order on {}: {}", id, err);
                StoreError::Unavailable
            })?;
        Ok(())
    }

    async fn transition(
        &self,
        id: &ObjectId,
        from: BookingStatus,
        to: BookingStatus,
        payment_id: Option<&str>,
    ) -> Result<Option<Booking>, StoreError> {
        let mut set = doc! {
            "status": to.as_str(),
            "updatedAt": DateTime::now(),
        };
        if let Some(payment_id) = payment_id {
            set.insert("gatewayPaymentId", payment_id);
        }

        self.collection()
            .find_one_and_update(
                doc! { "_id": id, "status": from.as_str() },
                doc! { "$set": set },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| {
                log::error!("Status transition failed for {}: {}", id, err);
                StoreError::Unavailable
            })
    }

    async fn list(
        &self,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Vec<Booking>, StoreError> {
        use futures::TryStreamExt;

        let filter = match payment_method {
            Some(method) => doc! { "paymentMethod": method.as_str() },
            None => doc! {},
        };
        let cursor = self.collection().find(filter).await.map_err(|err| {
            log::error!("Failed to list bookings: {}", err);
            StoreError::Unavailable
        })?;
        cursor.try_collect().await.map_err(|err| {
            log::error!("Booking cursor failed: {}", err);
            StoreError::Unavailable
        })
    }
}

/// In-memory store backed by a mutex-guarded map. The lock gives the same
/// single-writer guarantee per booking that the Mongo guarded update provides.
#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<HashMap<ObjectId, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, mut booking: Booking) -> Result<ObjectId, StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        if booking.status == BookingStatus::PendingPayment {
            if let Some(key) = booking.idempotency_key.as_deref() {
                let taken = bookings.values().any(|b| {
                    b.status == BookingStatus::PendingPayment
                        && b.idempotency_key.as_deref() == Some(key)
                });
                if taken {
                    return Err(StoreError::DuplicateKey);
                }
            }
        }
        let id = ObjectId::new();
        booking.id = Some(id);
        bookings.insert(id, booking);
        Ok(id)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.lock().unwrap().get(id).cloned())
    }

    async fn find_pending_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .values()
            .find(|b| {
                b.status == BookingStatus::PendingPayment
                    && b.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn set_gateway_order(&self, id: &ObjectId, order_id: &str) -> Result<(), StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        if let Some(booking) = bookings.get_mut(id) {
            booking.gateway_order_id = Some(order_id.to_string());
            booking.updated_at = Some(DateTime::now());
        }
        Ok(())
    }

    async fn transition(
        &self,
        id: &ObjectId,
        from: BookingStatus,
        to: BookingStatus,
        payment_id: Option<&str>,
    ) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        match bookings.get_mut(id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                if let Some(payment_id) = payment_id {
                    booking.gateway_payment_id = Some(payment_id.to_string());
                }
                booking.updated_at = Some(DateTime::now());
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list(
        &self,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .values()
            .filter(|b| payment_method.map_or(true, |m| b.payment_method == m))
            .cloned()
            .collect())
    }
}
