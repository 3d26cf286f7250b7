use async_trait::async_trait;

use crate::models::booking::Booking;

/// Fire-and-forget confirmation hook. Failures are logged and never affect
/// booking state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn booking_confirmed(&self, booking: &Booking);
}

pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn booking_confirmed(&self, booking: &Booking) {
        log::info!(
            "Booking confirmed: {} for {} ({} x{}, {} via {})",
            booking
                .id
                .map(|id| id.to_hex())
                .unwrap_or_else(|| "<unsaved>".to_string()),
            booking.customer_name,
            booking.city,
            booking.members,
            booking.total_amount,
            booking.payment_method.as_str(),
        );
    }
}
