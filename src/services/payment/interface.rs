use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("The payment gateway could not be reached, please try again")]
    Unavailable,
    #[error("The payment gateway rejected the order")]
    Rejected,
}

/// Boundary to the external payment provider. `create_order` registers an
/// intended charge and returns the provider's opaque order id;
/// `verify_signature` is the pure check used to authenticate callbacks.
#[async_trait]
pub trait PaymentGatewayAdapter: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<String, GatewayError>;

    /// Must never fail open: malformed or empty input yields `false`, and no
    /// input may cause a panic.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}
