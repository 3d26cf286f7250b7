use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::services::payment::interface::{GatewayError, PaymentGatewayAdapter};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RazorpayProvider {
    key_id: String,
    key_secret: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

impl RazorpayProvider {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self::with_base_url(key_id, key_secret, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        // Startup-time construction; every gateway call carries the bounded
        // timeout or the process does not come up.
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client for payment gateway");

        RazorpayProvider {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: base_url.into(),
            http,
        }
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.key_id, self.key_secret);
        format!("Basic {}", BASE64.encode(credentials))
    }

    fn expected_signature(&self, order_id: &str, payment_id: &str) -> Option<String> {
        let mut mac = match HmacSha256::new_from_slice(self.key_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return None,
        };
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGatewayAdapter for RazorpayProvider {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
        });

        let res = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log::error!("Gateway order request failed: {}", err);
                GatewayError::Unavailable
            })?;

        let status = res.status();
        if status.is_success() {
            let order = res.json::<OrderResponse>().await.map_err(|err| {
                log::error!("Gateway order response was unreadable: {}", err);
                GatewayError::Unavailable
            })?;
            return Ok(order.id);
        }

        // Provider error bodies stay in the log; callers only see the taxonomy.
        let body = res.text().await.unwrap_or_default();
        log::error!("Gateway order creation returned {}: {}", status, body);
        if status.is_client_error() {
            Err(GatewayError::Rejected)
        } else {
            Err(GatewayError::Unavailable)
        }
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
            return false;
        }
        let expected = match self.expected_signature(order_id, payment_id) {
            Some(expected) => expected,
            None => return false,
        };
        expected
            .as_bytes()
            .ct_eq(signature.trim().as_bytes())
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RazorpayProvider {
        RazorpayProvider::new("rzp_test_key", "test_secret")
    }

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_matching_signature() {
        let p = provider();
        let sig = sign("test_secret", "order_abc", "pay_123");
        assert!(p.verify_signature("order_abc", "pay_123", &sig));
    }

    #[test]
    fn rejects_signature_for_other_order() {
        let p = provider();
        let sig = sign("test_secret", "order_other", "pay_123");
        assert!(!p.verify_signature("order_abc", "pay_123", &sig));
    }

    #[test]
    fn rejects_signature_from_wrong_secret() {
        let p = provider();
        let sig = sign("leaked_secret", "order_abc", "pay_123");
        assert!(!p.verify_signature("order_abc", "pay_123", &sig));
    }

    #[test]
    fn rejects_empty_and_malformed_input_without_panicking() {
        let p = provider();
        assert!(!p.verify_signature("", "", ""));
        assert!(!p.verify_signature("order_abc", "pay_123", ""));
        assert!(!p.verify_signature("order_abc", "", "deadbeef"));
        assert!(!p.verify_signature("order_abc", "pay_123", "not-hex-at-all"));
        assert!(!p.verify_signature("order_abc", "pay_123", "\u{0} \u{fffd}"));
    }

    #[test]
    fn ignores_surrounding_whitespace_on_signature() {
        let p = provider();
        let sig = format!("  {}  ", sign("test_secret", "order_abc", "pay_123"));
        assert!(p.verify_signature("order_abc", "pay_123", sig.trim()));
    }
}
