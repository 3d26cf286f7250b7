/// Typed view of the environment. Loaded once at startup; the gateway secret
/// and admin key never get read from the environment at call sites.
#[derive(Clone)]
pub struct AppConfig {
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub admin_api_key: String,
    pub currency: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            razorpay_key_id: std::env::var("RAZORPAY_KEY_ID")
                .expect("RAZORPAY_KEY_ID must be set"),
            razorpay_key_secret: std::env::var("RAZORPAY_KEY_SECRET")
                .expect("RAZORPAY_KEY_SECRET must be set"),
            admin_api_key: std::env::var("ADMIN_API_KEY").expect("ADMIN_API_KEY must be set"),
            currency: std::env::var("BOOKING_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
        }
    }
}
