pub mod interface;
pub mod razorpay;
