//! # agri-razorpay
//!
//! Razorpay payment gateway for agri-cart.
//!
//! - Intents are created through the Razorpay Orders API (amounts in paise)
//! - Payment callbacks are verified locally with HMAC-SHA256 over
//!   `order_id|payment_id`, keyed with the key secret
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agri_razorpay::RazorpayGateway;
//! use agri_core::{Currency, PaymentGateway, Price};
//!
//! let gateway = RazorpayGateway::from_env()?;
//! let intent = gateway
//!     .create_intent(Price::new(260.0, Currency::INR), "receipt_1700000000000")
//!     .await?;
//!
//! // Hand intent.intent_id to the Razorpay checkout widget
//! ```

pub mod config;
pub mod gateway;

// Re-exports
pub use config::RazorpayConfig;
pub use gateway::RazorpayGateway;
