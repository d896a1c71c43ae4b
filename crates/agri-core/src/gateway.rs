//! # Payment Gateway Trait
//!
//! The narrow slice of an external payment gateway the checkout pipeline
//! consumes: create an intent, and verify the signed callback the buyer's
//! browser relays after paying. The core never polls the gateway.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           PaymentGateway (trait)             │
//! │  ├── create_intent()                         │
//! │  ├── verify_callback()                       │
//! │  └── provider_name()                         │
//! └──────────────────────────────────────────────┘
//!                       ▲
//!          ┌────────────┴────────────┐
//!  ┌───────┴────────┐       ┌────────┴────────┐
//!  │RazorpayGateway │       │  test doubles   │
//!  └────────────────┘       └─────────────────┘
//! ```

use crate::error::MarketResult;
use crate::item::Price;
use crate::order::PaymentIntent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters the gateway hands back to the client after payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

impl GatewayCallback {
    pub fn new(
        gateway_order_id: impl Into<String>,
        gateway_payment_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: gateway_payment_id.into(),
            signature: signature.into(),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for `amount`.
    ///
    /// `receipt` is our reference for the attempt, echoed by the gateway.
    async fn create_intent(&self, amount: Price, receipt: &str) -> MarketResult<PaymentIntent>;

    /// Recompute the keyed hash over the callback ids with the shared
    /// secret and compare it to the supplied signature.
    fn verify_callback(&self, callback: &GatewayCallback) -> bool;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared payment gateway (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;
