//! # Razorpay Orders
//!
//! Payment intents are Razorpay orders: the client opens the Razorpay
//! widget with the returned order id, and after payment the widget hands
//! back `(razorpay_order_id, razorpay_payment_id, razorpay_signature)`.
//! That triple is verified locally with the key secret; no API call is
//! made during verification.

use crate::config::RazorpayConfig;
use agri_core::{
    signature, GatewayCallback, MarketError, MarketResult, PaymentGateway, PaymentIntent, Price,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Razorpay gateway backed by the Orders API
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: Client,
}

impl RazorpayGateway {
    /// Create a new Razorpay gateway
    pub fn new(config: RazorpayConfig) -> MarketResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MarketError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> MarketResult<Self> {
        Self::new(RazorpayConfig::from_env()?)
    }

    pub fn is_test_mode(&self) -> bool {
        self.config.is_test_mode()
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self), fields(amount = amount.amount))]
    async fn create_intent(&self, amount: Price, receipt: &str) -> MarketResult<PaymentIntent> {
        let request = RazorpayOrderRequest {
            amount: amount.amount,
            currency: amount.currency.code(),
            receipt,
        };

        debug!("Creating Razorpay order: receipt={}", receipt);

        let url = format!("{}/v1/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| MarketError::GatewayError(format!("network: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketError::GatewayError(format!("network: {}", e)))?;

        if !status.is_success() {
            error!("Razorpay API error: status={}, body={}", status, body);

            if let Ok(error_response) = serde_json::from_str::<RazorpayErrorResponse>(&body) {
                return Err(MarketError::GatewayError(format!(
                    "razorpay {}: {}",
                    error_response.error.code, error_response.error.description
                )));
            }

            return Err(MarketError::GatewayError(format!(
                "razorpay HTTP {}: {}",
                status, body
            )));
        }

        let order: RazorpayOrderResponse = serde_json::from_str(&body).map_err(|e| {
            MarketError::GatewayError(format!("Failed to parse Razorpay response: {}", e))
        })?;

        if order.currency != amount.currency.code() {
            return Err(MarketError::GatewayError(format!(
                "razorpay returned currency {}, expected {}",
                order.currency,
                amount.currency.code()
            )));
        }
        if order.amount != amount.amount {
            warn!(
                "Razorpay order {} amount {} differs from requested {}",
                order.id, order.amount, amount.amount
            );
        }

        info!(
            "Created Razorpay order: id={}, status={}",
            order.id, order.status
        );

        Ok(PaymentIntent::new(
            order.id,
            Price::from_minor(order.amount, amount.currency),
        ))
    }

    fn verify_callback(&self, callback: &GatewayCallback) -> bool {
        signature::verify(
            &self.config.key_secret,
            &callback.gateway_order_id,
            &callback.gateway_payment_id,
            &callback.signature,
        )
    }

    fn provider_name(&self) -> &'static str {
        "razorpay"
    }
}

// =============================================================================
// Razorpay API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct RazorpayOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorResponse {
    error: RazorpayError,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    #[serde(default)]
    code: String,
    description: String,
}
