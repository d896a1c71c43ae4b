//! # Market Error Types
//!
//! Typed error handling for the agri-cart marketplace core.
//! Cart, stock and checkout operations return `Result<T, MarketError>`.

use thiserror::Error;

/// Core error type for cart, stock and checkout operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed or invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Item is unknown to the stock ledger (or hidden from buyers)
    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: String },

    /// Cart has no line for this item
    #[error("Item not in cart: {item_id}")]
    CartLineNotFound { item_id: String },

    /// Cart mutation would exceed live stock
    #[error("Only {max} units of {item_id} available")]
    OutOfStock { item_id: String, max: u32 },

    /// Compare-and-decrement rejected at commit time
    #[error("Insufficient stock for {item_id}: requested {requested}, only {available} available")]
    InsufficientStock {
        item_id: String,
        requested: u32,
        available: u32,
    },

    /// Callback signature did not match the keyed hash
    #[error("Payment signature mismatch for gateway order {gateway_order_id}")]
    SignatureMismatch { gateway_order_id: String },

    /// Payment gateway unreachable, timed out or rejected the request
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// Checkout attempted with no cart lines
    #[error("Cart is empty")]
    EmptyCart,

    /// Order persisted but stock could not be fully decremented
    #[error(
        "Order {order_id} is paid but stock adjustment failed on {item_id} \
         (requested {requested}, available {available})"
    )]
    PartialStockAdjustment {
        order_id: String,
        item_id: String,
        requested: u32,
        available: u32,
    },

    /// Gateway payment id already settled by another buyer or in-flight request
    #[error("Payment {gateway_payment_id} was already processed")]
    AlreadyProcessed { gateway_payment_id: String },

    /// Persistence backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Returns true if the caller may retry (after re-reading state where relevant)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::GatewayError(_)
                | MarketError::OutOfStock { .. }
                | MarketError::InsufficientStock { .. }
                | MarketError::Storage(_)
        )
    }

    /// Whether this failure must be kept for manual/operational review
    pub fn requires_review(&self) -> bool {
        matches!(
            self,
            MarketError::SignatureMismatch { .. } | MarketError::PartialStockAdjustment { .. }
        )
    }

    /// Stable, caller-facing reason code
    pub fn reason(&self) -> &'static str {
        match self {
            MarketError::ItemNotFound { .. } | MarketError::CartLineNotFound { .. } => "NotFound",
            MarketError::OutOfStock { .. } => "OutOfStock",
            MarketError::InsufficientStock { .. } | MarketError::PartialStockAdjustment { .. } => {
                "InsufficientStock"
            }
            MarketError::SignatureMismatch { .. } => "SignatureMismatch",
            MarketError::GatewayError(_) => "GatewayError",
            MarketError::EmptyCart => "EmptyCart",
            MarketError::AlreadyProcessed { .. } => "AlreadyProcessed",
            MarketError::InvalidRequest(_) => "InvalidRequest",
            MarketError::Configuration(_)
            | MarketError::Storage(_)
            | MarketError::Serialization(_)
            | MarketError::Internal(_) => "InternalError",
        }
    }

    /// Message safe to show a buyer. Payment failures never leak internals.
    pub fn user_message(&self) -> String {
        match self {
            MarketError::SignatureMismatch { .. } | MarketError::GatewayError(_) => {
                "Payment could not be verified".to_string()
            }
            MarketError::PartialStockAdjustment { requested, available, .. } => format!(
                "Your payment was received but only {} of {} units could be reserved; our team will contact you",
                available, requested
            ),
            MarketError::Configuration(_)
            | MarketError::Storage(_)
            | MarketError::Serialization(_)
            | MarketError::Internal(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            MarketError::Configuration(_) => 500,
            MarketError::InvalidRequest(_) => 400,
            MarketError::ItemNotFound { .. } => 404,
            MarketError::CartLineNotFound { .. } => 404,
            MarketError::OutOfStock { .. } => 409,
            MarketError::InsufficientStock { .. } => 409,
            MarketError::SignatureMismatch { .. } => 400,
            MarketError::GatewayError(_) => 502,
            MarketError::EmptyCart => 400,
            MarketError::PartialStockAdjustment { .. } => 409,
            MarketError::AlreadyProcessed { .. } => 409,
            MarketError::Storage(_) => 503,
            MarketError::Serialization(_) => 500,
            MarketError::Internal(_) => 500,
        }
    }
}

/// Result type alias for market operations
pub type MarketResult<T> = Result<T, MarketError>;
