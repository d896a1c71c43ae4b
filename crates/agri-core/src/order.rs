//! # Order Types
//!
//! Orders, payment intents and the order repository port.
//!
//! An order is created exactly once per settled payment and never has its
//! lines or total rewritten afterwards. Prices are snapshotted into the
//! order so later catalog changes do not alter what was charged.

use crate::error::{MarketError, MarketResult};
use crate::item::{Currency, Item, Price};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A purchased line, frozen at commit time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: String,

    /// Item name at the moment of purchase
    pub name: String,

    pub quantity: u32,

    /// Unit price at the moment of purchase
    pub unit_price: Price,
}

impl OrderLine {
    pub fn snapshot(item: &Item, quantity: u32) -> Self {
        Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            quantity,
            unit_price: item.price,
        }
    }

    pub fn total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Delivery details supplied at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub phone: String,
}

impl ShippingAddress {
    pub fn new(
        address: impl Into<String>,
        city: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            city: city.into(),
            phone: phone.into(),
        }
    }

    /// Every field must be non-blank
    pub fn validate(&self) -> MarketResult<()> {
        for (field, value) in [
            ("address", &self.address),
            ("city", &self.city),
            ("phone", &self.phone),
        ] {
            if value.trim().is_empty() {
                return Err(MarketError::InvalidRequest(format!(
                    "shipping_address.{} is required",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

/// A committed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub lines: Vec<OrderLine>,
    total: Price,
    pub shipping_address: ShippingAddress,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,

    /// Reasons this order needs manual follow-up, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reconciliation: Vec<ReconciliationFlag>,

    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a paid order. The total is always derived from the lines.
    pub fn paid(
        user_id: impl Into<String>,
        lines: Vec<OrderLine>,
        shipping_address: ShippingAddress,
        gateway_order_id: impl Into<String>,
        gateway_payment_id: impl Into<String>,
        currency: Currency,
    ) -> Self {
        let total = lines
            .iter()
            .fold(Price::zero(currency), |acc, line| acc + line.total());

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            lines,
            total,
            shipping_address,
            payment_status: PaymentStatus::Paid,
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: gateway_payment_id.into(),
            reconciliation: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn total(&self) -> Price {
        self.total
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn needs_reconciliation(&self) -> bool {
        !self.reconciliation.is_empty()
    }

    /// The error a buyer should see for this order if its stock was never
    /// taken. `None` when the order was fulfilled.
    pub fn fulfilment_error(&self) -> Option<MarketError> {
        self.reconciliation.iter().find_map(|flag| match flag {
            ReconciliationFlag::StockShortfall {
                item_id,
                requested,
                available,
            } => Some(MarketError::PartialStockAdjustment {
                order_id: self.id.clone(),
                item_id: item_id.clone(),
                requested: *requested,
                available: *available,
            }),
            ReconciliationFlag::StockNotAdjusted { detail } => Some(MarketError::Internal(
                format!("order {} was not fulfilled: {}", self.id, detail),
            )),
            ReconciliationFlag::IntentMismatch { .. } => None,
        })
    }
}

/// Why a committed order was set aside for manual follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationFlag {
    /// A line could not be decremented; every earlier line was restored
    StockShortfall {
        item_id: String,
        requested: u32,
        available: u32,
    },
    /// Stock adjustment failed for a reason other than quantity
    StockNotAdjusted { detail: String },
    /// The intent was opened for a different amount or buyer
    IntentMismatch { detail: String },
}

impl std::fmt::Display for ReconciliationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StockShortfall {
                item_id,
                requested,
                available,
            } => write!(
                f,
                "stock shortfall on {}: requested {}, available {}",
                item_id, requested, available
            ),
            Self::StockNotAdjusted { detail } => write!(f, "stock not adjusted: {}", detail),
            Self::IntentMismatch { detail } => write!(f, "intent mismatch: {}", detail),
        }
    }
}

/// A gateway-side payment intent. Opaque apart from id and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub amount: Price,
}

impl PaymentIntent {
    pub fn new(intent_id: impl Into<String>, amount: Price) -> Self {
        Self {
            intent_id: intent_id.into(),
            amount,
        }
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency
    }
}

/// Result of an idempotent insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Order),
    /// An order for the same gateway payment id already exists
    Existing(Order),
}

/// Persistence port for orders.
///
/// Inserts are keyed on `gateway_payment_id`: a second insert for the same
/// payment must return the stored order instead of writing a new one.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: Order) -> MarketResult<InsertOutcome>;

    async fn get(&self, order_id: &str) -> MarketResult<Option<Order>>;

    async fn find_by_gateway_payment(&self, gateway_payment_id: &str)
        -> MarketResult<Option<Order>>;

    /// The user's orders, newest first
    async fn list_for_user(&self, user_id: &str) -> MarketResult<Vec<Order>>;

    /// Record a reason for manual follow-up. Lines and total stay untouched.
    async fn flag_for_reconciliation(
        &self,
        order_id: &str,
        flag: ReconciliationFlag,
    ) -> MarketResult<()>;
}

pub type BoxedOrderRepository = Arc<dyn OrderRepository>;
