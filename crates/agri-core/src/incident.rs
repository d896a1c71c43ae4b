//! # Incidents
//!
//! Trust and consistency breaches that need a human: forged payment
//! callbacks, paid orders that could not be fulfilled from stock, and
//! payments whose amount disagrees with the server-side total.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    SignatureMismatch,
    PartialStockAdjustment,
    AmountMismatch,
    /// Payment verified but a carted item vanished before the order was written
    MissingItemAfterPayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub kind: IncidentKind,
    pub user_id: String,
    pub gateway_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(
        kind: IncidentKind,
        user_id: impl Into<String>,
        gateway_order_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            gateway_order_id: gateway_order_id.into(),
            order_id: None,
            detail: detail.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn for_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

/// Destination for incidents awaiting review
#[async_trait]
pub trait IncidentSink: Send + Sync {
    async fn record(&self, incident: Incident);
}

pub type BoxedIncidentSink = Arc<dyn IncidentSink>;
