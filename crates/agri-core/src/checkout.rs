//! # Checkout Orchestrator
//!
//! Drives a purchase from payment intent to committed order:
//!
//! ```text
//! Initiated ─▶ IntentCreated ─▶ Verifying ─▶ Verified ─▶ OrderCommitted
//!                                                             │
//!            Completed ◀─ CartCleared ◀─ StockAdjusted ◀──────┘
//!
//! any non-terminal state ─▶ Failed(reason)
//! ```
//!
//! The steps span independent stores with no shared transaction, so each
//! step has a defined failure policy:
//!
//! | Failing step        | Side effects already applied | Policy                                   |
//! |---------------------|------------------------------|------------------------------------------|
//! | intent creation     | none                         | `GatewayError`, caller retries           |
//! | signature check     | none                         | `SignatureMismatch`, incident recorded   |
//! | order write         | none                         | error returned, cart untouched           |
//! | stock decrement     | order persisted              | decrements compensated, order flagged    |
//! | cart clear          | order + stock                | logged only, checkout still completes    |
//!
//! From verification until the cart is cleared the buyer's cart is held, so
//! edits made mid-checkout land after the purchased lines are gone.

use crate::cart::{CartHold, CartStore};
use crate::error::{MarketError, MarketResult};
use crate::gateway::{BoxedPaymentGateway, GatewayCallback};
use crate::incident::{BoxedIncidentSink, Incident, IncidentKind};
use crate::item::{Currency, Price};
use crate::ledger::{StockLedger, StockLine};
use crate::order::{
    BoxedOrderRepository, InsertOutcome, Order, OrderLine, PaymentIntent, ReconciliationFlag,
    ShippingAddress,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Checkout settings injected at construction
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub currency: Currency,
    /// Upper bound on a gateway intent-creation call
    pub intent_timeout: Duration,
    /// How long an unsettled intent is remembered for the amount check
    pub intent_ttl: Duration,
    /// Cap on remembered intents; the oldest are dropped first
    pub max_pending_intents: usize,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: Currency::INR,
            intent_timeout: Duration::from_secs(10),
            intent_ttl: Duration::from_secs(30 * 60),
            max_pending_intents: 10_000,
        }
    }
}

/// Why a checkout run ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    GatewayError,
    SignatureMismatch,
    EmptyCart,
    NotFound,
    InsufficientStock,
    PartialStockAdjustment,
    AlreadyProcessed,
    InvalidRequest,
    Internal,
}

impl From<&MarketError> for FailureReason {
    fn from(err: &MarketError) -> Self {
        match err {
            MarketError::GatewayError(_) => FailureReason::GatewayError,
            MarketError::SignatureMismatch { .. } => FailureReason::SignatureMismatch,
            MarketError::EmptyCart => FailureReason::EmptyCart,
            MarketError::ItemNotFound { .. } | MarketError::CartLineNotFound { .. } => {
                FailureReason::NotFound
            }
            MarketError::OutOfStock { .. } | MarketError::InsufficientStock { .. } => {
                FailureReason::InsufficientStock
            }
            MarketError::PartialStockAdjustment { .. } => FailureReason::PartialStockAdjustment,
            MarketError::AlreadyProcessed { .. } => FailureReason::AlreadyProcessed,
            MarketError::InvalidRequest(_) => FailureReason::InvalidRequest,
            MarketError::Configuration(_)
            | MarketError::Storage(_)
            | MarketError::Serialization(_)
            | MarketError::Internal(_) => FailureReason::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutState {
    Initiated,
    IntentCreated,
    Verifying,
    Verified,
    OrderCommitted,
    StockAdjusted,
    CartCleared,
    Completed,
    Failed(FailureReason),
}

impl CheckoutState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Completed | CheckoutState::Failed(_))
    }

    /// Legal transitions. A failed cart clear skips straight to `Completed`,
    /// and an idempotent replay completes right after verification.
    pub fn can_advance_to(&self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        match (*self, next) {
            (from, Failed(_)) => !from.is_terminal(),
            (Initiated, IntentCreated)
            | (IntentCreated, Verifying)
            | (Verifying, Verified)
            | (Verified, OrderCommitted)
            | (Verified, Completed)
            | (OrderCommitted, StockAdjusted)
            | (OrderCommitted, Completed)
            | (StockAdjusted, CartCleared)
            | (StockAdjusted, Completed)
            | (CartCleared, Completed) => true,
            _ => false,
        }
    }
}

/// Bookkeeping for one pass through the state machine
#[derive(Debug)]
struct CheckoutRun {
    user_id: String,
    reference: String,
    state: CheckoutState,
    trail: Vec<CheckoutState>,
}

impl CheckoutRun {
    fn starting_at(user_id: &str, reference: &str, state: CheckoutState) -> Self {
        Self {
            user_id: user_id.to_string(),
            reference: reference.to_string(),
            state,
            trail: vec![state],
        }
    }

    fn advance(&mut self, next: CheckoutState) -> MarketResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(MarketError::Internal(format!(
                "illegal checkout transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(
            user_id = %self.user_id,
            reference = %self.reference,
            "checkout {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.trail.push(next);
        Ok(())
    }

    fn fail(&mut self, err: &MarketError) {
        let failed = CheckoutState::Failed(FailureReason::from(err));
        if self.state.can_advance_to(failed) {
            warn!(
                user_id = %self.user_id,
                reference = %self.reference,
                from = ?self.state,
                "checkout failed: {}",
                err
            );
            self.state = failed;
            self.trail.push(failed);
        }
    }
}

/// Buyer-supplied verification input, already shape-checked at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPayment {
    pub callback: GatewayCallback,
    pub shipping_address: ShippingAddress,
}

impl VerifyPayment {
    fn validate(&self) -> MarketResult<()> {
        for (field, value) in [
            ("gateway_order_id", &self.callback.gateway_order_id),
            ("gateway_payment_id", &self.callback.gateway_payment_id),
            ("signature", &self.callback.signature),
        ] {
            if value.trim().is_empty() {
                return Err(MarketError::InvalidRequest(format!("{} is required", field)));
            }
        }
        self.shipping_address.validate()
    }
}

/// Successful outcome of `verify_and_commit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub total: Price,
    /// True when this call matched an order settled by an earlier call
    pub replayed: bool,
    pub trail: Vec<CheckoutState>,
}

#[derive(Debug, Clone)]
struct IntentRecord {
    user_id: String,
    amount: Price,
    created_at: Instant,
}

pub struct CheckoutOrchestrator {
    carts: Arc<CartStore>,
    ledger: StockLedger,
    orders: BoxedOrderRepository,
    gateway: BoxedPaymentGateway,
    incidents: BoxedIncidentSink,
    config: CheckoutConfig,
    intents: RwLock<HashMap<String, IntentRecord>>,
}

impl CheckoutOrchestrator {
    pub fn new(
        carts: Arc<CartStore>,
        ledger: StockLedger,
        orders: BoxedOrderRepository,
        gateway: BoxedPaymentGateway,
        incidents: BoxedIncidentSink,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            carts,
            ledger,
            orders,
            gateway,
            incidents,
            config,
            intents: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Ask the gateway for a payment intent.
    ///
    /// `declared_amount` is what the client says it will pay. It is only
    /// passed through to the gateway; the order total is recomputed from
    /// the live cart at commit time.
    #[instrument(skip(self), fields(provider = self.gateway.provider_name()))]
    pub async fn create_intent(
        &self,
        user_id: &str,
        declared_amount: Price,
    ) -> MarketResult<PaymentIntent> {
        if declared_amount.amount <= 0 {
            return Err(MarketError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }

        let receipt = format!("receipt_{}", Utc::now().timestamp_millis());
        let mut run = CheckoutRun::starting_at(user_id, &receipt, CheckoutState::Initiated);

        let created = tokio::time::timeout(
            self.config.intent_timeout,
            self.gateway.create_intent(declared_amount, &receipt),
        )
        .await;

        let intent = match created {
            Ok(Ok(intent)) => intent,
            Ok(Err(err)) => {
                let err = match err {
                    MarketError::GatewayError(_) => err,
                    other => MarketError::GatewayError(other.to_string()),
                };
                run.fail(&err);
                return Err(err);
            }
            Err(_) => {
                let err = MarketError::GatewayError(format!(
                    "intent creation timed out after {:?}",
                    self.config.intent_timeout
                ));
                run.fail(&err);
                return Err(err);
            }
        };

        run.advance(CheckoutState::IntentCreated)?;
        self.remember_intent(&intent, user_id).await;

        info!(
            intent_id = %intent.intent_id,
            amount = %intent.amount.display(),
            "payment intent created"
        );
        Ok(intent)
    }

    /// Keep the intent for the amount check, evicting stale and excess entries.
    /// An evicted intent settles on signature alone.
    async fn remember_intent(&self, intent: &PaymentIntent, user_id: &str) {
        let now = Instant::now();
        let mut intents = self.intents.write().await;

        let before = intents.len();
        let ttl = self.config.intent_ttl;
        intents.retain(|_, record| now.duration_since(record.created_at) < ttl);

        while intents.len() >= self.config.max_pending_intents.max(1) {
            let Some(oldest) = intents
                .iter()
                .min_by_key(|(_, record)| record.created_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            intents.remove(&oldest);
        }

        let evicted = before - intents.len();
        if evicted > 0 {
            debug!(evicted, "dropped unsettled payment intents");
        }

        intents.insert(
            intent.intent_id.clone(),
            IntentRecord {
                user_id: user_id.to_string(),
                amount: intent.amount,
                created_at: now,
            },
        );
    }

    /// Verify a gateway callback and turn the buyer's live cart into an order.
    ///
    /// Replaying a settled `(gateway_order_id, gateway_payment_id)` returns
    /// the original order id without touching stock again.
    #[instrument(
        skip(self, request),
        fields(gateway_order_id = %request.callback.gateway_order_id)
    )]
    pub async fn verify_and_commit(
        &self,
        user_id: &str,
        request: VerifyPayment,
    ) -> MarketResult<CheckoutReceipt> {
        request.validate()?;

        let mut run = CheckoutRun::starting_at(
            user_id,
            &request.callback.gateway_order_id,
            CheckoutState::IntentCreated,
        );

        match self.settle(&mut run, request).await {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                run.fail(&err);
                Err(err)
            }
        }
    }

    async fn settle(
        &self,
        run: &mut CheckoutRun,
        request: VerifyPayment,
    ) -> MarketResult<CheckoutReceipt> {
        let VerifyPayment {
            callback,
            shipping_address,
        } = request;
        let user_id = run.user_id.clone();

        run.advance(CheckoutState::Verifying)?;
        if !self.gateway.verify_callback(&callback) {
            error!(
                user_id = %user_id,
                gateway_order_id = %callback.gateway_order_id,
                gateway_payment_id = %callback.gateway_payment_id,
                "payment signature mismatch"
            );
            self.incidents
                .record(Incident::new(
                    IncidentKind::SignatureMismatch,
                    &user_id,
                    &callback.gateway_order_id,
                    format!("payment id {}", callback.gateway_payment_id),
                ))
                .await;
            return Err(MarketError::SignatureMismatch {
                gateway_order_id: callback.gateway_order_id,
            });
        }
        run.advance(CheckoutState::Verified)?;

        let hold = self.carts.hold(&user_id).await;

        if let Some(existing) = self
            .orders
            .find_by_gateway_payment(&callback.gateway_payment_id)
            .await?
        {
            return self.replay(run, existing, &callback);
        }

        let lines = self.snapshot_cart(&hold, &user_id, &callback).await?;
        let order = Order::paid(
            &user_id,
            lines,
            shipping_address,
            &callback.gateway_order_id,
            &callback.gateway_payment_id,
            self.config.currency,
        );

        let order = match self.orders.insert(order).await? {
            InsertOutcome::Inserted(order) => order,
            // Lost a race with a concurrent call for the same payment.
            InsertOutcome::Existing(existing) => return self.replay(run, existing, &callback),
        };
        run.advance(CheckoutState::OrderCommitted)?;
        info!(
            order_id = %order.id,
            total = %order.total().display(),
            "order committed"
        );

        self.check_intent_amount(&order).await;

        let stock_lines: Vec<StockLine> = order
            .lines
            .iter()
            .map(|l| StockLine::new(&l.item_id, l.quantity))
            .collect();
        if let Err(err) = self.ledger.commit_lines(&stock_lines).await {
            return Err(self.stock_shortfall(&order, err).await);
        }
        run.advance(CheckoutState::StockAdjusted)?;

        match hold.clear().await {
            Ok(()) => run.advance(CheckoutState::CartCleared)?,
            Err(err) => warn!(order_id = %order.id, "cart clear failed after checkout: {}", err),
        }

        run.advance(CheckoutState::Completed)?;
        info!(order_id = %order.id, "checkout completed");

        Ok(CheckoutReceipt {
            order_id: order.id.clone(),
            total: order.total(),
            replayed: false,
            trail: run.trail.clone(),
        })
    }

    /// Re-fetch the live cart and freeze names and prices
    async fn snapshot_cart(
        &self,
        hold: &CartHold<'_>,
        user_id: &str,
        callback: &GatewayCallback,
    ) -> MarketResult<Vec<OrderLine>> {
        let cart_lines = hold.lines().await?;
        if cart_lines.is_empty() {
            return Err(MarketError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(cart_lines.len());
        for line in &cart_lines {
            match self.ledger.item(&line.item_id).await {
                Ok(item) => lines.push(OrderLine::snapshot(&item, line.quantity)),
                Err(err @ MarketError::ItemNotFound { .. }) => {
                    error!(item_id = %line.item_id, "carted item vanished after payment");
                    self.incidents
                        .record(Incident::new(
                            IncidentKind::MissingItemAfterPayment,
                            user_id,
                            &callback.gateway_order_id,
                            format!(
                                "item {} missing, payment {}",
                                line.item_id, callback.gateway_payment_id
                            ),
                        ))
                        .await;
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(lines)
    }

    fn replay(
        &self,
        run: &mut CheckoutRun,
        existing: Order,
        callback: &GatewayCallback,
    ) -> MarketResult<CheckoutReceipt> {
        if existing.user_id != run.user_id {
            warn!(
                order_id = %existing.id,
                "payment replayed by a different user"
            );
            return Err(MarketError::AlreadyProcessed {
                gateway_payment_id: callback.gateway_payment_id.clone(),
            });
        }

        if let Some(err) = existing.fulfilment_error() {
            warn!(order_id = %existing.id, "replayed payment for an unfulfilled order");
            return Err(err);
        }

        run.advance(CheckoutState::Completed)?;
        info!(order_id = %existing.id, "replayed settled payment");
        Ok(CheckoutReceipt {
            order_id: existing.id.clone(),
            total: existing.total(),
            replayed: true,
            trail: run.trail.clone(),
        })
    }

    /// The server total always wins; a disagreeing intent only flags the order
    async fn check_intent_amount(&self, order: &Order) {
        let Some(intent) = self.intents.write().await.remove(&order.gateway_order_id) else {
            debug!(order_id = %order.id, "no local intent record, skipping amount check");
            return;
        };

        if intent.amount == order.total() && intent.user_id == order.user_id {
            return;
        }

        let note = format!(
            "intent for {} by {} does not match order total {}",
            intent.amount.display(),
            intent.user_id,
            order.total().display()
        );
        warn!(order_id = %order.id, "{}", note);
        self.flag(
            order,
            ReconciliationFlag::IntentMismatch {
                detail: note.clone(),
            },
        )
        .await;
        self.incidents
            .record(
                Incident::new(
                    IncidentKind::AmountMismatch,
                    &order.user_id,
                    &order.gateway_order_id,
                    note,
                )
                .for_order(&order.id),
            )
            .await;
    }

    /// The order stands (money has moved); flag it and surface the shortfall
    async fn stock_shortfall(&self, order: &Order, err: MarketError) -> MarketError {
        let surfaced = match err {
            MarketError::InsufficientStock {
                item_id,
                requested,
                available,
            } => MarketError::PartialStockAdjustment {
                order_id: order.id.clone(),
                item_id,
                requested,
                available,
            },
            other => other,
        };

        error!(order_id = %order.id, "paid order could not be fulfilled from stock: {}", surfaced);
        let flag = match &surfaced {
            MarketError::PartialStockAdjustment {
                item_id,
                requested,
                available,
                ..
            } => ReconciliationFlag::StockShortfall {
                item_id: item_id.clone(),
                requested: *requested,
                available: *available,
            },
            other => ReconciliationFlag::StockNotAdjusted {
                detail: other.to_string(),
            },
        };
        let note = flag.to_string();
        self.flag(order, flag).await;
        self.incidents
            .record(
                Incident::new(
                    IncidentKind::PartialStockAdjustment,
                    &order.user_id,
                    &order.gateway_order_id,
                    note,
                )
                .for_order(&order.id),
            )
            .await;

        surfaced
    }

    async fn flag(&self, order: &Order, flag: ReconciliationFlag) {
        if let Err(err) = self.orders.flag_for_reconciliation(&order.id, flag).await {
            error!(order_id = %order.id, "failed to flag order for reconciliation: {}", err);
        }
    }
}
