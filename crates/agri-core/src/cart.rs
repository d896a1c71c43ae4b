//! # Cart Store
//!
//! Per-user cart state, validated against live stock on every mutation.
//!
//! Validation here is advisory: a cart holds no reservation, and stock may
//! shrink before checkout. The authoritative check is the stock ledger's
//! compare-and-decrement at order commit.

use crate::error::{MarketError, MarketResult};
use crate::item::{Currency, Item, Price};
use crate::ledger::StockLedger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

/// One item in a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    pub quantity: u32,
}

/// A buyer's pending selection. At most one line per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: String,
    lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lines: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, item_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    /// Set the quantity for an item, inserting the line if absent
    pub fn put(&mut self, item_id: &str, quantity: u32) {
        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => line.quantity = quantity,
            None => self.lines.push(CartLine {
                item_id: item_id.to_string(),
                quantity,
            }),
        }
        self.updated_at = Utc::now();
    }

    /// Remove a line; returns whether one was present
    pub fn remove(&mut self, item_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != item_id);
        let removed = self.lines.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Direction of a single add-to-cart click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum CartStep {
    Increment,
    Decrement,
}

impl TryFrom<i8> for CartStep {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CartStep::Increment),
            -1 => Ok(CartStep::Decrement),
            other => Err(format!("step must be 1 or -1, got {}", other)),
        }
    }
}

impl From<CartStep> for i8 {
    fn from(step: CartStep) -> i8 {
        match step {
            CartStep::Increment => 1,
            CartStep::Decrement => -1,
        }
    }
}

impl Default for CartStep {
    fn default() -> Self {
        CartStep::Increment
    }
}

/// A cart line with item details resolved for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    pub item_id: String,
    pub name: String,
    pub unit_price: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub available: u32,
    pub quantity: u32,
    pub line_total: Price,
}

impl CartLineView {
    fn resolve(line: &CartLine, item: &Item) -> Self {
        Self {
            item_id: line.item_id.clone(),
            name: item.name.clone(),
            unit_price: item.price,
            image_url: item.image_url.clone(),
            available: item.available_quantity,
            quantity: line.quantity,
            line_total: item.price.times(line.quantity),
        }
    }
}

/// Cart as returned to the buyer. An absent cart is `{items: []}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub subtotal: Price,
}

impl CartView {
    pub fn empty(currency: Currency) -> Self {
        Self {
            items: Vec::new(),
            subtotal: Price::zero(currency),
        }
    }

    pub fn quantity_of(&self, item_id: &str) -> Option<u32> {
        self.items
            .iter()
            .find(|l| l.item_id == item_id)
            .map(|l| l.quantity)
    }
}

/// Persistence port for carts
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> MarketResult<Option<Cart>>;
    async fn save(&self, cart: Cart) -> MarketResult<()>;
    /// Delete a user's cart. Deleting an absent cart is not an error.
    async fn delete(&self, user_id: &str) -> MarketResult<()>;
}

pub type BoxedCartRepository = Arc<dyn CartRepository>;

/// Exclusive access to one buyer's cart, see [`CartStore::hold`]
pub struct CartHold<'a> {
    store: &'a CartStore,
    user_id: String,
    guard: OwnedMutexGuard<()>,
}

impl CartHold<'_> {
    /// Raw cart lines, unresolved
    pub async fn lines(&self) -> MarketResult<Vec<CartLine>> {
        Ok(self
            .store
            .repo
            .load(&self.user_id)
            .await?
            .map(|c| c.lines().to_vec())
            .unwrap_or_default())
    }

    /// Drop the whole cart after a committed order and release the lock
    pub async fn clear(self) -> MarketResult<()> {
        self.store.repo.delete(&self.user_id).await?;
        drop(self.guard);
        info!(user_id = %self.user_id, "cart cleared");
        Ok(())
    }
}

/// Cart mutation engine.
///
/// Mutations for the same user run one at a time behind a per-user lock;
/// different users never share a lock.
pub struct CartStore {
    repo: BoxedCartRepository,
    ledger: StockLedger,
    currency: Currency,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CartStore {
    pub fn new(repo: BoxedCartRepository, ledger: StockLedger) -> Self {
        Self {
            repo,
            ledger,
            currency: Currency::default(),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock().await;
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Only visible items can be carted
    async fn purchasable(&self, item_id: &str) -> MarketResult<Item> {
        let item = self.ledger.item(item_id).await?;
        if !item.visible {
            return Err(MarketError::ItemNotFound {
                item_id: item_id.to_string(),
            });
        }
        Ok(item)
    }

    /// Add an item with quantity 1, or step an existing line up or down.
    ///
    /// Decrementing never drops below 1; use [`CartStore::remove`] to delete.
    #[instrument(skip(self))]
    pub async fn add_or_increment(
        &self,
        user_id: &str,
        item_id: &str,
        step: CartStep,
    ) -> MarketResult<CartView> {
        let _guard = self.lock_user(user_id).await;
        self.purchasable(item_id).await?;

        let mut cart = self
            .repo
            .load(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id));

        let next = match (cart.line(item_id).map(|l| l.quantity), step) {
            (None, _) => {
                self.ledger.try_reserve(item_id, 1).await?;
                1
            }
            (Some(current), CartStep::Increment) => {
                self.ledger.try_reserve(item_id, current + 1).await?;
                current + 1
            }
            (Some(current), CartStep::Decrement) => current.saturating_sub(1).max(1),
        };

        cart.put(item_id, next);
        self.repo.save(cart).await?;
        debug!(quantity = next, "cart line updated");

        self.view(user_id).await
    }

    /// Set an existing line to an absolute quantity
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> MarketResult<CartView> {
        if quantity == 0 {
            return Err(MarketError::InvalidRequest(
                "quantity must be at least 1".to_string(),
            ));
        }

        let _guard = self.lock_user(user_id).await;
        self.ledger.try_reserve(item_id, quantity).await?;

        let mut cart = self
            .repo
            .load(user_id)
            .await?
            .filter(|c| c.line(item_id).is_some())
            .ok_or_else(|| MarketError::CartLineNotFound {
                item_id: item_id.to_string(),
            })?;

        cart.put(item_id, quantity);
        self.repo.save(cart).await?;

        self.view(user_id).await
    }

    /// Delete a line. Removing an absent line is a no-op.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: &str, item_id: &str) -> MarketResult<CartView> {
        let _guard = self.lock_user(user_id).await;

        if let Some(mut cart) = self.repo.load(user_id).await? {
            if cart.remove(item_id) {
                if cart.is_empty() {
                    self.repo.delete(user_id).await?;
                } else {
                    self.repo.save(cart).await?;
                }
            }
        }

        self.view(user_id).await
    }

    /// The buyer's cart with item details resolved
    pub async fn get_cart(&self, user_id: &str) -> MarketResult<CartView> {
        self.view(user_id).await
    }

    /// Take the buyer's cart lock for the length of a checkout.
    ///
    /// Mutations for the same user wait until the hold is released, so the
    /// cart that gets cleared is the cart that was purchased.
    pub async fn hold(&self, user_id: &str) -> CartHold<'_> {
        CartHold {
            guard: self.lock_user(user_id).await,
            store: self,
            user_id: user_id.to_string(),
        }
    }

    async fn view(&self, user_id: &str) -> MarketResult<CartView> {
        let Some(cart) = self.repo.load(user_id).await? else {
            return Ok(CartView::empty(self.currency));
        };

        let mut view = CartView::empty(self.currency);
        for line in cart.lines() {
            match self.ledger.item(&line.item_id).await {
                Ok(item) => {
                    let resolved = CartLineView::resolve(line, &item);
                    view.subtotal = view.subtotal + resolved.line_total;
                    view.items.push(resolved);
                }
                Err(MarketError::ItemNotFound { .. }) => {
                    warn!(item_id = %line.item_id, "dropping cart line for delisted item");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(view)
    }
}
