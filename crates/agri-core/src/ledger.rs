//! # Stock Ledger
//!
//! Single source of truth for how many units of an item remain sellable.
//!
//! Carts only *check* headroom through [`StockLedger::try_reserve`]; stock is
//! decremented exclusively at order commit through the atomic
//! [`StockRepository::decrement_if_available`] primitive, so two buyers can
//! never both take the last unit.

use crate::error::{MarketError, MarketResult};
use crate::item::Item;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Persistence port for item stock.
#[async_trait]
pub trait StockRepository: Send + Sync {
    /// Fetch an item by id
    async fn get_item(&self, item_id: &str) -> MarketResult<Option<Item>>;

    /// All items, visible or not
    async fn list_items(&self) -> MarketResult<Vec<Item>>;

    /// Atomically decrement `available_quantity` by `quantity` if at least
    /// that many units remain. Returns `false` with no effect otherwise.
    async fn decrement_if_available(&self, item_id: &str, quantity: u32) -> MarketResult<bool>;

    /// Return units to stock (saga compensation)
    async fn increment(&self, item_id: &str, quantity: u32) -> MarketResult<()>;
}

/// Type alias for a shared stock repository (dynamic dispatch)
pub type BoxedStockRepository = Arc<dyn StockRepository>;

/// One per-item decrement requested by an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub item_id: String,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

#[derive(Clone)]
pub struct StockLedger {
    repo: BoxedStockRepository,
}

impl StockLedger {
    pub fn new(repo: BoxedStockRepository) -> Self {
        Self { repo }
    }

    /// Resolve an item or fail with `ItemNotFound`
    pub async fn item(&self, item_id: &str) -> MarketResult<Item> {
        self.repo
            .get_item(item_id)
            .await?
            .ok_or_else(|| MarketError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    /// Items buyers may browse
    pub async fn visible_items(&self) -> MarketResult<Vec<Item>> {
        let mut items: Vec<Item> = self
            .repo
            .list_items()
            .await?
            .into_iter()
            .filter(|item| item.visible)
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    pub async fn get_available(&self, item_id: &str) -> MarketResult<u32> {
        Ok(self.item(item_id).await?.available_quantity)
    }

    /// Check that `quantity` units could currently be sold.
    ///
    /// Advisory only: nothing is held, and the answer may be stale by the
    /// time the buyer checks out.
    pub async fn try_reserve(&self, item_id: &str, quantity: u32) -> MarketResult<()> {
        let available = self.get_available(item_id).await?;
        if quantity > available {
            debug!(item_id, quantity, available, "reservation headroom rejected");
            return Err(MarketError::OutOfStock {
                item_id: item_id.to_string(),
                max: available,
            });
        }
        Ok(())
    }

    /// Compare-and-decrement a single item. Never clamps.
    #[instrument(skip(self))]
    pub async fn commit_decrement(&self, item_id: &str, quantity: u32) -> MarketResult<()> {
        if quantity == 0 {
            return Err(MarketError::InvalidRequest(format!(
                "Cannot commit zero units of {}",
                item_id
            )));
        }

        if self.repo.decrement_if_available(item_id, quantity).await? {
            debug!("stock decremented");
            return Ok(());
        }

        let available = self.get_available(item_id).await?;
        Err(MarketError::InsufficientStock {
            item_id: item_id.to_string(),
            requested: quantity,
            available,
        })
    }

    /// Return previously committed units to stock
    pub async fn release(&self, item_id: &str, quantity: u32) -> MarketResult<()> {
        self.repo.increment(item_id, quantity).await
    }

    /// Decrement every line, or none.
    ///
    /// There is no multi-item transaction underneath: lines are committed one
    /// by one and, on the first failure, the lines already applied are
    /// released in reverse order before the original error is returned.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn commit_lines(&self, lines: &[StockLine]) -> MarketResult<()> {
        let mut applied: Vec<&StockLine> = Vec::with_capacity(lines.len());

        for line in lines {
            match self.commit_decrement(&line.item_id, line.quantity).await {
                Ok(()) => applied.push(line),
                Err(err) => {
                    warn!(
                        item_id = %line.item_id,
                        applied = applied.len(),
                        "stock commit failed, compensating: {}",
                        err
                    );
                    for done in applied.iter().rev() {
                        if let Err(comp_err) = self.release(&done.item_id, done.quantity).await {
                            error!(
                                item_id = %done.item_id,
                                quantity = done.quantity,
                                "compensating increment failed: {}",
                                comp_err
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }
}
