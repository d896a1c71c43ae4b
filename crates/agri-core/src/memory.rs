//! # In-Memory Adapters
//!
//! Thread-safe, process-local implementations of the persistence ports.
//! Each store wraps its data in `Arc<RwLock<..>>` so clones share state.

use crate::cart::{Cart, CartRepository};
use crate::error::{MarketError, MarketResult};
use crate::incident::{Incident, IncidentSink};
use crate::item::{Item, ItemCatalog};
use crate::ledger::StockRepository;
use crate::order::{InsertOutcome, Order, OrderRepository, ReconciliationFlag};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Item stock held in memory.
///
/// `decrement_if_available` checks and writes under a single write lock,
/// which is what makes it a compare-and-decrement.
#[derive(Default, Clone)]
pub struct InMemoryStockRepository {
    items: Arc<RwLock<HashMap<String, Item>>>,
}

impl InMemoryStockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let items = items.into_iter().map(|i| (i.id.clone(), i)).collect();
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    pub fn from_catalog(catalog: &ItemCatalog) -> Self {
        Self::with_items(catalog.items.iter().cloned())
    }

    /// Drop an item from the catalog
    #[cfg(test)]
    pub(crate) async fn delist(&self, item_id: &str) -> Option<Item> {
        self.items.write().await.remove(item_id)
    }
}

#[async_trait]
impl StockRepository for InMemoryStockRepository {
    async fn get_item(&self, item_id: &str) -> MarketResult<Option<Item>> {
        Ok(self.items.read().await.get(item_id).cloned())
    }

    async fn list_items(&self) -> MarketResult<Vec<Item>> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn decrement_if_available(&self, item_id: &str, quantity: u32) -> MarketResult<bool> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(item_id)
            .ok_or_else(|| MarketError::ItemNotFound {
                item_id: item_id.to_string(),
            })?;

        if item.available_quantity < quantity {
            return Ok(false);
        }
        item.available_quantity -= quantity;
        Ok(true)
    }

    async fn increment(&self, item_id: &str, quantity: u32) -> MarketResult<()> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(item_id)
            .ok_or_else(|| MarketError::ItemNotFound {
                item_id: item_id.to_string(),
            })?;
        item.available_quantity = item.available_quantity.saturating_add(quantity);
        Ok(())
    }
}

/// Carts keyed by user id
#[derive(Default, Clone)]
pub struct InMemoryCartRepository {
    carts: Arc<RwLock<HashMap<String, Cart>>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn load(&self, user_id: &str) -> MarketResult<Option<Cart>> {
        Ok(self.carts.read().await.get(user_id).cloned())
    }

    async fn save(&self, cart: Cart) -> MarketResult<()> {
        self.carts.write().await.insert(cart.user_id.clone(), cart);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> MarketResult<()> {
        self.carts.write().await.remove(user_id);
        Ok(())
    }
}

#[derive(Default)]
struct OrderTable {
    by_id: HashMap<String, Order>,
    by_payment: HashMap<String, String>,
}

/// Orders with a unique index on the gateway payment id
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.by_id.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> MarketResult<InsertOutcome> {
        let mut table = self.table.write().await;

        if let Some(existing_id) = table.by_payment.get(&order.gateway_payment_id) {
            let existing = table.by_id.get(existing_id).cloned().ok_or_else(|| {
                MarketError::Internal(format!("dangling payment index for {}", existing_id))
            })?;
            return Ok(InsertOutcome::Existing(existing));
        }

        table
            .by_payment
            .insert(order.gateway_payment_id.clone(), order.id.clone());
        table.by_id.insert(order.id.clone(), order.clone());
        Ok(InsertOutcome::Inserted(order))
    }

    async fn get(&self, order_id: &str) -> MarketResult<Option<Order>> {
        Ok(self.table.read().await.by_id.get(order_id).cloned())
    }

    async fn find_by_gateway_payment(
        &self,
        gateway_payment_id: &str,
    ) -> MarketResult<Option<Order>> {
        let table = self.table.read().await;
        Ok(table
            .by_payment
            .get(gateway_payment_id)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> MarketResult<Vec<Order>> {
        let table = self.table.read().await;
        let mut orders: Vec<Order> = table
            .by_id
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn flag_for_reconciliation(
        &self,
        order_id: &str,
        flag: ReconciliationFlag,
    ) -> MarketResult<()> {
        let mut table = self.table.write().await;
        let order = table
            .by_id
            .get_mut(order_id)
            .ok_or_else(|| MarketError::Internal(format!("order {} not found", order_id)))?;

        order.reconciliation.push(flag);
        Ok(())
    }
}

/// Incidents kept in memory for inspection
#[derive(Default, Clone)]
pub struct InMemoryIncidentSink {
    incidents: Arc<RwLock<Vec<Incident>>>,
}

impl InMemoryIncidentSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn incidents(&self) -> Vec<Incident> {
        self.incidents.read().await.clone()
    }
}

#[async_trait]
impl IncidentSink for InMemoryIncidentSink {
    async fn record(&self, incident: Incident) {
        self.incidents.write().await.push(incident);
    }
}
