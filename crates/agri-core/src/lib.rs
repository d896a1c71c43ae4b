//! # agri-core
//!
//! Cart, stock and checkout core for the agri-cart marketplace.
//!
//! This crate provides:
//! - `StockLedger` for per-item available quantity with atomic compare-and-decrement
//! - `CartStore` for per-user carts validated against live stock
//! - `CheckoutOrchestrator`, the payment-settlement state machine
//! - `PaymentGateway` and `OrderRepository` ports for external collaborators
//! - In-memory adapters for every persistence port
//! - `MarketError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use agri_core::{CartStep, CheckoutOrchestrator, VerifyPayment};
//!
//! // Buyer clicks "add to cart" twice
//! carts.add_or_increment("user-1", "basmati-rice", CartStep::Increment).await?;
//! carts.add_or_increment("user-1", "basmati-rice", CartStep::Increment).await?;
//!
//! // Client opens the gateway widget with this intent
//! let intent = checkout.create_intent("user-1", declared).await?;
//!
//! // Gateway callback relayed by the client
//! let receipt = checkout.verify_and_commit("user-1", VerifyPayment { callback, shipping_address }).await?;
//! println!("order {}", receipt.order_id);
//! ```

pub mod cart;
pub mod checkout;
pub mod error;
pub mod gateway;
pub mod incident;
pub mod item;
pub mod ledger;
pub mod memory;
pub mod order;
pub mod signature;

// Re-exports for convenience
pub use cart::{
    BoxedCartRepository, Cart, CartHold, CartLine, CartLineView, CartRepository, CartStep,
    CartStore, CartView,
};
pub use checkout::{
    CheckoutConfig, CheckoutOrchestrator, CheckoutReceipt, CheckoutState, FailureReason,
    VerifyPayment,
};
pub use error::{MarketError, MarketResult};
pub use gateway::{BoxedPaymentGateway, GatewayCallback, PaymentGateway};
pub use incident::{BoxedIncidentSink, Incident, IncidentKind, IncidentSink};
pub use item::{Currency, Item, ItemCatalog, Price};
pub use ledger::{BoxedStockRepository, StockLedger, StockLine, StockRepository};
pub use memory::{
    InMemoryCartRepository, InMemoryIncidentSink, InMemoryOrderRepository,
    InMemoryStockRepository,
};
pub use order::{
    BoxedOrderRepository, InsertOutcome, Order, OrderLine, OrderRepository, PaymentIntent,
    PaymentStatus, ReconciliationFlag, ShippingAddress,
};
