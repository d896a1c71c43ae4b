//! # agri-api
//!
//! HTTP API layer for agri-cart.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for the catalog, carts, checkout and order history
//! - Application config and component wiring
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/items` | Visible catalog |
//! | GET | `/api/v1/cart` | Caller's cart |
//! | POST | `/api/v1/cart/items/{item_id}` | Add or step quantity |
//! | PUT | `/api/v1/cart/items/{item_id}` | Set quantity |
//! | DELETE | `/api/v1/cart/items/{item_id}` | Remove line |
//! | POST | `/api/v1/checkout/intent` | Create payment intent |
//! | POST | `/api/v1/checkout/verify` | Verify payment, place order |
//! | GET | `/api/v1/orders` | Caller's orders |
//!
//! Every `/api/v1` route except `/items` requires the `x-user-id` header.

pub mod handlers;
pub mod routes;
pub mod state;

pub use handlers::{ApiError, ErrorResponse, USER_ID_HEADER};
pub use routes::create_router;
pub use state::{AppConfig, AppState, LogFormat};
