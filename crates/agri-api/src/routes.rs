//! # Routes
//!
//! Axum router configuration for the buyer API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - GET    /health
/// - GET    /api/v1/items
/// - GET    /api/v1/cart
/// - POST   /api/v1/cart/items/{item_id}   add or step by one
/// - PUT    /api/v1/cart/items/{item_id}   set quantity
/// - DELETE /api/v1/cart/items/{item_id}
/// - POST   /api/v1/checkout/intent
/// - POST   /api/v1/checkout/verify
/// - GET    /api/v1/orders
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cart_routes = Router::new().route(
        "/items/{item_id}",
        post(handlers::add_to_cart)
            .put(handlers::set_cart_quantity)
            .delete(handlers::remove_from_cart),
    );

    let checkout_routes = Router::new()
        .route("/intent", post(handlers::create_intent))
        .route("/verify", post(handlers::verify_payment));

    let api_routes = Router::new()
        .route("/items", get(handlers::list_items))
        .route("/orders", get(handlers::list_orders))
        .route("/cart", get(handlers::get_cart))
        .nest("/cart", cart_routes)
        .nest("/checkout", checkout_routes);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
