//! # Request Handlers
//!
//! Axum request handlers for the buyer API.
//! The caller's identity arrives in the `x-user-id` header, set by the
//! authentication layer in front of this service.

use crate::state::AppState;
use agri_core::{
    CartStep, CartView, GatewayCallback, Item, MarketError, Order, Price, ShippingAddress,
    VerifyPayment,
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Add-to-cart request. An empty body means a single increment.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddToCartRequest {
    #[serde(default)]
    pub step: CartStep,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

/// Create intent request
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIntentRequest {
    /// Amount the client intends to pay, in rupees
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    pub intent_id: String,
    /// Gateway amount in the smallest currency unit
    pub amount_paise: i64,
    pub currency: String,
}

/// Gateway callback relayed by the client, plus delivery details
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub reason: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the HTTP layer
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or blank x-user-id header")]
    Unauthenticated,

    #[error("invalid request body: {0}")]
    BadBody(String),

    #[error(transparent)]
    Market(#[from] MarketError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Unauthorized", self.to_string()),
            ),
            ApiError::BadBody(_) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("InvalidRequest", self.to_string()),
            ),
            ApiError::Market(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!("request failed: {}", err);
                } else if err.requires_review() {
                    warn!("request needs review: {}", err);
                }
                (status, ErrorResponse::new(err.reason(), err.user_message()))
            }
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Authenticated buyer, taken from the `x-user-id` header
#[derive(Debug, Clone)]
pub struct BuyerId(pub String);

impl<S> FromRequestParts<S> for BuyerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| BuyerId(v.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "agri-cart",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// List items buyers can see
#[instrument(skip(state))]
pub async fn list_items(State(state): State<AppState>) -> ApiResult<ItemsResponse> {
    let items = state.ledger.visible_items().await?;
    Ok(Json(ItemsResponse { items }))
}

#[instrument(skip(state))]
pub async fn get_cart(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
) -> ApiResult<CartView> {
    Ok(Json(state.carts.get_cart(&user_id).await?))
}

/// Add an item, or step its quantity by one
#[instrument(skip(state, body))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
    Path(item_id): Path<String>,
    body: Bytes,
) -> ApiResult<CartView> {
    let request: AddToCartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AddToCartRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadBody(e.to_string()))?
    };

    let cart = state
        .carts
        .add_or_increment(&user_id, &item_id, request.step)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip(state, payload))]
pub async fn set_cart_quantity(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
    Path(item_id): Path<String>,
    payload: Result<Json<SetQuantityRequest>, JsonRejection>,
) -> ApiResult<CartView> {
    let Json(request) = payload?;
    let cart = state
        .carts
        .set_quantity(&user_id, &item_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
    Path(item_id): Path<String>,
) -> ApiResult<CartView> {
    Ok(Json(state.carts.remove(&user_id, &item_id).await?))
}

/// Open a payment intent with the gateway
#[instrument(skip(state, payload))]
pub async fn create_intent(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
    payload: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> ApiResult<CreateIntentResponse> {
    let Json(request) = payload?;
    if !request.amount.is_finite() {
        return Err(ApiError::BadBody("amount must be a number".to_string()));
    }

    let currency = state.checkout.config().currency;
    let intent = state
        .checkout
        .create_intent(&user_id, Price::new(request.amount, currency))
        .await?;

    Ok(Json(CreateIntentResponse {
        currency: intent.currency().code().to_string(),
        amount_paise: intent.amount.amount,
        intent_id: intent.intent_id,
    }))
}

/// Verify the gateway callback and place the order
#[instrument(
    skip(state, payload),
    fields(gateway_order_id = tracing::field::Empty)
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> ApiResult<VerifyPaymentResponse> {
    let Json(request) = payload?;
    tracing::Span::current().record("gateway_order_id", request.gateway_order_id.as_str());

    let receipt = state
        .checkout
        .verify_and_commit(
            &user_id,
            VerifyPayment {
                callback: GatewayCallback::new(
                    request.gateway_order_id,
                    request.gateway_payment_id,
                    request.signature,
                ),
                shipping_address: request.shipping_address,
            },
        )
        .await?;

    info!(
        order_id = %receipt.order_id,
        total = %receipt.total.display(),
        replayed = receipt.replayed,
        "payment verified"
    );

    Ok(Json(VerifyPaymentResponse {
        success: true,
        order_id: receipt.order_id,
    }))
}

/// The caller's orders, newest first
#[instrument(skip(state))]
pub async fn list_orders(
    State(state): State<AppState>,
    BuyerId(user_id): BuyerId,
) -> ApiResult<OrdersResponse> {
    let orders = state.orders.list_for_user(&user_id).await?;
    Ok(Json(OrdersResponse { orders }))
}
