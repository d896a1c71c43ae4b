use agri_api::{create_router, AppConfig, AppState, ErrorResponse};
use agri_core::{
    signature, Currency, GatewayCallback, Item, ItemCatalog, MarketResult, PaymentGateway,
    PaymentIntent, Price,
};
use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const SECRET: &str = "api_test_secret";
const USER: HeaderName = HeaderName::from_static("x-user-id");

/// Gateway double that signs with a shared secret
#[derive(Default)]
struct StubGateway {
    issued: AtomicU32,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(&self, amount: Price, _receipt: &str) -> MarketResult<PaymentIntent> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent::new(format!("order_stub{}", n), amount))
    }

    fn verify_callback(&self, callback: &GatewayCallback) -> bool {
        signature::verify(
            SECRET,
            &callback.gateway_order_id,
            &callback.gateway_payment_id,
            &callback.signature,
        )
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

fn catalog() -> ItemCatalog {
    ItemCatalog::new()
        .with_item(
            Item::new("rice", "Basmati Rice", Price::new(50.0, Currency::INR), 5)
                .with_category("grains"),
        )
        .with_item(Item::new("mango", "Alphonso Mango", Price::new(30.0, Currency::INR), 1))
        .with_item(Item::new("saffron", "Saffron", Price::new(999.0, Currency::INR), 3).hidden())
}

fn server() -> (TestServer, AppState) {
    let state = AppState::with_gateway(
        AppConfig::default(),
        catalog(),
        Arc::new(StubGateway::default()),
    );
    let server = TestServer::new(create_router(state.clone())).unwrap();
    (server, state)
}

fn as_user(user: &'static str) -> HeaderValue {
    HeaderValue::from_static(user)
}

fn verify_body(order_id: &str, payment_id: &str, sig: &str) -> Value {
    json!({
        "gateway_order_id": order_id,
        "gateway_payment_id": payment_id,
        "signature": sig,
        "shipping_address": {
            "address": "12 Mill Road",
            "city": "Nashik",
            "phone": "9876543210"
        }
    })
}

#[tokio::test]
async fn test_health() {
    let (server, _) = server();
    let response = server.get("/health").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn test_catalog_lists_only_visible_items() {
    let (server, _) = server();
    let body: Value = server.get("/api/v1/items").await.json();

    let ids: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["mango", "rice"]);
}

#[tokio::test]
async fn test_cart_requires_user_header() {
    let (server, _) = server();

    let response = server.get("/api/v1/cart").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let err: ErrorResponse = response.json();
    assert!(!err.success);
    assert_eq!(err.reason, "Unauthorized");

    let response = server
        .post("/api/v1/cart/items/rice")
        .add_header(USER, as_user("   "))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_cart_shape() {
    let (server, _) = server();
    let response = server
        .get("/api/v1/cart")
        .add_header(USER, as_user("asha"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["items"], json!([]));
}

#[tokio::test]
async fn test_cart_add_step_set_and_remove() {
    let (server, _) = server();

    // Empty body adds one unit
    server
        .post("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .await
        .assert_status_ok();

    let cart: Value = server
        .post("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "step": 1 }))
        .await
        .json();
    assert_eq!(cart["items"][0]["quantity"], 2);
    assert_eq!(cart["subtotal"]["amount"], 10000);

    let cart: Value = server
        .post("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "step": -1 }))
        .await
        .json();
    assert_eq!(cart["items"][0]["quantity"], 1);

    let cart: Value = server
        .put("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "quantity": 5 }))
        .await
        .json();
    assert_eq!(cart["items"][0]["quantity"], 5);

    let cart: Value = server
        .delete("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .await
        .json();
    assert_eq!(cart["items"], json!([]));

    // Other buyers are unaffected
    let other: Value = server
        .get("/api/v1/cart")
        .add_header(USER, as_user("ravi"))
        .await
        .json();
    assert_eq!(other["items"], json!([]));
}

#[tokio::test]
async fn test_cart_rejections() {
    let (server, _) = server();

    let response = server
        .put("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "quantity": 6 }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let err: ErrorResponse = response.json();
    assert_eq!(err.reason, "OutOfStock");
    assert!(err.message.contains("Only 5 units"));

    let response = server
        .post("/api/v1/cart/items/saffron")
        .add_header(USER, as_user("asha"))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<ErrorResponse>().reason, "NotFound");

    let response = server
        .put("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "quantity": 2, "note": "extra" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ErrorResponse>().reason, "InvalidRequest");

    let response = server
        .post("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "step": 3 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_places_order_and_clears_cart() {
    let (server, state) = server();
    for _ in 0..2 {
        server
            .post("/api/v1/cart/items/rice")
            .add_header(USER, as_user("asha"))
            .await
            .assert_status_ok();
    }
    server
        .post("/api/v1/cart/items/mango")
        .add_header(USER, as_user("asha"))
        .await
        .assert_status_ok();

    let intent: Value = server
        .post("/api/v1/checkout/intent")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "amount": 130 }))
        .await
        .json();
    assert_eq!(intent["amount_paise"], 13000);
    assert!(intent.get("amount").is_none());
    assert_eq!(intent["currency"], "INR");
    let gateway_order_id = intent["intent_id"].as_str().unwrap().to_string();

    let sig = signature::sign(SECRET, &gateway_order_id, "pay_001");
    let response = server
        .post("/api/v1/checkout/verify")
        .add_header(USER, as_user("asha"))
        .json(&verify_body(&gateway_order_id, "pay_001", &sig))
        .await;
    response.assert_status_ok();
    let placed: Value = response.json();
    assert_eq!(placed["success"], true);
    let order_id = placed["order_id"].as_str().unwrap().to_string();

    // Stock moved, cart emptied
    assert_eq!(state.ledger.get_available("rice").await.unwrap(), 3);
    assert_eq!(state.ledger.get_available("mango").await.unwrap(), 0);
    let cart: Value = server
        .get("/api/v1/cart")
        .add_header(USER, as_user("asha"))
        .await
        .json();
    assert_eq!(cart["items"], json!([]));

    let orders: Value = server
        .get("/api/v1/orders")
        .add_header(USER, as_user("asha"))
        .await
        .json();
    assert_eq!(orders["orders"].as_array().unwrap().len(), 1);
    assert_eq!(orders["orders"][0]["id"], order_id.as_str());
    assert_eq!(orders["orders"][0]["total"]["amount"], 13000);
    assert_eq!(orders["orders"][0]["payment_status"], "Paid");

    // A replayed callback returns the same order
    let replay: Value = server
        .post("/api/v1/checkout/verify")
        .add_header(USER, as_user("asha"))
        .json(&verify_body(&gateway_order_id, "pay_001", &sig))
        .await
        .json();
    assert_eq!(replay["order_id"], order_id.as_str());
    assert_eq!(state.ledger.get_available("rice").await.unwrap(), 3);

    let theirs: Value = server
        .get("/api/v1/orders")
        .add_header(USER, as_user("ravi"))
        .await
        .json();
    assert_eq!(theirs["orders"], json!([]));
}

#[tokio::test]
async fn test_forged_signature_is_rejected() {
    let (server, state) = server();
    server
        .post("/api/v1/cart/items/rice")
        .add_header(USER, as_user("asha"))
        .await
        .assert_status_ok();

    let forged = signature::sign("not_the_secret", "order_x", "pay_x");
    let response = server
        .post("/api/v1/checkout/verify")
        .add_header(USER, as_user("asha"))
        .json(&verify_body("order_x", "pay_x", &forged))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let err: ErrorResponse = response.json();
    assert_eq!(err.reason, "SignatureMismatch");
    assert_eq!(err.message, "Payment could not be verified");

    assert_eq!(state.ledger.get_available("rice").await.unwrap(), 5);
    assert_eq!(state.incidents.incidents().await.len(), 1);
    let cart: Value = server
        .get("/api/v1/cart")
        .add_header(USER, as_user("asha"))
        .await
        .json();
    assert_eq!(cart["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn test_verify_with_empty_cart() {
    let (server, _) = server();
    let sig = signature::sign(SECRET, "order_e", "pay_e");

    let response = server
        .post("/api/v1/checkout/verify")
        .add_header(USER, as_user("asha"))
        .json(&verify_body("order_e", "pay_e", &sig))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ErrorResponse>().reason, "EmptyCart");
}

#[tokio::test]
async fn test_verify_requires_shipping_address() {
    let (server, _) = server();
    let sig = signature::sign(SECRET, "order_s", "pay_s");
    let mut body = verify_body("order_s", "pay_s", &sig);
    body["shipping_address"]["city"] = json!("  ");

    let response = server
        .post("/api/v1/checkout/verify")
        .add_header(USER, as_user("asha"))
        .json(&body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let err: ErrorResponse = response.json();
    assert_eq!(err.reason, "InvalidRequest");
    assert!(err.message.contains("city"));
}

#[tokio::test]
async fn test_intent_rejects_non_positive_amount() {
    let (server, _) = server();
    let response = server
        .post("/api/v1/checkout/intent")
        .add_header(USER, as_user("asha"))
        .json(&json!({ "amount": 0 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ErrorResponse>().reason, "InvalidRequest");
}
