use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use cart_sync::{
    AppState, construct_app_state,
    infra::{USER_ID_HEADER, get_config_settings},
    start_server,
};
use jiff::{SignedDuration, Timestamp};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

/// A cart line as the fake upstream stores it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UpstreamLine {
    pub product_id: String,
    pub variant_id: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl UpstreamLine {
    pub fn new(product_id: &str, price: Decimal, quantity: u32) -> Self {
        Self {
            product_id: product_id.to_owned(),
            variant_id: "default".to_owned(),
            price,
            quantity,
        }
    }
}

#[derive(Debug, Default)]
pub struct UpstreamState {
    pub carts: HashMap<String, Vec<UpstreamLine>>,
    pub orders: Vec<Value>,
}

/// Plays the cart, coupon and order collaborators.
#[derive(Clone, Default)]
pub struct Upstream {
    pub state: Arc<Mutex<UpstreamState>>,
}

impl Upstream {
    pub fn with_cart(user_id: &str, lines: Vec<UpstreamLine>) -> Self {
        let upstream = Self::default();
        upstream
            .state
            .lock()
            .unwrap()
            .carts
            .insert(user_id.to_owned(), lines);
        upstream
    }

    pub fn cart(&self, user_id: &str) -> Vec<UpstreamLine> {
        self.state
            .lock()
            .unwrap()
            .carts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn orders(&self) -> Vec<Value> {
        self.state.lock().unwrap().orders.clone()
    }

    fn router(self) -> Router {
        Router::new()
            .route("/cart", get(fetch_cart))
            .route("/cart/items", put(set_quantity).delete(remove_item))
            .route("/coupons/active", get(active_coupons))
            .route("/coupons/redeem", post(redeem_coupon))
            .route("/orders", post(place_order))
            .with_state(self)
    }
}

fn user_of(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

fn rejected(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message })))
}

async fn fetch_cart(State(upstream): State<Upstream>, headers: HeaderMap) -> Json<Value> {
    Json(json!({ "items": upstream.cart(&user_of(&headers)) }))
}

async fn set_quantity(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut state = upstream.state.lock().unwrap();
    let cart = state.carts.entry(user_of(&headers)).or_default();
    let quantity = body["quantity"].as_u64().unwrap_or_default() as u32;
    let line = cart
        .iter_mut()
        .find(|line| line.product_id == body["product_id"] && line.variant_id == body["variant_id"])
        .ok_or_else(|| rejected("Item not in cart"))?;
    line.quantity = quantity;
    let line = line.clone();
    cart.retain(|line| line.quantity > 0);
    Ok(Json(json!({ "item": line, "quantity": quantity })))
}

async fn remove_item(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut state = upstream.state.lock().unwrap();
    let cart = state.carts.entry(user_of(&headers)).or_default();
    cart.retain(|line| {
        line.product_id != body["product_id"] || line.variant_id != body["variant_id"]
    });
    StatusCode::NO_CONTENT
}

async fn active_coupons() -> Json<Value> {
    let now = Timestamp::now();
    Json(json!([
        {
            "code": "SAVE10",
            "kind": "fixed",
            "value": "10",
            "valid_until": now + SignedDuration::from_hours(24),
            "created_at": now - SignedDuration::from_hours(2),
        },
        {
            "code": "TENPERCENT",
            "kind": "percentage",
            "value": "10",
            "valid_until": now + SignedDuration::from_hours(24),
            "created_at": now - SignedDuration::from_hours(1),
        },
        {
            "code": "EXPIRED",
            "kind": "fixed",
            "value": "50",
            "valid_until": now - SignedDuration::from_hours(1),
            "created_at": now,
        },
    ]))
}

async fn redeem_coupon(Json(body): Json<Value>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match body["code"].as_str() {
        Some("SAVE10") => Ok(Json(json!({ "discount_amount": "10" }))),
        _ => Err(rejected("Unknown coupon")),
    }
}

async fn place_order(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(draft): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if draft["payment_method"] == "declined-card" {
        return Err(rejected("Payment declined"));
    }
    let mut state = upstream.state.lock().unwrap();
    state.orders.push(draft);
    let order_id = format!("order-{}", state.orders.len());
    state.carts.remove(&user_of(&headers));
    Ok(Json(json!({ "order_id": order_id, "success": true })))
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Expected a free port.");
    listener
        .local_addr()
        .expect("Expected a local address.")
        .port()
}

/// Starts the fake upstream and the server pointed at it. Returns once the server answers.
pub async fn start_test_server(
    upstream: Upstream,
) -> (JoinHandle<Result<(), anyhow::Error>>, AppState) {
    let upstream_listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Expected upstream to bind.");
    let upstream_address = upstream_listener
        .local_addr()
        .expect("Expected upstream address.");
    tokio::spawn(async move { axum::serve(upstream_listener, upstream.router()).await });

    let mut settings = get_config_settings().expect("Could not read application configuration.");
    settings.application.port = free_port().await;
    settings.remote.base_url = format!("http://{upstream_address}");
    settings.remote.max_read_retries = 0;

    let app_state = construct_app_state(settings).expect("Expected AppState to be created.");
    let server_handle = tokio::task::spawn(start_server(app_state.clone()));

    let client = new_client(&app_state);
    for _ in 0..50 {
        if client.do_get("/healthcheck").await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    (server_handle, app_state)
}

pub fn new_client(app_state: &AppState) -> httpc_test::Client {
    let url = format!("http://{}", app_state.settings.application.address());
    httpc_test::new_client(url).expect("Expected client to be created.")
}

pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("Expected a decimal string."),
        other => other.to_string().parse().expect("Expected a decimal number."),
    }
}
