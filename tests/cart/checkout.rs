use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;
use serial_test::serial;

use crate::test_utils::{Upstream, UpstreamLine, money, new_client, start_test_server};

fn saved_address() -> serde_json::Value {
    json!({ "kind": "saved", "address_id": "home" })
}

#[tokio::test]
#[serial]
async fn missing_details_are_refused_before_submitting() {
    let upstream = Upstream::with_cart("judy", vec![UpstreamLine::new("A", Decimal::TEN, 1)]);
    let (_, app_state) = start_test_server(upstream.clone()).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/judy", json!({})).await.unwrap();

    let res = client
        .do_post("/sessions/judy/checkout", json!({ "payment_method": "card" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json_body().unwrap()["message"], "Precondition failed: no-address");

    let res = client
        .do_post("/sessions/judy/checkout", json!({ "shipping": saved_address() }))
        .await
        .unwrap();
    assert_eq!(res.json_body().unwrap()["message"], "Precondition failed: no-payment-method");

    assert!(upstream.orders().is_empty());
}

#[tokio::test]
#[serial]
async fn successful_checkout_clears_the_cart() {
    let upstream = Upstream::with_cart(
        "ken",
        vec![
            UpstreamLine::new("A", Decimal::from(60), 1),
            UpstreamLine::new("B", Decimal::from(20), 2),
        ],
    );
    let (_, app_state) = start_test_server(upstream.clone()).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/ken", json!({})).await.unwrap();
    client
        .do_post("/sessions/ken/coupon", json!({ "code": "SAVE10" }))
        .await
        .unwrap();

    let res = client
        .do_post(
            "/sessions/ken/checkout",
            json!({ "shipping": saved_address(), "payment_method": "card" }),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json_body().unwrap()["order_id"], "order-1");

    let orders = upstream.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(money(&orders[0]["subtotal"]), Decimal::ONE_HUNDRED);
    assert_eq!(money(&orders[0]["discount_amount"]), Decimal::TEN);
    assert_eq!(orders[0]["coupon_code"], "SAVE10");

    let view = client.do_get("/sessions/ken/cart").await.unwrap().json_body().unwrap();
    assert_eq!(view["total_items"], 0);
    assert!(view["applied_coupon"].is_null());
    assert_eq!(view["checkout_state"]["state"], "confirmed");
}

#[tokio::test]
#[serial]
async fn declined_order_leaves_the_cart_alone() {
    let upstream = Upstream::with_cart("lena", vec![UpstreamLine::new("A", Decimal::TEN, 3)]);
    let (_, app_state) = start_test_server(upstream).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/lena", json!({})).await.unwrap();

    let res = client
        .do_post(
            "/sessions/lena/checkout",
            json!({ "shipping": saved_address(), "payment_method": "declined-card" }),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(res.json_body().unwrap()["message"], "Payment declined");
    let view = client.do_get("/sessions/lena/cart").await.unwrap().json_body().unwrap();
    assert_eq!(view["total_items"], 3);
    assert_eq!(view["checkout_state"]["state"], "reviewing");
}
