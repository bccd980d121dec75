use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;
use serial_test::serial;

use crate::test_utils::{Upstream, UpstreamLine, money, new_client, start_test_server};

#[tokio::test]
#[serial]
async fn applied_coupon_reduces_the_final_total() {
    let upstream = Upstream::with_cart("frank", vec![UpstreamLine::new("A", Decimal::ONE_HUNDRED, 1)]);
    let (_, app_state) = start_test_server(upstream).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/frank", json!({})).await.unwrap();

    let res = client
        .do_post("/sessions/frank/coupon", json!({ "code": " SAVE10 " }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let applied = res.json_body().unwrap();
    assert_eq!(applied["code"], "SAVE10");
    assert_eq!(money(&applied["discount_amount"]), Decimal::TEN);

    let view = client.do_get("/sessions/frank/cart").await.unwrap().json_body().unwrap();
    assert_eq!(money(&view["final_total"]), Decimal::from(90));
}

#[tokio::test]
#[serial]
async fn rejected_coupon_is_reported_and_cleared() {
    let upstream = Upstream::with_cart("grace", vec![UpstreamLine::new("A", Decimal::ONE_HUNDRED, 1)]);
    let (_, app_state) = start_test_server(upstream).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/grace", json!({})).await.unwrap();
    client
        .do_post("/sessions/grace/coupon", json!({ "code": "SAVE10" }))
        .await
        .unwrap();

    let res = client
        .do_post("/sessions/grace/coupon", json!({ "code": "NOPE" }))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(res.json_body().unwrap()["message"], "Unknown coupon");
    let view = client.do_get("/sessions/grace/cart").await.unwrap().json_body().unwrap();
    assert!(view["applied_coupon"].is_null());
    assert_eq!(money(&view["final_total"]), Decimal::ONE_HUNDRED);
}

#[tokio::test]
#[serial]
async fn blank_code_and_empty_cart_are_refused_locally() {
    let (_, app_state) = start_test_server(Upstream::default()).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/heidi", json!({})).await.unwrap();

    let res = client
        .do_post("/sessions/heidi/coupon", json!({ "code": "   " }))
        .await
        .unwrap();
    assert_eq!(res.json_body().unwrap()["message"], "Precondition failed: missing-code");

    let res = client
        .do_post("/sessions/heidi/coupon", json!({ "code": "SAVE10" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json_body().unwrap()["message"], "Precondition failed: empty-cart");
}

#[tokio::test]
#[serial]
async fn newest_valid_coupon_is_offered() {
    let upstream = Upstream::with_cart("ivan", vec![UpstreamLine::new("A", Decimal::from(80), 1)]);
    let (_, app_state) = start_test_server(upstream).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/ivan", json!({})).await.unwrap();

    let offered = client
        .do_get("/sessions/ivan/coupon/offered")
        .await
        .unwrap()
        .json_body()
        .unwrap();

    assert_eq!(offered["code"], "TENPERCENT");
    assert_eq!(money(&offered["preview_discount"]), Decimal::from(8));
}
