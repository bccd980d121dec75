use axum::http::StatusCode;
use cart_sync::domain::fake::Price;
use fake::Fake;
use rust_decimal::Decimal;
use serde_json::json;
use serial_test::serial;

use crate::test_utils::{Upstream, UpstreamLine, money, new_client, start_test_server};

#[tokio::test]
#[serial]
async fn starting_a_session_hydrates_the_cart() {
    let a_price: Decimal = Price.fake();
    let upstream = Upstream::with_cart(
        "alice",
        vec![
            UpstreamLine::new("A", a_price, 2),
            UpstreamLine::new("B", Decimal::new(500, 2), 1),
        ],
    );
    let (_, app_state) = start_test_server(upstream).await;
    let client = new_client(&app_state);

    let res = client
        .do_post("/sessions/alice", json!({}))
        .await
        .expect("Session start should respond.");
    assert_eq!(res.status(), StatusCode::OK);

    let view = res.json_body().expect("Expected a cart view.");
    assert_eq!(view["total_items"], 3);
    assert_eq!(
        money(&view["subtotal"]),
        a_price * Decimal::TWO + Decimal::new(500, 2)
    );
    assert_eq!(view["items"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
#[serial]
async fn quantity_changes_reach_the_server_cart() {
    let upstream = Upstream::with_cart("bob", vec![UpstreamLine::new("A", Decimal::TEN, 1)]);
    let (_, app_state) = start_test_server(upstream.clone()).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/bob", json!({})).await.unwrap();

    let res = client
        .do_post("/sessions/bob/items/increase", json!({ "product_id": "A" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(upstream.cart("bob")[0].quantity, 2);

    let res = client
        .do_post("/sessions/bob/items/decrease", json!({ "product_id": "A", "variant_id": "default" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(upstream.cart("bob")[0].quantity, 1);

    // Already at the floor.
    let res = client
        .do_post("/sessions/bob/items/decrease", json!({ "product_id": "A" }))
        .await
        .unwrap();
    let view = res.json_body().unwrap();
    assert_eq!(view["items"][0]["quantity"], 1);

    let res = client
        .do_post("/sessions/bob/items/remove", json!({ "product_id": "A" }))
        .await
        .unwrap();
    let view = res.json_body().unwrap();
    assert_eq!(view["total_items"], 0);
    assert!(upstream.cart("bob").is_empty());
}

#[tokio::test]
#[serial]
async fn editing_an_item_not_in_the_cart_is_refused() {
    let upstream = Upstream::with_cart("carol", vec![UpstreamLine::new("A", Decimal::TEN, 1)]);
    let (_, app_state) = start_test_server(upstream).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/carol", json!({})).await.unwrap();

    let res = client
        .do_post("/sessions/carol/items/increase", json!({ "product_id": "Z" }))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json_body().unwrap();
    assert_eq!(body["message"], "Precondition failed: unknown-item");
}

#[tokio::test]
#[serial]
async fn refresh_picks_up_server_side_changes() {
    let upstream = Upstream::with_cart("dave", vec![UpstreamLine::new("A", Decimal::TEN, 1)]);
    let (_, app_state) = start_test_server(upstream.clone()).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/dave", json!({})).await.unwrap();

    upstream
        .state
        .lock()
        .unwrap()
        .carts
        .insert("dave".into(), vec![UpstreamLine::new("B", Decimal::ONE, 4)]);
    let res = client
        .do_post("/sessions/dave/cart/refresh", json!({}))
        .await
        .unwrap();

    let view = res.json_body().unwrap();
    assert_eq!(view["total_items"], 4);
    assert_eq!(view["items"][0]["product_id"], "B");
}

#[tokio::test]
#[serial]
async fn ended_sessions_are_not_found() {
    let (_, app_state) = start_test_server(Upstream::default()).await;
    let client = new_client(&app_state);
    client.do_post("/sessions/erin", json!({})).await.unwrap();

    let res = client.do_delete("/sessions/erin").await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.do_get("/sessions/erin/cart").await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
