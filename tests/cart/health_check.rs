use axum::http::StatusCode;
use serial_test::serial;

use crate::test_utils::{Upstream, new_client, start_test_server};

#[tokio::test]
#[serial]
async fn the_webserver_responds_to_a_simple_get_request() {
    let (_, app_state) = start_test_server(Upstream::default()).await;

    let client = new_client(&app_state);
    let res = client
        .do_get("/healthcheck")
        .await
        .expect("Health check should succeed.");

    assert_eq!(res.status(), StatusCode::OK);
}
