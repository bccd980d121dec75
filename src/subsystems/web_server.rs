use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    routing::{get, post},
};
use futures::FutureExt;
use tokio::select;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    AppState,
    domain::cart::{
        apply_coupon_endpoint, cart_endpoint, checkout_endpoint, decrease_item_endpoint,
        end_session_endpoint, increase_item_endpoint, offered_coupon_endpoint,
        refresh_cart_endpoint, remove_item_endpoint, start_session_endpoint,
    },
    infra::ClientError,
};

pub struct WebServer {
    state: AppState,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route(
            "/sessions/{user_id}",
            post(start_session_endpoint).delete(end_session_endpoint),
        )
        .route("/sessions/{user_id}/cart", get(cart_endpoint))
        .route("/sessions/{user_id}/cart/refresh", post(refresh_cart_endpoint))
        .route("/sessions/{user_id}/items/increase", post(increase_item_endpoint))
        .route("/sessions/{user_id}/items/decrease", post(decrease_item_endpoint))
        .route("/sessions/{user_id}/items/remove", post(remove_item_endpoint))
        .route("/sessions/{user_id}/coupon", post(apply_coupon_endpoint))
        .route("/sessions/{user_id}/coupon/offered", get(offered_coupon_endpoint))
        .route("/sessions/{user_id}/checkout", post(checkout_endpoint))
        .route("/healthcheck", get(health_check_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[async_trait]
impl IntoSubsystem<anyhow::Error> for WebServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), anyhow::Error> {
        let address = self.state.settings.application.address();
        let socket_addr: SocketAddr = address.parse()
            .inspect_err(|e| error!("Could not parse server address {address}.\nCheck application host and port in configuration settings.\nFailed with {e}"))?;

        let router = router(self.state);

        let listener = tokio::net::TcpListener::bind(socket_addr)
            .await
            .inspect_err(|e| {
                error!("Could not bind socket address {socket_addr}. Failed with {e}")
            })?;

        info!("Web server starting on http://{socket_addr}");
        select!(
            result = axum::serve(listener, router.into_make_service()).into_future().map(|result| result.map_err(anyhow::Error::new)) => {
                error!("Web server completed with {result:?}");
            }
            _ = subsys.on_shutdown_requested() => {
                info!("Web server shutdown");
            }
        );
        Ok(())
    }
}

pub async fn health_check_endpoint(
    State(_app_state): State<AppState>,
) -> Result<Json<String>, ClientError> {
    Ok(Json("Ok".to_owned()))
}
