//! The cart, coupon and order collaborators reached over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::cart::{
    Coupon, LineKey, OrderDraft, OrderReceipt, QuantityConfirmation, Redemption, RemoteCart,
    RemoteConnector, RemoteCoupons, RemoteError, RemoteOrders, Remotes, ServerCart, UserId,
};

use super::RemoteSettings;

/// Header carrying the id of the user a request is made for.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Builds one [`HttpRemote`] per session, all sharing a connection pool.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    http: Client,
    settings: RemoteSettings,
}

impl HttpConnector {
    pub fn new(settings: RemoteSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self { http, settings })
    }
}

impl RemoteConnector for HttpConnector {
    fn connect(&self, user_id: &UserId) -> Remotes {
        Remotes::shared(Arc::new(HttpRemote {
            http: self.http.clone(),
            base_url: self.settings.base_url.trim_end_matches('/').to_owned(),
            user_id: user_id.clone(),
            max_read_retries: self.settings.max_read_retries,
        }))
    }
}

#[derive(Debug)]
pub struct HttpRemote {
    http: Client,
    base_url: String,
    user_id: UserId,
    max_read_retries: usize,
}

impl HttpRemote {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GETs `path`, retrying with exponential backoff while the failure is a transport one.
    async fn read<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        (|| async { self.try_read(path).await })
            .retry(ExponentialBuilder::default().with_max_times(self.max_read_retries))
            .when(|err| matches!(err, RemoteError::Transport(_)))
            .sleep(tokio::time::sleep)
            .notify(|err, dur| warn!("Retrying GET {path} for user {} after {dur:?} due to: {err}", self.user_id))
            .await
    }

    async fn try_read<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let response = self
            .http
            .get(self.url(path))
            .header(USER_ID_HEADER, self.user_id.as_str())
            .send()
            .await
            .map_err(transport)?;
        decode(checked(response).await?).await
    }
}

#[async_trait]
impl RemoteCart for HttpRemote {
    async fn fetch_cart(&self) -> Result<ServerCart, RemoteError> {
        self.read("/cart").await
    }

    async fn mutate_quantity(
        &self,
        key: &LineKey,
        quantity: u32,
    ) -> Result<QuantityConfirmation, RemoteError> {
        debug!("Setting {key} to {quantity} for user {}.", self.user_id);
        let response = self
            .http
            .put(self.url("/cart/items"))
            .header(USER_ID_HEADER, self.user_id.as_str())
            .json(&json!({
                "product_id": key.product_id,
                "variant_id": key.variant_or_default(),
                "quantity": quantity,
            }))
            .send()
            .await
            .map_err(transport)?;
        decode(checked(response).await?).await
    }

    async fn remove_item(&self, key: &LineKey) -> Result<(), RemoteError> {
        debug!("Removing {key} for user {}.", self.user_id);
        let response = self
            .http
            .delete(self.url("/cart/items"))
            .header(USER_ID_HEADER, self.user_id.as_str())
            .json(&json!({
                "product_id": key.product_id,
                "variant_id": key.variant_or_default(),
            }))
            .send()
            .await
            .map_err(transport)?;
        checked(response).await.map(|_| ())
    }
}

#[async_trait]
impl RemoteCoupons for HttpRemote {
    async fn list_active_coupons(&self) -> Result<Vec<Coupon>, RemoteError> {
        self.read("/coupons/active").await
    }

    async fn redeem_coupon(
        &self,
        code: &str,
        user_id: &UserId,
        cart_total: Decimal,
    ) -> Result<Redemption, RemoteError> {
        let response = self
            .http
            .post(self.url("/coupons/redeem"))
            .header(USER_ID_HEADER, self.user_id.as_str())
            .json(&json!({
                "code": code,
                "user_id": user_id,
                "cart_total": cart_total,
            }))
            .send()
            .await
            .map_err(transport)?;
        decode(checked(response).await?).await
    }
}

#[async_trait]
impl RemoteOrders for HttpRemote {
    async fn submit_order(&self, draft: &OrderDraft) -> Result<OrderReceipt, RemoteError> {
        let response = self
            .http
            .post(self.url("/orders"))
            .header(USER_ID_HEADER, self.user_id.as_str())
            .json(draft)
            .send()
            .await
            .map_err(transport)?;
        decode(checked(response).await?).await
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

/// Turns a 4xx into a rejection, carrying the collaborator's message if it sent one, and
/// anything else that is not a success into a transport failure.
async fn checked(response: Response) -> Result<Response, RemoteError> {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.is_client_error() {
        let reason = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message.or(body.error));
        return Err(RemoteError::Rejected(reason));
    }
    let text = response.text().await.unwrap_or_default();
    Err(RemoteError::Transport(format!(
        "request failed with status {status}: {text}"
    )))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::Transport(format!("unreadable response: {e}")))
}
