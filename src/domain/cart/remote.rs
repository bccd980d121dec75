//! Contracts of the collaborators that own the authoritative cart, the coupon book and order
//! intake. This crate only ever reads from them or asks them to change something.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{Coupon, LineKey, OrderDraft, OrderId, RawCartLine, UserId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    /// The collaborator understood the request and declined it.
    #[error("rejected: {}", .0.as_deref().unwrap_or("no reason given"))]
    Rejected(Option<String>),
    /// The request never produced an answer we could interpret.
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServerCart {
    #[serde(default)]
    pub items: Vec<RawCartLine>,
}

/// The server's answer to a quantity change. A quantity of zero means the server no longer
/// holds the item.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QuantityConfirmation {
    pub item: RawCartLine,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Redemption {
    #[serde(alias = "discountAmount")]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OrderReceipt {
    #[serde(alias = "orderId")]
    pub order_id: OrderId,
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait RemoteCart: Send + Sync {
    async fn fetch_cart(&self) -> Result<ServerCart, RemoteError>;

    async fn mutate_quantity(
        &self,
        key: &LineKey,
        quantity: u32,
    ) -> Result<QuantityConfirmation, RemoteError>;

    async fn remove_item(&self, key: &LineKey) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait RemoteCoupons: Send + Sync {
    async fn list_active_coupons(&self) -> Result<Vec<Coupon>, RemoteError>;

    async fn redeem_coupon(
        &self,
        code: &str,
        user_id: &UserId,
        cart_total: Decimal,
    ) -> Result<Redemption, RemoteError>;
}

#[async_trait]
pub trait RemoteOrders: Send + Sync {
    async fn submit_order(&self, draft: &OrderDraft) -> Result<OrderReceipt, RemoteError>;
}

/// The collaborators one cart session talks to.
#[derive(Clone)]
pub struct Remotes {
    pub cart: Arc<dyn RemoteCart>,
    pub coupons: Arc<dyn RemoteCoupons>,
    pub orders: Arc<dyn RemoteOrders>,
}

impl Remotes {
    /// Uses one value for all three collaborators.
    pub fn shared<R>(remote: Arc<R>) -> Self
    where
        R: RemoteCart + RemoteCoupons + RemoteOrders + 'static,
    {
        Self {
            cart: remote.clone(),
            coupons: remote.clone(),
            orders: remote,
        }
    }
}

impl std::fmt::Debug for Remotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remotes").finish_non_exhaustive()
    }
}

/// Hands out the collaborators for a given user's session.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, user_id: &UserId) -> Remotes;
}
