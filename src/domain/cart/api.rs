//! Web API through which the rendering layer reads a session's derived state and issues
//! commands against it.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;

use crate::infra::ClientError;

use super::{
    AppliedCoupon, CartView, Coupon, LineKey, OrderId, PaymentMethod, SessionHandle,
    SessionRegistry, ShippingAddress, UserId,
};

async fn running_session(
    sessions: &SessionRegistry,
    user_id: UserId,
) -> Result<SessionHandle, ClientError> {
    sessions
        .get(&user_id)
        .await
        .ok_or(ClientError::UnknownSession(user_id))
}

//------------------------- Session ----------------------------

pub async fn start_session_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
) -> Result<Json<CartView>, ClientError> {
    let session = sessions.start(&user_id).await?;
    Ok(Json(session.view()))
}

pub async fn end_session_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode, ClientError> {
    if sessions.end(&user_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ClientError::UnknownSession(user_id))
    }
}

//------------------------- Cart ----------------------------

pub async fn cart_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
) -> Result<Json<CartView>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    Ok(Json(session.view()))
}

pub async fn refresh_cart_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
) -> Result<Json<CartView>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    Ok(Json(session.refresh().await?))
}

pub async fn increase_item_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
    Json(key): Json<LineKey>,
) -> Result<Json<CartView>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    Ok(Json(session.increase(key).await?))
}

pub async fn decrease_item_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
    Json(key): Json<LineKey>,
) -> Result<Json<CartView>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    Ok(Json(session.decrease(key).await?))
}

pub async fn remove_item_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
    Json(key): Json<LineKey>,
) -> Result<Json<CartView>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    Ok(Json(session.remove(key).await?))
}

//------------------------- Coupon ----------------------------

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApplyCouponPayload {
    pub code: String,
}

pub async fn apply_coupon_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<ApplyCouponPayload>,
) -> Result<Json<AppliedCoupon>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    Ok(Json(session.apply_coupon(payload.code).await?))
}

/// The coupon to advertise, with what it would roughly take off the current subtotal.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OfferedCoupon {
    #[serde(flatten)]
    pub coupon: Coupon,
    pub preview_discount: Decimal,
}

pub async fn offered_coupon_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Option<OfferedCoupon>>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    let subtotal = session.view().subtotal;
    let offered = session.offered_coupon().await?.map(|coupon| OfferedCoupon {
        preview_discount: coupon.preview_discount(subtotal),
        coupon,
    });
    Ok(Json(offered))
}

//------------------------- Checkout ----------------------------

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckoutPayload {
    pub shipping: Option<ShippingAddress>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
}

pub async fn checkout_endpoint(
    State(sessions): State<SessionRegistry>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Json<CheckoutResponse>, ClientError> {
    let session = running_session(&sessions, user_id).await?;
    let order_id = session
        .submit_order(payload.shipping, payload.payment_method)
        .await?;
    Ok(Json(CheckoutResponse { order_id }))
}
