use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::domain::cart::{CartError, SessionError, UserId};

#[derive(Debug)]
pub enum ClientError {
    Domain(CartError),
    UnknownSession(UserId),
    Payload(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message) = match self {
            ClientError::Domain(cart_error) => {
                let status = match cart_error {
                    CartError::PreconditionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    CartError::RemoteRejected(_) => StatusCode::CONFLICT,
                    CartError::TransportFailed(_) => StatusCode::BAD_GATEWAY,
                };
                (status, cart_error.to_string())
            }
            ClientError::UnknownSession(user_id) => (
                StatusCode::NOT_FOUND,
                format!("No cart session is running for user {user_id}."),
            ),
            ClientError::Payload(message) => (StatusCode::BAD_REQUEST, message),
            ClientError::Internal(e) => {
                error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Please ask your system administrator to check the logs.".to_owned(),
                )
            }
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<CartError> for ClientError {
    fn from(cart_error: CartError) -> Self {
        ClientError::Domain(cart_error)
    }
}

impl From<SessionError> for ClientError {
    fn from(session_error: SessionError) -> Self {
        match session_error {
            SessionError::Cart(cart_error) => ClientError::Domain(cart_error),
            SessionError::Ended(user_id) => ClientError::UnknownSession(user_id),
        }
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(value: anyhow::Error) -> Self {
        ClientError::Internal(value)
    }
}
