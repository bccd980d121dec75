use strum_macros::Display;

use super::RemoteError;

/// Why a command was refused before anything was sent over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Precondition {
    EmptyCart,
    MissingCode,
    NoAddress,
    NoPaymentMethod,
    AlreadySubmitting,
    UnknownItem,
    /// The cart changed while a coupon was being redeemed against it.
    CartChanged,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CartError {
    #[error("Precondition failed: {0}")]
    PreconditionFailed(Precondition),
    #[error("{0}")]
    RemoteRejected(String),
    #[error("Could not reach the store: {0}")]
    TransportFailed(String),
}

pub const GENERIC_REJECTION: &str = "The request was declined.";
pub const SUBMISSION_FAILED: &str = "Order submission failed.";

impl From<Precondition> for CartError {
    fn from(precondition: Precondition) -> Self {
        CartError::PreconditionFailed(precondition)
    }
}

impl From<RemoteError> for CartError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Rejected(reason) => {
                CartError::RemoteRejected(reason.unwrap_or_else(|| GENERIC_REJECTION.to_owned()))
            }
            RemoteError::Transport(reason) => CartError::TransportFailed(reason),
        }
    }
}
