//! Checkout orchestration.
//!
//! `Reviewing -> Submitting -> Confirmed`, or back to `Reviewing` when the order collaborator
//! refuses. Only one submission may be in flight at a time.

use rust_decimal::Decimal;
use tracing::{error, info};

use super::{
    AppliedCoupon, CartError, CartStore, DraftId, LineItem, OrderId, OrderReceipt, Precondition,
    RemoteError, errors::SUBMISSION_FAILED,
};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    Reviewing,
    Submitting { draft_id: DraftId },
    Confirmed { order_id: OrderId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct AddressForm {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl AddressForm {
    pub fn is_complete(&self) -> bool {
        [
            &self.full_name,
            &self.line1,
            &self.city,
            &self.postal_code,
            &self.country,
            &self.phone,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShippingAddress {
    Saved { address_id: String },
    New(AddressForm),
}

impl ShippingAddress {
    fn is_usable(&self) -> bool {
        match self {
            ShippingAddress::Saved { address_id } => !address_id.trim().is_empty(),
            ShippingAddress::New(form) => form.is_complete(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    pub fn new(method: impl Into<String>) -> Self {
        Self(method.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything the order collaborator needs to place an order. Assembled at submission time
/// and never kept afterwards.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OrderDraft {
    pub draft_id: DraftId,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub coupon_code: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

impl OrderDraft {
    pub fn total(&self) -> Decimal {
        (self.subtotal - self.discount_amount).max(Decimal::ZERO)
    }
}

/// `subtotal` minus the coupon's discount, never below zero.
pub fn final_total(subtotal: Decimal, coupon: Option<&AppliedCoupon>) -> Decimal {
    let discount = coupon.map_or(Decimal::ZERO, |coupon| coupon.discount_amount);
    (subtotal - discount).max(Decimal::ZERO)
}

#[derive(Debug)]
pub struct Checkout {
    state: CheckoutState,
    last_failure: Option<String>,
}

impl Default for Checkout {
    fn default() -> Self {
        Self {
            state: CheckoutState::Reviewing,
            last_failure: None,
        }
    }
}

impl Checkout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, CheckoutState::Submitting { .. })
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Validates the preconditions and assembles the draft to submit. On success the
    /// checkout is `Submitting` until [`Checkout::settle`] is called.
    ///
    /// A coupon whose discount was computed against a different subtotal is dropped here and
    /// never sent.
    pub fn begin(
        &mut self,
        store: &mut CartStore,
        shipping_address: Option<ShippingAddress>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<OrderDraft, CartError> {
        if self.is_submitting() {
            return Err(Precondition::AlreadySubmitting.into());
        }
        if store.is_empty() {
            return Err(Precondition::EmptyCart.into());
        }
        let shipping_address = shipping_address
            .filter(ShippingAddress::is_usable)
            .ok_or(CartError::PreconditionFailed(Precondition::NoAddress))?;
        let payment_method = payment_method
            .filter(|method| !method.as_str().trim().is_empty())
            .ok_or(CartError::PreconditionFailed(Precondition::NoPaymentMethod))?;

        let subtotal = store.totals().subtotal;
        if store
            .applied_coupon()
            .is_some_and(|coupon| !coupon.applies_to(subtotal))
        {
            if let Some(stale) = store.clear_coupon() {
                info!(
                    "Dropping coupon {}: computed against {} but the cart is now {subtotal}.",
                    stale.code, stale.subtotal_basis
                );
            }
        }
        let coupon = store.applied_coupon();

        let draft = OrderDraft {
            draft_id: DraftId::new(),
            items: store.items().to_vec(),
            subtotal,
            discount_amount: coupon.map_or(Decimal::ZERO, |coupon| coupon.discount_amount),
            coupon_code: coupon.map(|coupon| coupon.code.clone()),
            shipping_address,
            payment_method,
        };

        info!("Submitting order draft {} for {}.", draft.draft_id, draft.total());
        self.state = CheckoutState::Submitting {
            draft_id: draft.draft_id,
        };
        self.last_failure = None;
        Ok(draft)
    }

    /// Records the order collaborator's answer. Success empties the cart; failure leaves the
    /// cart and coupon exactly as they were.
    pub fn settle(
        &mut self,
        store: &mut CartStore,
        result: Result<OrderReceipt, RemoteError>,
    ) -> Result<OrderId, CartError> {
        let CheckoutState::Submitting { draft_id } = self.state.clone() else {
            error!("Received an order receipt while not submitting, ignoring it.");
            return Err(CartError::RemoteRejected(SUBMISSION_FAILED.to_owned()));
        };

        let outcome = match result {
            Ok(receipt) if receipt.success => Ok(receipt.order_id),
            Ok(receipt) => Err(CartError::RemoteRejected(
                receipt.message.unwrap_or_else(|| SUBMISSION_FAILED.to_owned()),
            )),
            Err(RemoteError::Rejected(reason)) => Err(CartError::RemoteRejected(
                reason.unwrap_or_else(|| SUBMISSION_FAILED.to_owned()),
            )),
            Err(RemoteError::Transport(reason)) => Err(CartError::TransportFailed(reason)),
        };

        match outcome {
            Ok(order_id) => {
                info!("Order draft {draft_id} confirmed as order {order_id}.");
                store.clear();
                store.clear_coupon();
                self.state = CheckoutState::Confirmed {
                    order_id: order_id.clone(),
                };
                Ok(order_id)
            }
            Err(error) => {
                error!("Order draft {draft_id} failed: {error}");
                self.state = CheckoutState::Reviewing;
                self.last_failure = Some(error.to_string());
                Err(error)
            }
        }
    }
}

//-------------------------- Tests -------------------------------
