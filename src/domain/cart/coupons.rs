//! Coupon evaluation.
//!
//! The server decides what a coupon is worth. Locally we only pick which coupon to offer, check
//! that a redemption is worth asking for, and record (or drop) the result.

use jiff::Timestamp;
use rust_decimal::Decimal;
use tracing::info;

use super::{CartError, CartStore, Precondition, Redemption, RemoteError, money::round_money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Coupon {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    #[serde(alias = "validUntil")]
    pub valid_until: Timestamp,
    #[serde(alias = "createdAt")]
    pub created_at: Timestamp,
}

impl Coupon {
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.valid_until
    }

    /// What this coupon would take off `subtotal`. For display only; the amount actually
    /// charged always comes from the coupon collaborator.
    pub fn preview_discount(&self, subtotal: Decimal) -> Decimal {
        let discount = match self.kind {
            CouponKind::Percentage => round_money(subtotal * self.value / Decimal::ONE_HUNDRED),
            CouponKind::Fixed => self.value,
        };
        discount.max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO))
    }
}

/// The coupon currently applied to a cart. `subtotal_basis` is the subtotal the discount was
/// computed against.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_amount: Decimal,
    pub subtotal_basis: Decimal,
}

impl AppliedCoupon {
    /// Builds an applied coupon, clamping the discount into `0..=subtotal`.
    pub fn new(code: impl Into<String>, discount_amount: Decimal, subtotal_basis: Decimal) -> Self {
        Self {
            code: code.into(),
            discount_amount: discount_amount.max(Decimal::ZERO).min(subtotal_basis),
            subtotal_basis,
        }
    }

    pub fn applies_to(&self, subtotal: Decimal) -> bool {
        self.subtotal_basis == subtotal
    }
}

/// Picks the coupon to offer: the most recently created one. On equal creation times the one
/// listed last wins. Validity is the caller's business.
pub fn select_offered_coupon(coupons: &[Coupon]) -> Option<&Coupon> {
    coupons.iter().max_by_key(|coupon| coupon.created_at)
}

/// A redemption that passed the local checks and may be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponRequest {
    pub code: String,
    pub cart_total: Decimal,
}

/// Checks the local preconditions for redeeming `code` against the cart in `store`.
pub fn prepare_redemption(store: &CartStore, code: &str) -> Result<CouponRequest, CartError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Precondition::MissingCode.into());
    }
    let cart_total = store.totals().subtotal;
    if store.is_empty() || cart_total <= Decimal::ZERO {
        return Err(Precondition::EmptyCart.into());
    }
    Ok(CouponRequest {
        code: code.to_owned(),
        cart_total,
    })
}

/// Records the collaborator's verdict. A failed redemption always leaves the cart without a
/// coupon, even if a different one was applied before. So does a granted one when the cart
/// was emptied or changed while the answer was on its way.
pub fn settle_redemption(
    store: &mut CartStore,
    request: CouponRequest,
    result: Result<Redemption, RemoteError>,
) -> Result<AppliedCoupon, CartError> {
    match result {
        Ok(_) if store.is_empty() => {
            info!("Coupon {} came back for an empty cart, not applying it.", request.code);
            store.clear_coupon();
            Err(Precondition::EmptyCart.into())
        }
        Ok(_) if store.totals().subtotal != request.cart_total => {
            info!(
                "Coupon {} was redeemed against {}, the cart is now at {}. Not applying it.",
                request.code,
                request.cart_total,
                store.totals().subtotal
            );
            store.clear_coupon();
            Err(Precondition::CartChanged.into())
        }
        Ok(redemption) => {
            let applied =
                AppliedCoupon::new(request.code, redemption.discount_amount, request.cart_total);
            info!(
                "Coupon {} applied for {} against {}.",
                applied.code, applied.discount_amount, applied.subtotal_basis
            );
            store.apply_coupon(applied.clone());
            Ok(applied)
        }
        Err(error) => {
            info!("Coupon {} was not applied: {error}", request.code);
            store.clear_coupon();
            Err(error.into())
        }
    }
}

//-------------------------- Tests -------------------------------
