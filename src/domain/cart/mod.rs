mod api;
mod checkout;
mod coupons;
mod errors;
mod ids;
mod line_item;
mod money;
mod registry;
mod remote;
mod session;
mod store;

pub use api::{
    ApplyCouponPayload, CheckoutPayload, CheckoutResponse, OfferedCoupon, apply_coupon_endpoint,
    cart_endpoint, checkout_endpoint, decrease_item_endpoint, end_session_endpoint,
    increase_item_endpoint, offered_coupon_endpoint, refresh_cart_endpoint, remove_item_endpoint,
    start_session_endpoint,
};
pub use checkout::{
    AddressForm, Checkout, CheckoutState, OrderDraft, PaymentMethod, ShippingAddress, final_total,
};
pub use coupons::{
    AppliedCoupon, Coupon, CouponKind, CouponRequest, prepare_redemption, select_offered_coupon,
    settle_redemption,
};
pub use errors::{CartError, GENERIC_REJECTION, Precondition, SUBMISSION_FAILED};
pub use ids::*;
pub use line_item::LineItem;
pub use money::{Aggregation, RawCartLine, VariantTotal, aggregate, round_money};
pub use registry::SessionRegistry;
pub use remote::{
    OrderReceipt, QuantityConfirmation, Redemption, RemoteCart, RemoteConnector, RemoteCoupons,
    RemoteError, RemoteOrders, Remotes, ServerCart,
};
pub use session::{CartView, SessionError, SessionHandle};
pub use store::{
    CartStore, DEFAULT_FLOOR, LineState, MutationKind, PendingMutation, Reconciliation,
};
