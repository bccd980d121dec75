use fake::{Dummy, Fake, rand::seq::IteratorRandom, uuid::UUIDv4};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Prices between 0.10 and 9.99 with two decimal places.
pub struct Price;

impl Dummy<Price> for Decimal {
    fn dummy_with_rng<R: fake::Rng + ?Sized>(_config: &Price, rng: &mut R) -> Self {
        let value = (10..1000).choose(rng).unwrap_or(100);
        Decimal::new(value, 2)
    }
}

/// Upper-case coupon codes, e.g. `SAVE-3F2A9C`.
pub struct CouponCode;

impl Dummy<CouponCode> for String {
    fn dummy_with_rng<R: fake::Rng + ?Sized>(_config: &CouponCode, rng: &mut R) -> Self {
        let uuid: Uuid = UUIDv4.fake_with_rng(rng);
        let suffix: String = uuid.simple().to_string().chars().take(6).collect();
        format!("SAVE-{}", suffix.to_uppercase())
    }
}
