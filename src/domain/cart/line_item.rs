use std::num::NonZeroU32;

use rust_decimal::Decimal;

use super::{LineKey, RawCartLine, VariantTotal};

/// One `(product, variant)` pairing in a cart. A line item always holds at least one unit;
/// an item that would drop to zero is removed instead.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineItem {
    #[serde(flatten)]
    pub key: LineKey,
    pub unit_price: Decimal,
    quantity: NonZeroU32,
}

impl LineItem {
    /// Returns `None` for a zero quantity.
    pub fn new(key: LineKey, unit_price: Decimal, quantity: u32) -> Option<Self> {
        Some(Self {
            key,
            unit_price,
            quantity: NonZeroU32::new(quantity)?,
        })
    }

    pub fn quantity(&self) -> u32 {
        self.quantity.get()
    }

    /// Sets the quantity, refusing to go below one unit.
    pub(crate) fn set_quantity(&mut self, quantity: u32) -> bool {
        match NonZeroU32::new(quantity) {
            Some(quantity) => {
                self.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity.get())
    }
}

impl TryFrom<&VariantTotal> for LineItem {
    type Error = LineKey;

    fn try_from(total: &VariantTotal) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(total.quantity).unwrap_or(u32::MAX);
        LineItem::new(total.key.clone(), total.unit_price, quantity).ok_or_else(|| total.key.clone())
    }
}

impl TryFrom<&RawCartLine> for LineItem {
    type Error = LineKey;

    fn try_from(line: &RawCartLine) -> Result<Self, Self::Error> {
        LineItem::new(line.key(), line.unit_price(), line.quantity()).ok_or_else(|| line.key())
    }
}
