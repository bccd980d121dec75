//! Money aggregation.
//!
//! Folds cart lines into totals. Everything in here is pure: the same input always produces the
//! same output and nothing is ever rejected. Lines with a price or quantity that is not a number
//! count as zero.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use tracing::warn;

use super::{LineItem, LineKey, ProductId, VariantId};

/// A cart line exactly as a collaborator handed it to us. Prices and quantities are kept as
/// raw JSON values so malformed input can be coerced rather than refused.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RawCartLine {
    #[serde(default, alias = "productId")]
    pub product_id: ProductId,
    #[serde(default, alias = "variantId")]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub quantity: Value,
}

impl RawCartLine {
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    pub fn unit_price(&self) -> Decimal {
        coerce_price(&self.price).unwrap_or_else(|| {
            warn!("Cart line {} has a non-numeric price {}, counting it as 0.", self.key(), self.price);
            Decimal::ZERO
        })
    }

    /// The price if the collaborator actually sent one.
    pub fn declared_price(&self) -> Option<Decimal> {
        coerce_price(&self.price)
    }

    pub fn quantity(&self) -> u32 {
        coerce_quantity(&self.quantity).unwrap_or_else(|| {
            warn!("Cart line {} has a non-numeric quantity {}, counting it as 0.", self.key(), self.quantity);
            0
        })
    }
}

impl From<&LineItem> for RawCartLine {
    fn from(item: &LineItem) -> Self {
        RawCartLine {
            product_id: item.key.product_id.clone(),
            variant_id: item.key.variant_id.clone(),
            price: Value::String(item.unit_price.to_string()),
            quantity: Value::from(item.quantity()),
        }
    }
}

/// Totals for all lines sharing one [`LineKey`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VariantTotal {
    pub key: LineKey,
    /// Unit price of the first line seen for this key.
    pub unit_price: Decimal,
    pub quantity: u64,
    /// Sum of the per-line subtotals, unrounded.
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Aggregation {
    pub total_items: u64,
    /// Rounded once, to cents, after everything has been summed.
    pub subtotal: Decimal,
    /// One entry per key, in the order each key was first seen.
    pub items_by_variant: Vec<VariantTotal>,
}

/// Aggregates raw cart lines. Lines sharing a key are merged by summing quantities and summing
/// their line subtotals.
pub fn aggregate(lines: &[RawCartLine]) -> Aggregation {
    fold_lines(
        lines
            .iter()
            .map(|line| (line.key(), line.unit_price(), line.quantity())),
    )
}

/// Aggregates line items that already satisfy the line item invariants.
pub fn aggregate_items(items: &[LineItem]) -> Aggregation {
    fold_lines(
        items
            .iter()
            .map(|item| (item.key.clone(), item.unit_price, item.quantity())),
    )
}

fn fold_lines(lines: impl Iterator<Item = (LineKey, Decimal, u32)>) -> Aggregation {
    let mut positions: HashMap<LineKey, usize> = HashMap::new();
    let mut items_by_variant: Vec<VariantTotal> = Vec::new();
    let mut total_items = 0u64;
    let mut unrounded = Decimal::ZERO;

    for (key, unit_price, quantity) in lines {
        let line_subtotal = unit_price * Decimal::from(quantity);
        total_items += u64::from(quantity);
        unrounded += line_subtotal;

        match positions.get(&key) {
            Some(&index) => {
                let entry = &mut items_by_variant[index];
                entry.quantity += u64::from(quantity);
                entry.subtotal += line_subtotal;
            }
            None => {
                positions.insert(key.clone(), items_by_variant.len());
                items_by_variant.push(VariantTotal {
                    key,
                    unit_price,
                    quantity: u64::from(quantity),
                    subtotal: line_subtotal,
                });
            }
        }
    }

    Aggregation {
        total_items,
        subtotal: round_money(unrounded),
        items_by_variant,
    }
}

/// Rounds to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_owned(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn coerce_price(value: &Value) -> Option<Decimal> {
    coerce_decimal(value)
}

// Whole units only. Negative quantities count as nothing.
fn coerce_quantity(value: &Value) -> Option<u32> {
    let quantity = coerce_decimal(value)?.trunc();
    if quantity.is_sign_negative() {
        return Some(0);
    }
    Some(quantity.to_u32().unwrap_or(u32::MAX))
}

//-------------------------- Tests -------------------------------

#[cfg(test)]
mod tests {
    use fake::Fake;
    use serde_json::json;

    use crate::domain::fake::Price;

    use super::*;

    fn line(product: &str, variant: Option<&str>, price: Value, quantity: Value) -> RawCartLine {
        RawCartLine {
            product_id: product.into(),
            variant_id: variant.map(VariantId::from),
            price,
            quantity,
        }
    }

    #[test]
    fn empty_input_aggregates_to_zero() {
        let aggregation = aggregate(&[]);
        assert_eq!(aggregation, Aggregation::default());
    }

    #[test]
    fn subtotal_is_rounded_once_at_the_end() {
        let aggregation = aggregate(&[line("A", None, json!(10.005), json!(3))]);
        // 30.015 -> 30.02. Rounding the unit price first would give 30.03.
        assert_eq!(aggregation.subtotal, Decimal::new(3002, 2));
        assert_eq!(aggregation.items_by_variant[0].subtotal, Decimal::new(30015, 3));
    }

    #[test]
    fn lines_with_the_same_key_are_merged_in_first_seen_order() {
        let aggregation = aggregate(&[
            line("A", Some("red"), json!(2.5), json!(1)),
            line("B", None, json!(1), json!(4)),
            line("A", Some("red"), json!(2.5), json!(2)),
            line("B", Some("default"), json!(1), json!(1)),
        ]);

        assert_eq!(aggregation.total_items, 8);
        assert_eq!(aggregation.subtotal, Decimal::new(1250, 2));
        let keys: Vec<String> = aggregation
            .items_by_variant
            .iter()
            .map(|entry| entry.key.to_string())
            .collect();
        assert_eq!(keys, vec!["A-red", "B-default"]);
        assert_eq!(aggregation.items_by_variant[0].quantity, 3);
        assert_eq!(aggregation.items_by_variant[1].quantity, 5);
    }

    #[test]
    fn merged_keys_are_unique() {
        let lines: Vec<RawCartLine> = (0..40)
            .map(|i| {
                let variant = ["red", "blue", ""][i % 3];
                let price: Decimal = Price.fake();
                line(
                    ["A", "B", "C", "D"][i % 4],
                    Some(variant),
                    json!(price.to_string()),
                    json!(i % 5),
                )
            })
            .collect();

        let aggregation = aggregate(&lines);

        let mut keys: Vec<&LineKey> = aggregation.items_by_variant.iter().map(|e| &e.key).collect();
        let before = keys.len();
        keys.sort_by_key(|k| k.to_string());
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn malformed_price_and_quantity_count_as_zero() {
        let aggregation = aggregate(&[
            line("A", None, json!("abc"), json!(2)),
            line("B", None, json!(4), Value::Null),
            line("C", None, json!({"amount": 1}), json!([1])),
            line("D", None, json!("1.50"), json!("2")),
        ]);

        assert_eq!(aggregation.total_items, 4);
        assert_eq!(aggregation.subtotal, Decimal::new(300, 2));
        assert_eq!(aggregation.items_by_variant.len(), 4);
    }

    #[test]
    fn negative_and_fractional_quantities_are_coerced() {
        assert_eq!(coerce_quantity(&json!(-3)), Some(0));
        assert_eq!(coerce_quantity(&json!(2.9)), Some(2));
        assert_eq!(coerce_quantity(&json!("x")), None);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let lines = vec![
            line("A", None, json!(0.1), json!(3)),
            line("B", Some("xl"), json!(19.99), json!(1)),
            line("A", None, json!(0.2), json!(1)),
        ];
        assert_eq!(aggregate(&lines), aggregate(&lines));
    }

    #[test]
    fn midpoints_round_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
        assert_eq!(round_money(Decimal::new(1004, 3)), Decimal::new(100, 2));
    }
}
