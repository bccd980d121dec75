use std::fmt;

use crate::{string_id, uuid_id};

string_id!(ProductId);
string_id!(VariantId);
string_id!(UserId);
string_id!(OrderId);

uuid_id!(DraftId);

/// The variant every line item without an explicit variant belongs to.
pub const DEFAULT_VARIANT: &str = "default";

/// Identity of a line item within a cart: `(product, variant)`.
/// Missing, empty and `"default"` variants are the same variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "LineKeyPayload")]
pub struct LineKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    pub fn new(product_id: impl Into<ProductId>, variant_id: Option<impl Into<VariantId>>) -> Self {
        let variant_id = variant_id
            .map(Into::into)
            .filter(|v: &VariantId| !v.as_str().is_empty() && v.as_str() != DEFAULT_VARIANT);
        Self {
            product_id: product_id.into(),
            variant_id,
        }
    }

    pub fn product(product_id: impl Into<ProductId>) -> Self {
        Self::new(product_id, None::<VariantId>)
    }

    pub fn variant_or_default(&self) -> &str {
        self.variant_id
            .as_ref()
            .map_or(DEFAULT_VARIANT, VariantId::as_str)
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.product_id, self.variant_or_default())
    }
}

#[derive(serde::Deserialize)]
struct LineKeyPayload {
    #[serde(alias = "productId")]
    product_id: ProductId,
    #[serde(default, alias = "variantId")]
    variant_id: Option<VariantId>,
}

impl From<LineKeyPayload> for LineKey {
    fn from(payload: LineKeyPayload) -> Self {
        LineKey::new(payload.product_id, payload.variant_id)
    }
}

/// Tags every remote mutation issued by a cart store. Ids only ever increase, which makes
/// them comparable across keys as well as within one.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next(self) -> Self {
        RequestId(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Uuid {0} is not compatible. Version 7 Uuid is required.")]
pub struct UuidNotCompatible(pub uuid::Uuid);
