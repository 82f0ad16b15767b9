//! Cart and wishlist lines.

use serde::{Deserialize, Serialize};
use shoplane_core::{CartItemId, Money, Product, ProductId, VariantKey};

/// Identity of a cart line: one line per product and variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantKey>,
}

impl LineKey {
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, variant: Option<VariantKey>) -> Self {
        Self {
            product_id: product_id.into(),
            variant: VariantKey::normalize(variant),
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{} ({variant})", self.product_id),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// One line in the cart.
///
/// `price` is the unit price captured when the line was added and is not
/// refreshed from the catalog. `revision` increases on every local change
/// to the line and lets stale remote updates be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantKey>,
    pub quantity: u32,
    pub price: Money,
    #[serde(default)]
    pub revision: u64,
    /// Server-side id of the line, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<CartItemId>,
}

impl CartLine {
    /// A fresh quantity-1 line priced at the product's current price.
    #[must_use]
    pub fn new(product: Product, variant: Option<VariantKey>, revision: u64) -> Self {
        let price = product.price;
        Self {
            product,
            variant: VariantKey::normalize(variant),
            quantity: 1,
            price,
            revision,
            remote_id: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product.id.clone(),
            variant: self.variant.clone(),
        }
    }

    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product.id == key.product_id && self.variant == key.variant
    }

    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }
}

/// A saved product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub product: Product,
}
