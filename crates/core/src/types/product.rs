//! Catalog product record.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Money;

/// Stock level below which the back office flags a product as running low.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// A product as returned by the catalog endpoints.
///
/// Optional fields are frequently missing on older catalog entries, so
/// everything except id, name and price defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Money>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Product {
    /// Minimal product with only the required fields set.
    #[must_use]
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            brand: None,
            price,
            original_price: None,
            images: Vec::new(),
            sizes: Vec::new(),
            colors: Vec::new(),
            stock: None,
            section: None,
            category: None,
            sub_category: None,
            description: None,
        }
    }

    /// First image path, if any.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Resolve an image path against the API origin.
    ///
    /// Absolute URLs pass through; uploaded files are stored as relative
    /// paths (sometimes with Windows separators) under the API host.
    #[must_use]
    pub fn image_url(path: &str, api_base: &str) -> String {
        if path.starts_with("http") {
            return path.to_owned();
        }
        let base = api_base.trim_end_matches('/');
        let path = path.replace('\\', "/");
        format!("{base}/{}", path.trim_start_matches('/'))
    }

    /// Whether the product is out of stock. Unknown stock counts as available.
    #[must_use]
    pub fn is_out_of_stock(&self) -> bool {
        self.stock == Some(0)
    }

    /// Whether stock is positive but below [`LOW_STOCK_THRESHOLD`].
    #[must_use]
    pub fn is_low_stock(&self) -> bool {
        matches!(self.stock, Some(n) if n > 0 && n < LOW_STOCK_THRESHOLD)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_sparse_catalog_entry() {
        let product: Product =
            serde_json::from_str(r#"{"_id":"p1","name":"Linen Shirt","price":500}"#).unwrap();
        assert_eq!(product.id.as_str(), "p1");
        assert_eq!(product.price, Money::from_major(500));
        assert!(product.images.is_empty());
        assert_eq!(product.stock, None);
    }

    #[test]
    fn test_image_url_resolution() {
        assert_eq!(
            Product::image_url("uploads\\shirt.jpg", "https://api.shoplane.in/"),
            "https://api.shoplane.in/uploads/shirt.jpg"
        );
        assert_eq!(
            Product::image_url("https://cdn.example.com/a.jpg", "https://api.shoplane.in"),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn test_stock_flags() {
        let mut product = Product::new("p1", "Tee", Money::from_major(300));
        assert!(!product.is_out_of_stock());
        product.stock = Some(0);
        assert!(product.is_out_of_stock());
        assert!(!product.is_low_stock());
        product.stock = Some(3);
        assert!(product.is_low_stock());
        product.stock = Some(5);
        assert!(!product.is_low_stock());
    }
}
