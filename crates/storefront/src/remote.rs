//! Remote cart and wishlist store.
//!
//! [`RemoteStore`] is the seam between the cart container and the network.
//! [`ApiClient`] implements it against the REST endpoints; tests swap in an
//! in-memory fake.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use shoplane_core::{CartItemId, Product, ProductId, VariantKey};
use tracing::instrument;

use crate::api::{ApiClient, ApiError};
use crate::models::{CartLine, LineKey, WishlistEntry};

/// Remote persistence for cart and wishlist.
///
/// Every call requires a signed-in user.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The server's view of the cart. Line revisions are left at zero.
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError>;
    /// The server's view of the wishlist.
    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError>;
    async fn add_to_cart(&self, key: &LineKey, quantity: u32) -> Result<(), ApiError>;
    async fn remove_from_cart(&self, key: &LineKey) -> Result<(), ApiError>;
    async fn update_quantity(&self, key: &LineKey, quantity: u32) -> Result<(), ApiError>;
    async fn empty_cart(&self) -> Result<(), ApiError>;
    async fn add_to_wishlist(&self, product_id: &ProductId) -> Result<(), ApiError>;
    async fn remove_from_wishlist(&self, product_id: &ProductId) -> Result<(), ApiError>;
}

// =============================================================================
// Wire types
// =============================================================================

/// `{ "products": [...] }` as returned by both collection endpoints.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    products: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    #[serde(rename = "_id", default)]
    id: Option<CartItemId>,
    #[serde(default)]
    product_id: Option<WireProductRef>,
    #[serde(default)]
    quantity: Option<u32>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

/// The product reference is populated on most deployments but may be a
/// bare id when the server skips population.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireProductRef {
    Populated(Box<Product>),
    Id(ProductId),
    Unreadable(serde::de::IgnoredAny),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LineBody<'a> {
    product_id: &'a ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

impl<'a> LineBody<'a> {
    fn new(key: &'a LineKey, quantity: Option<u32>) -> Self {
        let variant = key.variant.as_ref();
        Self {
            product_id: &key.product_id,
            quantity,
            size: variant.and_then(|v| v.size.as_deref()),
            color: variant.and_then(|v| v.color.as_deref()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WishlistBody<'a> {
    product_id: &'a ProductId,
}

fn into_cart_lines(response: ListResponse) -> Vec<CartLine> {
    response
        .products
        .into_iter()
        .filter_map(|entry| {
            let product = match entry.product_id {
                Some(WireProductRef::Populated(product)) => *product,
                Some(WireProductRef::Id(id)) => {
                    tracing::warn!(product_id = %id, "dropping unpopulated cart entry");
                    return None;
                }
                Some(WireProductRef::Unreadable(_)) => {
                    tracing::warn!("dropping unreadable cart entry");
                    return None;
                }
                None => return None,
            };
            let variant = VariantKey::normalize(Some(VariantKey {
                size: entry.size,
                color: entry.color,
            }));
            let mut line = CartLine::new(product, variant, 0);
            line.quantity = entry.quantity.unwrap_or(1).max(1);
            line.remote_id = entry.id;
            Some(line)
        })
        .collect()
}

fn into_wishlist(response: ListResponse) -> Vec<WishlistEntry> {
    let mut entries: Vec<WishlistEntry> = Vec::new();
    for entry in response.products {
        match entry.product_id {
            Some(WireProductRef::Populated(product)) => {
                if !entries.iter().any(|e| e.product.id == product.id) {
                    entries.push(WishlistEntry { product: *product });
                }
            }
            Some(WireProductRef::Id(id)) => {
                tracing::warn!(product_id = %id, "dropping unpopulated wishlist entry");
            }
            Some(WireProductRef::Unreadable(_)) => {
                tracing::warn!("dropping unreadable wishlist entry");
            }
            None => {}
        }
    }
    entries
}

/// Variant selectors for path-addressed removals.
fn remove_path(base: &str, key: &LineKey) -> String {
    let mut path = format!("{base}/{}", key.product_id);
    if let Some(variant) = &key.variant {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(size) = &variant.size {
            query.append_pair("size", size);
        }
        if let Some(color) = &variant.color {
            query.append_pair("color", color);
        }
        path.push('?');
        path.push_str(&query.finish());
    }
    path
}

// =============================================================================
// ApiClient implementation
// =============================================================================

#[async_trait]
impl RemoteStore for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError> {
        let response: ListResponse = self.send(self.authed(Method::GET, "/api/cart")?).await?;
        Ok(into_cart_lines(response))
    }

    #[instrument(skip(self))]
    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        let response: ListResponse = self
            .send(self.authed(Method::GET, "/api/wishlist")?)
            .await?;
        Ok(into_wishlist(response))
    }

    #[instrument(skip(self), fields(line = %key))]
    async fn add_to_cart(&self, key: &LineKey, quantity: u32) -> Result<(), ApiError> {
        let body = LineBody::new(key, Some(quantity));
        self.send_empty(self.authed(Method::POST, "/api/cart/add")?.json(&body))
            .await
    }

    #[instrument(skip(self), fields(line = %key))]
    async fn remove_from_cart(&self, key: &LineKey) -> Result<(), ApiError> {
        let path = remove_path("/api/cart/remove", key);
        self.send_empty(self.authed(Method::DELETE, &path)?).await
    }

    #[instrument(skip(self), fields(line = %key))]
    async fn update_quantity(&self, key: &LineKey, quantity: u32) -> Result<(), ApiError> {
        let body = LineBody::new(key, Some(quantity));
        self.send_empty(self.authed(Method::PUT, "/api/cart/update")?.json(&body))
            .await
    }

    #[instrument(skip(self))]
    async fn empty_cart(&self) -> Result<(), ApiError> {
        self.send_empty(self.authed(Method::DELETE, "/api/cart/empty")?)
            .await
    }

    #[instrument(skip(self))]
    async fn add_to_wishlist(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let body = WishlistBody { product_id };
        self.send_empty(self.authed(Method::POST, "/api/wishlist/add")?.json(&body))
            .await
    }

    #[instrument(skip(self))]
    async fn remove_from_wishlist(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let path = format!("/api/wishlist/remove/{product_id}");
        self.send_empty(self.authed(Method::DELETE, &path)?).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use shoplane_core::Money;

    #[test]
    fn test_cart_response_mapping() {
        let response: ListResponse = serde_json::from_str(
            r#"{"products": [
                {"_id": "ci1", "productId": {"_id": "p1", "name": "Tee", "price": 300}, "quantity": 2, "size": "M"},
                {"_id": "ci2", "productId": "p2", "quantity": 1},
                {"_id": "ci3", "productId": null},
                {"_id": "ci4", "productId": {"_id": "p3", "name": "Cap", "price": 150}}
            ]}"#,
        )
        .unwrap();

        let lines = into_cart_lines(response);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].variant, Some(VariantKey::size("M")));
        assert_eq!(lines[0].remote_id, Some(CartItemId::new("ci1")));
        assert_eq!(lines[0].price, Money::from_major(300));
        assert_eq!(lines[1].quantity, 1);
        assert_eq!(lines[1].variant, None);
    }

    #[test]
    fn test_wishlist_mapping_dedupes() {
        let response: ListResponse = serde_json::from_str(
            r#"{"products": [
                {"productId": {"_id": "p1", "name": "Tee", "price": 300}},
                {"productId": {"_id": "p1", "name": "Tee", "price": 300}},
                {"productId": "p9"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(into_wishlist(response).len(), 1);
    }

    #[test]
    fn test_missing_products_field_is_empty() {
        let response: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(into_cart_lines(response).is_empty());
    }

    #[test]
    fn test_remove_path_carries_variant() {
        let plain = LineKey::new("p1", None);
        assert_eq!(remove_path("/api/cart/remove", &plain), "/api/cart/remove/p1");

        let sized = LineKey::new("p1", Some(VariantKey::new("L", "Navy Blue")));
        assert_eq!(
            remove_path("/api/cart/remove", &sized),
            "/api/cart/remove/p1?size=L&color=Navy+Blue"
        );
    }

    #[test]
    fn test_line_body_shape() {
        let key = LineKey::new("p1", Some(VariantKey::size("S")));
        let body = serde_json::to_value(LineBody::new(&key, Some(3))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"productId": "p1", "quantity": 3, "size": "S"})
        );
    }
}
