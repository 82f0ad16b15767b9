//! Stock levels and product maintenance.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use shoplane_core::{Money, Product, ProductId};
use tracing::instrument;

use crate::client::AdminClient;
use crate::error::AdminError;

/// The product list endpoint answers with a bare array or `{products: [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProductList {
    Bare(Vec<Product>),
    Wrapped {
        #[serde(default)]
        products: Vec<Product>,
    },
}

/// Editable fields of a listed product. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProductUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(brand) = self.brand {
            product.brand = Some(brand);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(original_price) = self.original_price {
            product.original_price = Some(original_price);
        }
        if let Some(stock) = self.stock {
            product.stock = Some(stock);
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
    }
}

/// The inventory screen's product list.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    products: Vec<Product>,
}

impl Inventory {
    #[must_use]
    pub const fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Fetch every product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn load(client: &AdminClient) -> Result<Self, AdminError> {
        Ok(Self::new(client.list_products().await?))
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Products whose name or brand contains `term`, case-insensitively.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&Product> {
        let needle = term.trim().to_lowercase();
        self.products
            .iter()
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.brand
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// In stock but below the restock threshold.
    #[must_use]
    pub fn low_stock(&self) -> Vec<&Product> {
        self.products.iter().filter(|p| p.is_low_stock()).collect()
    }

    #[must_use]
    pub fn out_of_stock(&self) -> Vec<&Product> {
        self.products.iter().filter(|p| p.is_out_of_stock()).collect()
    }

    /// Apply `update` remotely, then locally.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] for an unknown product, or the API error.
    #[instrument(skip(self, client, update), fields(product_id = %id))]
    pub async fn update(
        &mut self,
        client: &AdminClient,
        id: &ProductId,
        update: ProductUpdate,
    ) -> Result<&Product, AdminError> {
        if update.is_empty() {
            return Err(AdminError::BadRequest("nothing to update".to_string()));
        }
        let index = self.position(id)?;
        client.update_product(id, &update).await?;

        let product = self
            .products
            .get_mut(index)
            .ok_or_else(|| AdminError::NotFound(format!("product {id}")))?;
        update.apply(product);
        Ok(product)
    }

    /// Delete remotely, then drop from the list.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] for an unknown product, or the API error.
    #[instrument(skip(self, client), fields(product_id = %id))]
    pub async fn delete(&mut self, client: &AdminClient, id: &ProductId) -> Result<(), AdminError> {
        let index = self.position(id)?;
        client.delete_product(id).await?;
        self.products.remove(index);
        tracing::info!("product removed");
        Ok(())
    }

    fn position(&self, id: &ProductId) -> Result<usize, AdminError> {
        self.products
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| AdminError::NotFound(format!("product {id}")))
    }
}

// =============================================================================
// Endpoints
// =============================================================================

impl AdminClient {
    /// Every product in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, AdminError> {
        let list: ProductList = self
            .send(self.request(Method::GET, "/api/products/all")?)
            .await?;
        Ok(match list {
            ProductList::Bare(products) | ProductList::Wrapped { products } => products,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, update), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: &ProductId,
        update: &ProductUpdate,
    ) -> Result<(), AdminError> {
        let path = format!("/api/products/update/{}", id.as_str());
        self.send_empty(self.request(Method::PATCH, &path)?.json(update))
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), AdminError> {
        let path = format!("/api/products/delete/{}", id.as_str());
        self.send_empty(self.request(Method::DELETE, &path)?).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::tests::client;

    fn stocked(id: &str, name: &str, brand: &str, stock: u32) -> Product {
        let mut product = Product::new(id, name, Money::from_major(999));
        product.brand = Some(brand.to_string());
        product.stock = Some(stock);
        product
    }

    fn inventory() -> Inventory {
        Inventory::new(vec![
            stocked("p1", "Cotton Slim Shirt", "ShopLane", 12),
            stocked("p2", "Denim Jeans", "Levis", 3),
            stocked("p3", "Canvas Sneakers", "Bata", 0),
            stocked("p4", "Wool Scarf", "ShopLane", 5),
        ])
    }

    #[test]
    fn test_stock_views() {
        let inventory = inventory();
        let low: Vec<_> = inventory.low_stock().iter().map(|p| p.id.as_str()).collect();
        let out: Vec<_> = inventory.out_of_stock().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(low, ["p2"]);
        assert_eq!(out, ["p3"]);
    }

    #[test]
    fn test_search_matches_name_or_brand() {
        let inventory = inventory();
        assert_eq!(inventory.search("shoplane").len(), 2);
        assert_eq!(inventory.search("JEANS").len(), 1);
        assert_eq!(inventory.search("").len(), 4);
    }

    #[tokio::test]
    async fn test_list_accepts_both_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "products": [{"_id": "p1", "name": "Tee", "price": 499, "stock": 2}]
            })))
            .mount(&server)
            .await;

        let inventory = Inventory::load(&client(&server)).await.unwrap();
        assert_eq!(inventory.products().len(), 1);
        assert_eq!(inventory.low_stock().len(), 1);

        let bare: ProductList =
            serde_json::from_value(serde_json::json!([{"_id": "p1", "name": "Tee", "price": 499}]))
                .unwrap();
        assert!(matches!(bare, ProductList::Bare(ref p) if p.len() == 1));
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/products/update/p2"))
            .and(body_json(serde_json::json!({"stock": 40})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        let mut inventory = inventory();

        let update = ProductUpdate {
            stock: Some(40),
            ..ProductUpdate::default()
        };
        let product = inventory
            .update(&client(&server), &ProductId::new("p2"), update)
            .await
            .unwrap();

        assert_eq!(product.stock, Some(40));
        assert!(inventory.low_stock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_product() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/products/delete/p1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let mut inventory = inventory();

        let result = inventory
            .delete(&client(&server), &ProductId::new("p1"))
            .await;

        assert!(result.is_err());
        assert_eq!(inventory.products().len(), 4);
    }
}
