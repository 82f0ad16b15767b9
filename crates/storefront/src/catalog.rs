//! Product catalog client.
//!
//! Read-only access to the product listing, product detail and related
//! products. Responses are cached in memory with `moka` for 5 minutes;
//! search queries are never cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;
use shoplane_core::{Product, ProductId};
use tracing::{debug, instrument};

use crate::api::{ApiClient, ApiError};

/// Page size used by the gallery.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Related products shown under a product.
const RELATED_LIMIT: usize = 10;

/// Filters for the product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub section: Option<String>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    #[must_use]
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    fn has_search(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Canonical query string, also used to key scroll bookmarks.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in [
            ("search", &self.search),
            ("category", &self.category),
            ("section", &self.section),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                query.append_pair(name, value);
            }
        }
        query.finish()
    }
}

/// One page of the product listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    product: Option<Product>,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Page(ProductPage),
    Related(Vec<Product>),
}

// =============================================================================
// Catalog
// =============================================================================

/// Cached catalog client. Cheap to clone.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    api: ApiClient,
    cache: Cache<String, CacheValue>,
}

impl Catalog {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self {
            inner: Arc::new(CatalogInner { api, cache }),
        }
    }

    /// Resolve a stored image path against the API origin.
    #[must_use]
    pub fn image_url(&self, path: &str) -> String {
        Product::image_url(path, self.inner.api.base_url().as_str())
    }

    /// Fetch one page of products. `cursor` is `None` for the first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports failure.
    #[instrument(skip(self))]
    pub async fn page(
        &self,
        query: &ProductQuery,
        cursor: Option<&str>,
    ) -> Result<ProductPage, ApiError> {
        let cache_key = format!("page:{}:{}", query.to_query_string(), cursor.unwrap_or(""));
        let cacheable = !query.has_search();

        if cacheable
            && let Some(CacheValue::Page(page)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for product page");
            return Ok(page);
        }

        let mut url = self.inner.api.url("/api/products/all")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(
                "limit",
                &query.limit.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
            );
            pairs.append_pair("cursor", cursor.unwrap_or(""));
            pairs.append_pair("search", query.search.as_deref().unwrap_or(""));
            pairs.append_pair("category", query.category.as_deref().unwrap_or(""));
            pairs.append_pair("section", query.section.as_deref().unwrap_or(""));
        }

        let response: PageResponse = self.inner.api.get_json(url).await?;
        if !response.success {
            return Err(ApiError::Api {
                status: 200,
                message: response
                    .message
                    .unwrap_or_else(|| "ARCHIVE ACCESS FAILED".to_string()),
            });
        }

        let page = ProductPage {
            products: response.products,
            next_cursor: response.next_cursor.filter(|c| !c.is_empty()),
            has_more: response.has_more,
        };

        if cacheable {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Page(page.clone()))
                .await;
        }
        Ok(page)
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Api` with status 404 when the product does not exist.
    #[instrument(skip(self))]
    pub async fn product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let cache_key = format!("product:{id}");
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let url = self.inner.api.url(&format!("/api/products/{id}"))?;
        let response: DetailResponse = self.inner.api.get_json(url).await?;
        let product = response
            .product
            .filter(|_| response.success)
            .ok_or_else(|| ApiError::Api {
                status: 404,
                message: "Product not found.".to_string(),
            })?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Up to ten products sharing the sub-category (or, failing that, the
    /// category) of `product`, excluding `product` itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn related(&self, product: &Product) -> Result<Vec<Product>, ApiError> {
        let (param, value) = match (&product.sub_category, &product.category) {
            (Some(sub), _) if !sub.is_empty() => ("subCategory", sub),
            (_, Some(category)) if !category.is_empty() => ("category", category),
            _ => return Ok(Vec::new()),
        };

        let cache_key = format!("related:{param}={value}");
        let related = if let Some(CacheValue::Related(products)) =
            self.inner.cache.get(&cache_key).await
        {
            products
        } else {
            let mut url = self.inner.api.url("/api/products")?;
            url.query_pairs_mut().append_pair(param, value);
            let response: PageResponse = self.inner.api.get_json(url).await?;
            let products = if response.success {
                response.products
            } else {
                Vec::new()
            };
            self.inner
                .cache
                .insert(cache_key, CacheValue::Related(products.clone()))
                .await;
            products
        };

        Ok(related
            .into_iter()
            .filter(|p| p.id != product.id)
            .take(RELATED_LIMIT)
            .collect())
    }

    /// Drop a cached product, e.g. after the back office edits it.
    pub async fn invalidate_product(&self, id: &ProductId) {
        self.inner.cache.invalidate(&format!("product:{id}")).await;
    }

    /// Drop everything cached.
    pub fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
    }
}

// =============================================================================
// Pager
// =============================================================================

/// Accumulates pages for infinite scrolling.
pub struct Pager {
    catalog: Catalog,
    query: ProductQuery,
    products: Vec<Product>,
    cursor: Option<String>,
    has_more: bool,
}

impl Pager {
    #[must_use]
    pub fn new(catalog: Catalog, query: ProductQuery) -> Self {
        Self {
            catalog,
            query,
            products: Vec::new(),
            cursor: None,
            has_more: true,
        }
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub const fn query(&self) -> &ProductQuery {
        &self.query
    }

    /// Discard loaded pages and fetch the first one again.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; loaded pages are kept.
    pub async fn reload(&mut self) -> Result<usize, ApiError> {
        let page = self.catalog.page(&self.query, None).await?;
        self.products.clear();
        Ok(self.absorb(page))
    }

    /// Fetch the next page. Returns how many products were added; zero once
    /// the listing is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn load_more(&mut self) -> Result<usize, ApiError> {
        if !self.has_more {
            return Ok(0);
        }
        let page = self
            .catalog
            .page(&self.query, self.cursor.as_deref())
            .await?;
        Ok(self.absorb(page))
    }

    fn absorb(&mut self, page: ProductPage) -> usize {
        let added = page.products.len();
        self.products.extend(page.products);
        self.has_more = page.has_more && page.next_cursor.is_some();
        self.cursor = page.next_cursor;
        added
    }
}
