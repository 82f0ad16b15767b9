//! Catalog authoring: single products and bulk import.
//!
//! Bulk text is either JSON (an array of products, or one product object)
//! or comma-separated rows in this column order:
//!
//! ```text
//! brand,name,price,originalPrice,stock,section,category,subCategory,imageUrl|...,description,size|...
//! ```
//!
//! Fields containing commas must be double-quoted. A header row starting
//! with `brand` is skipped, as are blank lines.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use shoplane_core::Money;
use thiserror::Error;
use tracing::instrument;

use crate::client::AdminClient;
use crate::error::AdminError;

/// Size used when a product has no size options.
pub const FREE_SIZE: &str = "Free Size";

const DEFAULT_DESCRIPTION: &str = "No description available";

/// Errors in bulk import text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BulkError {
    #[error("nothing to import")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("invalid CSV: {0}")]
    Csv(String),

    #[error("line {line}: {reason}")]
    Row { line: usize, reason: String },
}

/// A product ready to be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub brand: String,
    pub name: String,
    pub price: Money,
    pub original_price: Money,
    pub stock: u32,
    pub section: String,
    pub category: String,
    pub sub_category: String,
    pub images: Vec<String>,
    pub description: String,
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

// =============================================================================
// Single product form
// =============================================================================

/// Sizes offered for a category/sub-category pair.
///
/// An empty list means the product is sold in one size.
#[must_use]
pub fn available_sizes(section: &str, category: &str, sub_category: &str) -> &'static [&'static str] {
    let category = category.to_lowercase();
    let sub_category = sub_category.to_lowercase();
    if category == "footwear" {
        &["6", "7", "8", "9", "10", "11"]
    } else if sub_category == "jeans" || sub_category == "trousers" {
        &["28", "30", "32", "34", "36", "38"]
    } else if section.eq_ignore_ascii_case("kids") && category == "clothing" {
        &["2-3Y", "3-4Y", "5-6Y", "7-8Y", "9-10Y"]
    } else if category == "clothing" {
        &["S", "M", "L", "XL", "XXL"]
    } else {
        &[]
    }
}

/// The single-product authoring form.
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub brand: String,
    pub name: String,
    pub price: Option<Money>,
    /// Defaults to the price.
    pub original_price: Option<Money>,
    pub stock: u32,
    pub section: String,
    pub category: String,
    pub sub_category: String,
    /// Comma-separated external image URLs.
    pub image_urls: String,
    pub description: String,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
}

impl ProductDraft {
    /// Add a colour unless it is blank or already present.
    pub fn add_color(&mut self, color: &str) {
        let color = color.trim();
        if !color.is_empty() && !self.colors.iter().any(|c| c == color) {
            self.colors.push(color.to_owned());
        }
    }

    /// Select or deselect a size.
    pub fn toggle_size(&mut self, size: &str) {
        if let Some(index) = self.sizes.iter().position(|s| s == size) {
            self.sizes.remove(index);
        } else {
            self.sizes.push(size.to_owned());
        }
    }

    /// Validate the form.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::BadRequest`] naming the first problem.
    pub fn into_product(self) -> Result<NewProduct, AdminError> {
        let bad = |msg: &str| AdminError::BadRequest(msg.to_string());

        if self.name.trim().is_empty() {
            return Err(bad("name is required"));
        }
        if self.section.trim().is_empty() || self.category.trim().is_empty() {
            return Err(bad("section and category are required"));
        }
        let price = self.price.ok_or_else(|| bad("price is required"))?;

        let offered = available_sizes(&self.section, &self.category, &self.sub_category);
        let sizes = if !self.sizes.is_empty() {
            self.sizes
        } else if offered.is_empty() {
            vec![FREE_SIZE.to_string()]
        } else {
            return Err(bad("select at least one size"));
        };

        Ok(NewProduct {
            brand: self.brand.trim().to_owned(),
            name: self.name.trim().to_owned(),
            original_price: self.original_price.unwrap_or(price),
            price,
            stock: self.stock,
            section: self.section,
            category: self.category,
            sub_category: self.sub_category,
            images: split_list(&self.image_urls, ','),
            description: self.description.trim().to_owned(),
            sizes,
            colors: self.colors,
        })
    }
}

// =============================================================================
// Bulk import
// =============================================================================

/// Parse bulk import text into products.
///
/// # Errors
///
/// Returns [`BulkError`] for empty input, malformed JSON or a bad CSV row.
pub fn parse_bulk(text: &str) -> Result<Vec<NewProduct>, BulkError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(BulkError::Empty);
    }

    let products = if text.starts_with('[') || text.starts_with('{') {
        parse_json(text)?
    } else {
        parse_csv(text)?
    };

    if products.is_empty() {
        return Err(BulkError::Empty);
    }
    Ok(products)
}

/// JSON entries may carry a single `image` instead of `images`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEntry {
    #[serde(flatten)]
    product: JsonProduct,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonProduct {
    #[serde(default)]
    brand: String,
    name: String,
    price: Money,
    #[serde(default)]
    original_price: Option<Money>,
    #[serde(default)]
    stock: u32,
    #[serde(default)]
    section: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    sub_category: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    sizes: Vec<String>,
    #[serde(default)]
    colors: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonBatch {
    Many(Vec<JsonEntry>),
    One(Box<JsonEntry>),
}

fn parse_json(text: &str) -> Result<Vec<NewProduct>, BulkError> {
    let batch: JsonBatch =
        serde_json::from_str(text).map_err(|e| BulkError::Json(e.to_string()))?;
    let entries = match batch {
        JsonBatch::Many(entries) => entries,
        JsonBatch::One(entry) => vec![*entry],
    };

    Ok(entries
        .into_iter()
        .map(|entry| {
            let p = entry.product;
            NewProduct {
                images: entry
                    .images
                    .or_else(|| entry.image.map(|i| vec![i]))
                    .unwrap_or_default(),
                original_price: p.original_price.unwrap_or(p.price),
                brand: p.brand,
                name: p.name,
                price: p.price,
                stock: p.stock,
                section: p.section,
                category: p.category,
                sub_category: p.sub_category,
                description: p
                    .description
                    .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
                sizes: if p.sizes.is_empty() {
                    vec![FREE_SIZE.to_string()]
                } else {
                    p.sizes
                },
                colors: p.colors,
            }
        })
        .collect())
}

fn parse_csv(text: &str) -> Result<Vec<NewProduct>, BulkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut products = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| BulkError::Csv(e.to_string()))?;
        let line = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(index + 1);
        if record.iter().all(str::is_empty) {
            continue;
        }
        // Header row is optional
        if index == 0 && record.get(0).is_some_and(|c| c.eq_ignore_ascii_case("brand")) {
            continue;
        }
        products.push(parse_row(&record, line)?);
    }
    Ok(products)
}

fn parse_row(record: &csv::StringRecord, line: usize) -> Result<NewProduct, BulkError> {
    let col = |i: usize| record.get(i).unwrap_or("");
    let row_err = |reason: String| BulkError::Row { line, reason };

    let name = col(1);
    if name.is_empty() {
        return Err(row_err("name is required".to_string()));
    }
    let price = parse_money(col(2)).ok_or_else(|| row_err(format!("invalid price '{}'", col(2))))?;
    let original_price = if col(3).is_empty() {
        price
    } else {
        parse_money(col(3)).ok_or_else(|| row_err(format!("invalid original price '{}'", col(3))))?
    };
    let stock = if col(4).is_empty() {
        0
    } else {
        col(4)
            .parse()
            .map_err(|_| row_err(format!("invalid stock '{}'", col(4))))?
    };
    let description = col(9);
    let sizes = split_list(col(10), '|');

    Ok(NewProduct {
        brand: col(0).to_owned(),
        name: name.to_owned(),
        price,
        original_price,
        stock,
        section: col(5).to_lowercase(),
        category: col(6).to_lowercase(),
        sub_category: col(7).to_lowercase(),
        images: split_list(col(8), '|'),
        description: if description.is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            description.to_owned()
        },
        sizes: if sizes.is_empty() {
            vec![FREE_SIZE.to_string()]
        } else {
            sizes
        },
        colors: Vec::new(),
    })
}

fn parse_money(raw: &str) -> Option<Money> {
    raw.parse::<rust_decimal::Decimal>()
        .ok()
        .filter(|d| !d.is_sign_negative())
        .map(Money::new)
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// =============================================================================
// Endpoints
// =============================================================================

#[derive(Deserialize)]
struct AddResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    message: Option<String>,
}

impl AddResponse {
    fn check(self) -> Result<Self, AdminError> {
        if self.success {
            Ok(self)
        } else {
            Err(AdminError::BadRequest(
                self.message.unwrap_or_else(|| "product rejected".to_string()),
            ))
        }
    }
}

impl AdminClient {
    /// List one product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server declines.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add_product(&self, product: &NewProduct) -> Result<(), AdminError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            #[serde(flatten)]
            product: &'a NewProduct,
            external_image_urls: &'a [String],
        }

        let response: AddResponse = self
            .send(self.request(Method::POST, "/api/products/add")?.json(&Body {
                product,
                external_image_urls: &product.images,
            }))
            .await?;
        response.check()?;
        tracing::info!("product listed");
        Ok(())
    }

    /// List many products at once. Returns how many the server added.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server declines.
    #[instrument(skip(self, products), fields(count = products.len()))]
    pub async fn bulk_add(&self, products: &[NewProduct]) -> Result<usize, AdminError> {
        let response: AddResponse = self
            .send(self.request(Method::POST, "/api/products/bulk-add")?.json(products))
            .await?;
        let added = response.check()?.count.unwrap_or(products.len());
        tracing::info!(added, "bulk import complete");
        Ok(added)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::tests::client;

    #[test]
    fn test_size_options_follow_taxonomy() {
        assert_eq!(available_sizes("MEN", "Footwear", "Sneakers")[0], "6");
        assert_eq!(available_sizes("MEN", "Clothing", "Jeans")[0], "28");
        assert_eq!(available_sizes("KIDS", "Clothing", "Dresses")[0], "2-3Y");
        assert_eq!(available_sizes("WOMEN", "Clothing", "Tops")[0], "S");
        assert!(available_sizes("ELECTRONICS", "Audio", "Speakers").is_empty());
    }

    #[test]
    fn test_draft_requires_size_when_sizes_exist() {
        let mut draft = ProductDraft {
            name: "Cotton Slim Shirt".to_string(),
            price: Some(Money::from_major(1299)),
            section: "MEN".to_string(),
            category: "Clothing".to_string(),
            sub_category: "Shirts".to_string(),
            image_urls: "https://cdn.shop/a.jpg, ,https://cdn.shop/b.jpg".to_string(),
            ..ProductDraft::default()
        };
        assert!(matches!(
            draft.clone().into_product(),
            Err(AdminError::BadRequest(_))
        ));

        draft.toggle_size("M");
        draft.toggle_size("L");
        draft.toggle_size("M");
        draft.add_color("Navy");
        draft.add_color("Navy");
        let product = draft.into_product().unwrap();

        assert_eq!(product.sizes, ["L"]);
        assert_eq!(product.colors, ["Navy"]);
        assert_eq!(product.images.len(), 2);
        assert_eq!(product.original_price, Money::from_major(1299));
    }

    #[test]
    fn test_draft_without_size_options_is_free_size() {
        let draft = ProductDraft {
            name: "Speaker".to_string(),
            price: Some(Money::from_major(2499)),
            section: "ELECTRONICS".to_string(),
            category: "Audio".to_string(),
            ..ProductDraft::default()
        };
        assert_eq!(draft.into_product().unwrap().sizes, [FREE_SIZE]);
    }

    #[test]
    fn test_csv_rows() {
        let text = "\
Brand,Name,Price,MRP,Stock,Section,Category,SubCategory,ImageURL,Description,Sizes
ShopLane,Linen Shirt,899,1299,10,MEN,Clothing,Shirts,a.jpg|b.jpg,Breathable linen,S|M|L

Bata,Canvas Sneakers,1499,,,MEN,Footwear,Sneakers,,,";
        let products = parse_bulk(text).unwrap();

        assert_eq!(products.len(), 2);
        let shirt = &products[0];
        assert_eq!(shirt.price, Money::from_major(899));
        assert_eq!(shirt.original_price, Money::from_major(1299));
        assert_eq!(shirt.section, "men");
        assert_eq!(shirt.images, ["a.jpg", "b.jpg"]);
        assert_eq!(shirt.sizes, ["S", "M", "L"]);

        let sneakers = &products[1];
        assert_eq!(sneakers.original_price, Money::from_major(1499));
        assert_eq!(sneakers.stock, 0);
        assert_eq!(sneakers.sizes, [FREE_SIZE]);
        assert_eq!(sneakers.description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_csv_reports_bad_line() {
        let text = "ShopLane,Tee,499,499,5,MEN,Clothing,T-Shirts,,,\nShopLane,Polo,abc,,,MEN,Clothing,T-Shirts,,,";
        assert_eq!(
            parse_bulk(text),
            Err(BulkError::Row {
                line: 2,
                reason: "invalid price 'abc'".to_string()
            })
        );
    }

    #[test]
    fn test_csv_quoted_field_keeps_its_comma() {
        let text = "Acme,Tee,499,999,10,men,topwear,tshirts,a.jpg,\"Soft cotton, relaxed fit\",S|M";
        let products = parse_bulk(text).unwrap();

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].description, "Soft cotton, relaxed fit");
        assert_eq!(products[0].sizes, ["S", "M"]);
        assert_eq!(products[0].stock, 10);
    }

    #[test]
    fn test_csv_rejects_non_numeric_stock() {
        let text = "Acme,Tee,499,999,ten,men,topwear,tshirts,a.jpg,Soft,S|M";
        assert_eq!(
            parse_bulk(text),
            Err(BulkError::Row {
                line: 1,
                reason: "invalid stock 'ten'".to_string()
            })
        );
    }

    #[test]
    fn test_json_single_image_and_object() {
        let products = parse_bulk(r#"{"name": "Watch", "price": 2999, "image": "w.jpg"}"#).unwrap();
        assert_eq!(products[0].images, ["w.jpg"]);
        assert_eq!(products[0].original_price, Money::from_major(2999));

        let products = parse_bulk(
            r#"[{"name": "A", "price": 10, "images": ["a.jpg"]}, {"name": "B", "price": 20}]"#,
        )
        .unwrap();
        assert_eq!(products.len(), 2);
        assert!(products[1].images.is_empty());

        assert!(matches!(parse_bulk("[{oops"), Err(BulkError::Json(_))));
        assert_eq!(parse_bulk("  "), Err(BulkError::Empty));
    }

    #[tokio::test]
    async fn test_bulk_add_reports_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products/bulk-add"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true, "count": 2})),
            )
            .mount(&server)
            .await;
        let products = parse_bulk("X,A,10,,,,,,,,\nX,B,20,,,,,,,,").unwrap();

        let added = client(&server).bulk_add(&products).await.unwrap();
        assert_eq!(added, 2);
    }
}
