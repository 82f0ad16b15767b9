//! Indian postal code lookup.
//!
//! Resolves a 6-digit pincode to the district and state of its first post
//! office via the public `api.postalpincode.in` service.

use async_trait::async_trait;
use serde::Deserialize;
use shoplane_core::Pincode;
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// Default lookup service.
pub const DEFAULT_POSTAL_URL: &str = "https://api.postalpincode.in";

/// Errors that can occur during a pincode lookup.
#[derive(Debug, Error)]
pub enum PostalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The service knows no post office for this pincode.
    #[error("unknown pincode {0}")]
    NotFound(String),
}

/// Where a pincode is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalPlace {
    /// District, used as the city.
    pub city: String,
    pub state: String,
}

#[async_trait]
pub trait PostalLookup: Send + Sync {
    async fn lookup(&self, pincode: &Pincode) -> Result<PostalPlace, PostalError>;
}

#[derive(Debug, Deserialize)]
struct LookupEntry {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "PostOffice", default)]
    post_office: Option<Vec<PostOffice>>,
}

#[derive(Debug, Deserialize)]
struct PostOffice {
    #[serde(rename = "District")]
    district: String,
    #[serde(rename = "State")]
    state: String,
}

/// HTTP client for the postal lookup service.
#[derive(Clone)]
pub struct PostalClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PostalClient {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl PostalLookup for PostalClient {
    #[instrument(skip(self), fields(pincode = %pincode))]
    async fn lookup(&self, pincode: &Pincode) -> Result<PostalPlace, PostalError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{base}/pincode/{pincode}"))?;

        let entries: Vec<LookupEntry> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        entries
            .into_iter()
            .next()
            .filter(|entry| entry.status == "Success")
            .and_then(|entry| entry.post_office)
            .and_then(|offices| offices.into_iter().next())
            .map(|office| PostalPlace {
                city: office.district,
                state: office.state,
            })
            .ok_or_else(|| PostalError::NotFound(pincode.to_string()))
    }
}
