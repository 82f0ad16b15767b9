//! HTTP client for the ShopLane REST API.
//!
//! # Architecture
//!
//! - One shared `reqwest::Client` behind an `Arc`, so clones are cheap
//! - Every request carries `Authorization: Bearer <token>` when the session
//!   holds a credential; [`ApiClient::authed`] refuses to build a request
//!   without one
//! - Status codes are mapped to [`ApiError`] in one place so callers can
//!   branch on `Unauthorized` without inspecting responses
//!
//! Endpoint wrappers live next to the component that uses them
//! (`remote`, `checkout`, `catalog`, `services::*`).

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::session::Session;

/// Errors that can occur when talking to the remote store.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The server rejected the credential.
    #[error("Unauthorized")]
    Unauthorized,

    /// The operation needs a signed-in user and there is none.
    #[error("Not signed in")]
    NotAuthenticated,

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the error means the credential is missing or no longer valid.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::NotAuthenticated)
    }

    /// Whether the server (rather than the client or the network) failed.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the ShopLane REST API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: Url, session: Session) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                client: reqwest::Client::new(),
                base_url,
                session,
            }),
        }
    }

    /// API origin, also used to resolve relative image paths.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Session whose credential this client sends.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Resolve an API path (e.g. `/api/cart`) against the base URL.
    ///
    /// The path is appended, so a base URL with a path prefix is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?)
    }

    /// Start a request, attaching the bearer token if there is one.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match self.inner.session.token() {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Start a request that requires a signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAuthenticated`] when there is no credential.
    pub(crate) fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let Some(token) = self.inner.session.token() else {
            return Err(ApiError::NotAuthenticated);
        };
        Ok(self
            .inner
            .client
            .request(method, self.url(path)?)
            .bearer_auth(token.expose_secret()))
    }

    /// Send and decode a JSON response.
    #[instrument(skip_all)]
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = check_status(builder.send().await?).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse API response"
            );
            ApiError::Parse(e)
        })
    }

    /// Send and discard the response body.
    #[instrument(skip_all)]
    pub(crate) async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        check_status(builder.send().await?).await?;
        Ok(())
    }

    /// `GET` a JSON document from a public endpoint.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        self.send(self.request(Method::GET, url)).await
    }

    /// Send a JSON body to an endpoint that requires a signed-in user.
    pub(crate) async fn authed_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.authed(method, path)?.json(body)).await
    }
}

/// Map non-success statuses to [`ApiError`].
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ApiError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::warn!(status = %status, %message, "API returned non-success status");
    Err(ApiError::Api {
        status: status.as_u16(),
        message,
    })
}

/// The server reports failures as `{"message": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| body.chars().take(200).collect(),
        |parsed| parsed.message,
    )
}
