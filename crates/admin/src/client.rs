//! HTTP client for the store's back-office endpoints.
//!
//! Every request carries the admin bearer credential. Domain modules
//! (`orders`, `inventory`, `products`, `customers`) add their endpoints as
//! `impl AdminClient` blocks next to the types they work with.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::config::AdminConfig;
use crate::error::AdminError;

/// Back-office API client. Cheap to clone.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl AdminClient {
    #[must_use]
    pub fn new(base_url: Url, token: SecretString) -> Self {
        Self {
            inner: Arc::new(AdminClientInner {
                client: reqwest::Client::new(),
                base_url,
                token,
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &AdminConfig) -> Self {
        Self::new(config.api_url.clone(), config.token.clone())
    }

    /// Resolve an API path against the base URL, keeping any path prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, AdminError> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, AdminError> {
        Ok(self
            .inner
            .client
            .request(method, self.url(path)?)
            .bearer_auth(self.inner.token.expose_secret()))
    }

    /// Send and decode a JSON response.
    #[instrument(skip_all)]
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, AdminError> {
        let response = check_status(builder.send().await?).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse admin API response"
            );
            AdminError::Parse(e)
        })
    }

    /// Send and discard the response body.
    #[instrument(skip_all)]
    pub(crate) async fn send_empty(&self, builder: RequestBuilder) -> Result<(), AdminError> {
        check_status(builder.send().await?).await?;
        Ok(())
    }
}

/// Map non-success statuses to [`AdminError`].
async fn check_status(response: Response) -> Result<Response, AdminError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::warn!(status = %status, %message, "admin API returned non-success status");

    Err(match status {
        StatusCode::UNAUTHORIZED => AdminError::Unauthorized,
        StatusCode::FORBIDDEN => AdminError::Forbidden(message),
        StatusCode::NOT_FOUND => AdminError::NotFound(message),
        _ => AdminError::Api {
            status: status.as_u16(),
            message,
        },
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use wiremock::MockServer;

    use super::*;

    pub(crate) const TOKEN: &str = "adm_9fQ2xT7kLm4Rz8Vb";

    pub(crate) fn client(server: &MockServer) -> AdminClient {
        AdminClient::new(
            Url::parse(&server.uri()).unwrap(),
            SecretString::from(TOKEN),
        )
    }

    #[test]
    fn test_url_keeps_base_path_prefix() {
        let client = AdminClient::new(
            Url::parse("https://shop.example/backend/").unwrap(),
            SecretString::from(TOKEN),
        );
        assert_eq!(
            client.url("/api/payment/all-orders").unwrap().as_str(),
            "https://shop.example/backend/api/payment/all-orders"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Admin only"}"#), "Admin only");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
