//! Unified error handling for admin.

use shoplane_core::OrderStatus;
use thiserror::Error;

use crate::products::BulkError;

/// Application-level error type for the back office.
#[derive(Debug, Error)]
pub enum AdminError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The credential is missing, expired or not an admin's.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Status may only move forward through the fulfilment pipeline.
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Bulk import text could not be parsed.
    #[error(transparent)]
    Bulk(#[from] BulkError),

    /// Bad input from the operator.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AdminError {
    /// Capture server-side failures to Sentry and log them.
    pub fn report(&self) {
        if matches!(
            self,
            Self::Http(_) | Self::Parse(_) | Self::Api { status: 500.., .. }
        ) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        } else {
            tracing::warn!(error = %self, "admin operation rejected");
        }
    }

    /// Text for the operator. Server internals are not exposed.
    #[must_use]
    pub fn operator_message(&self) -> String {
        match self {
            Self::Http(_) => "Store API unreachable".to_string(),
            Self::Parse(_) | Self::Url(_) => "Internal error".to_string(),
            Self::Api { status, .. } if *status >= 500 => "Internal Server Error".to_string(),
            Self::Api { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}

/// Result type alias for `AdminError`.
pub type Result<T> = std::result::Result<T, AdminError>;
