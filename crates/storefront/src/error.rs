//! Unified error handling with Sentry integration.
//!
//! Every module has its own error enum; `AppError` gathers them for callers
//! that drive several components (the CLI, an embedding front end).
//! [`AppError::report`] sends unexpected failures to Sentry and
//! [`AppError::user_message`] gives text safe to show a customer.

use thiserror::Error;

use crate::address::AddressBookError;
use crate::api::ApiError;
use crate::cache::CacheError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::services::auth::AuthError;
use crate::services::postal::PostalError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Store API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// On-device cache failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Address error: {0}")]
    Address(#[from] AddressBookError),

    #[error("Postal lookup error: {0}")]
    Postal(#[from] PostalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad input from the caller.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Whether this failure is ours rather than the customer's.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        match self {
            Self::Api(e) | Self::Checkout(CheckoutError::Remote(e)) => {
                e.is_server_error() || matches!(e, ApiError::Parse(_) | ApiError::Url(_))
            }
            Self::Cache(_)
            | Self::Checkout(CheckoutError::Cache(_))
            | Self::Address(AddressBookError::Cache(_))
            | Self::Auth(AuthError::Cache(_))
            | Self::Config(_) => true,
            _ => false,
        }
    }

    /// Capture unexpected failures to Sentry and log them.
    pub fn report(&self) {
        if self.is_unexpected() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Unexpected error"
            );
        } else {
            tracing::debug!(error = %self, "handled error");
        }
    }

    /// Text suitable for showing the customer.
    ///
    /// Internal details stay out of it.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::Unauthorized | ApiError::NotAuthenticated) => {
                "Please sign in to continue.".to_string()
            }
            Self::Api(ApiError::RateLimited(secs)) => {
                format!("Too many requests. Try again in {secs}s.")
            }
            Self::Api(ApiError::Api { status, message }) if *status < 500 && !message.is_empty() => {
                message.clone()
            }
            Self::Checkout(CheckoutError::Remote(_)) => "Payment service unavailable.".to_string(),
            Self::Checkout(e) => e.to_string(),
            Self::Auth(e) => e.user_message(),
            Self::Address(AddressBookError::Invalid(e)) => e.to_string(),
            Self::Address(AddressBookError::NothingSelected) => "Select an address first".to_string(),
            Self::Postal(_) => "Invalid pincode".to_string(),
            Self::NotFound(_) => "Not found.".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "add p1 x1", Some(&[("product_id", "p1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::from(CheckoutError::EmptyCart);
        assert_eq!(err.to_string(), "Checkout error: Your bag is empty");
    }

    #[test]
    fn test_only_our_failures_are_unexpected() {
        let server = AppError::from(ApiError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        });
        assert!(server.is_unexpected());

        let client = AppError::from(ApiError::Api {
            status: 400,
            message: "Out of stock".to_string(),
        });
        assert!(!client.is_unexpected());
        assert!(!AppError::from(ApiError::Unauthorized).is_unexpected());
        assert!(!AppError::from(CheckoutError::AddressRequired).is_unexpected());
    }

    #[test]
    fn test_user_messages_hide_internals() {
        let server = AppError::from(ApiError::Api {
            status: 500,
            message: "MongoError: connection refused".to_string(),
        });
        assert_eq!(server.user_message(), "Something went wrong. Please try again.");

        let client = AppError::from(ApiError::Api {
            status: 400,
            message: "Out of stock".to_string(),
        });
        assert_eq!(client.user_message(), "Out of stock");

        assert_eq!(
            AppError::from(ApiError::RateLimited(3)).user_message(),
            "Too many requests. Try again in 3s."
        );
        assert_eq!(
            AppError::from(CheckoutError::AddressRequired).user_message(),
            "Please provide shipping details first"
        );
    }
}
