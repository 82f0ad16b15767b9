//! Authentication error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::cache::CacheError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] shoplane_core::EmailError),

    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    #[error("name cannot be empty")]
    MissingName,

    /// The server answered but declined, with its own message.
    #[error("{0}")]
    Rejected(String),

    /// The response claimed success but carried no credential.
    #[error("response did not include a session")]
    MissingSession,

    #[error(transparent)]
    Api(#[from] ApiError),

    /// Signed in remotely but the credential could not be stored.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AuthError {
    /// Text suitable for a toast.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::Api { message, .. }) | Self::Rejected(message)
                if !message.is_empty() =>
            {
                message.clone()
            }
            Self::Api(_) => "Something went wrong. Please try again.".to_string(),
            Self::Cache(_) => "Signed in, but this device could not remember you.".to_string(),
            other => other.to_string(),
        }
    }
}
