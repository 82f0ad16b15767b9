//! Command implementations.

use std::io::Write;

use shoplane_admin::AdminError;
use shoplane_storefront::error::AppError;
use thiserror::Error;

pub mod admin;
pub mod shop;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Storefront(#[from] AppError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error("admin configuration: {0}")]
    AdminConfig(#[from] shoplane_admin::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Send unexpected failures to Sentry.
    pub fn report(&self) {
        match self {
            Self::Storefront(e) => e.report(),
            Self::Admin(e) => e.report(),
            Self::AdminConfig(_) | Self::Io(_) => {}
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Storefront(e) => e.user_message(),
            Self::Admin(e) => e.operator_message(),
            other => other.to_string(),
        }
    }
}

/// Route the storefront's per-module errors through [`AppError`].
macro_rules! storefront_errors {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CliError {
                fn from(e: $ty) -> Self {
                    Self::Storefront(e.into())
                }
            }
        )*
    };
}

storefront_errors!(
    shoplane_storefront::api::ApiError,
    shoplane_storefront::cache::CacheError,
    shoplane_storefront::checkout::CheckoutError,
    shoplane_storefront::services::auth::AuthError,
    shoplane_storefront::address::AddressBookError,
    shoplane_storefront::services::postal::PostalError,
    shoplane_storefront::config::ConfigError,
);

pub type CliResult = Result<(), CliError>;

/// Print the failure for the person at the terminal.
pub fn fail(error: &CliError) {
    let _ = writeln!(std::io::stderr().lock(), "error: {}", error.user_message());
}

/// Command output on stdout. Logs go to stderr.
pub struct Out(std::io::Stdout);

impl Default for Out {
    fn default() -> Self {
        Self::new()
    }
}

impl Out {
    pub fn new() -> Self {
        Self(std::io::stdout())
    }

    pub fn line(&mut self, text: impl std::fmt::Display) -> std::io::Result<()> {
        writeln!(self.0.lock(), "{text}")
    }
}
