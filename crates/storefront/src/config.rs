//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPLANE_API_URL` - Base URL of the store API (e.g. `https://api.shoplane.in`)
//!
//! ## Optional
//! - `SHOPLANE_CACHE_DIR` - Directory for the on-device cache (default: `.shoplane`)
//! - `SHOPLANE_POSTAL_URL` - Pincode lookup service (default: `https://api.postalpincode.in`)
//! - `RAZORPAY_KEY_ID` - Publishable payment gateway key
//! - `SHOPLANE_PLATFORM_FEE` - Flat fee per non-empty cart (default: 20)
//! - `SHOPLANE_FAILURE_POLICY` - `keep` or `reconcile` (default: keep)
//! - `SHOPLANE_RECONCILE_SECS` - Periodic cart refresh interval, disabled when unset
//! - `SHOPLANE_CONFIRMATION_MS` - Order confirmation stage delays (default: `2000,3000,2500`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use shoplane_core::Money;
use thiserror::Error;
use url::Url;

use crate::cart::MutationFailurePolicy;
use crate::cart::pricing::Pricing;
use crate::checkout::ConfirmationTimings;
use crate::services::postal::DEFAULT_POSTAL_URL;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Store API base URL
    pub api_url: Url,
    /// Directory holding the on-device cache
    pub cache_dir: PathBuf,
    /// Pincode lookup base URL
    pub postal_url: Url,
    /// Payment gateway publishable key (not a secret)
    pub razorpay_key_id: Option<String>,
    pub pricing: Pricing,
    pub failure_policy: MutationFailurePolicy,
    /// Periodic reconciliation, if enabled
    pub reconcile_interval: Option<Duration>,
    /// Pauses between the stages shown after an order is placed
    pub confirmation: ConfirmationTimings,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&env);

        let api_url = env.url("SHOPLANE_API_URL", None)?;
        let postal_url = env.url("SHOPLANE_POSTAL_URL", Some(DEFAULT_POSTAL_URL))?;
        let cache_dir = PathBuf::from(env.or_default("SHOPLANE_CACHE_DIR", ".shoplane"));

        let defaults = Pricing::default();
        let pricing = Pricing {
            platform_fee: env.money("SHOPLANE_PLATFORM_FEE", defaults.platform_fee)?,
        };

        let failure_policy = match env.optional("SHOPLANE_FAILURE_POLICY") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidEnvVar("SHOPLANE_FAILURE_POLICY".into(), e))?,
            None => MutationFailurePolicy::default(),
        };

        let reconcile_interval = env
            .optional("SHOPLANE_RECONCILE_SECS")
            .map(|raw| {
                raw.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    ConfigError::InvalidEnvVar("SHOPLANE_RECONCILE_SECS".into(), e.to_string())
                })
            })
            .transpose()?
            .filter(|d| !d.is_zero());

        let confirmation = match env.optional("SHOPLANE_CONFIRMATION_MS") {
            Some(raw) => ConfirmationTimings::parse_millis(&raw)
                .map_err(|e| ConfigError::InvalidEnvVar("SHOPLANE_CONFIRMATION_MS".into(), e))?,
            None => ConfirmationTimings::default(),
        };

        Ok(Self {
            api_url,
            cache_dir,
            postal_url,
            razorpay_key_id: env.optional("RAZORPAY_KEY_ID"),
            pricing,
            failure_policy,
            reconcile_interval,
            confirmation,
            sentry_dsn: env.optional("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable, treating blank as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get an absolute URL. Without a default the variable is required.
    fn url(&self, key: &str, default: Option<&str>) -> Result<Url, ConfigError> {
        let raw = match (self.optional(key), default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => return Err(ConfigError::MissingEnvVar(key.to_string())),
        };
        let url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(url)
    }

    /// Get a non-negative whole-rupee amount.
    fn money(&self, key: &str, default: Money) -> Result<Money, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        raw.parse::<u32>()
            .map(|units| Money::from_major(i64::from(units)))
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}
