//! End-to-end tests for ShopLane.
//!
//! Every test runs the real clients against a [`wiremock::MockServer`]
//! standing in for the store API, with the on-device cache in a temporary
//! directory. No external services are needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shoplane-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};
use shoplane_admin::AdminClient;
use shoplane_storefront::api::ApiClient;
use shoplane_storefront::cache::{FileCache, LocalCache};
use shoplane_storefront::cart::{CartStore, MutationFailurePolicy};
use shoplane_storefront::notify::Notifier;
use shoplane_storefront::session::Session;
use tempfile::TempDir;
use url::Url;
use wiremock::MockServer;

/// Credential accepted by the mock back office.
pub const ADMIN_TOKEN: &str = "adm_Kx81qLw2Zr5Nt7Pm";

/// A storefront wired to a mock server, with its cache on disk.
pub struct Storefront {
    pub dir: TempDir,
    pub cache: Arc<dyn LocalCache>,
    pub api: ApiClient,
    pub notifier: Notifier,
}

impl Storefront {
    /// Fresh device: empty cache directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn new(server: &MockServer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::reopen(server, dir)
    }

    /// Same device after a restart: whatever is in `dir` is restored.
    ///
    /// # Panics
    ///
    /// Panics if the cache directory cannot be opened.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn reopen(server: &MockServer, dir: TempDir) -> Self {
        let cache: Arc<dyn LocalCache> = Arc::new(FileCache::open(dir.path()).unwrap());
        let session = Session::restore(Arc::clone(&cache));
        let api = ApiClient::new(Url::parse(&server.uri()).unwrap(), session);
        Self {
            dir,
            cache,
            api,
            notifier: Notifier::default(),
        }
    }

    /// A cart store using the API as its remote. Needs a Tokio runtime.
    #[must_use]
    pub fn store(&self, policy: MutationFailurePolicy) -> CartStore {
        CartStore::new(
            Arc::clone(&self.cache),
            Arc::new(self.api.clone()),
            self.api.session().clone(),
            self.notifier.clone(),
            policy,
        )
    }
}

/// Back-office client for a mock server.
///
/// # Panics
///
/// Panics if the server URI is not a valid URL.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn admin_client(server: &MockServer) -> AdminClient {
    AdminClient::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from(ADMIN_TOKEN),
    )
}

/// Product JSON as the store API returns it.
#[must_use]
pub fn product_json(id: &str, name: &str, price: u32) -> Value {
    json!({
        "_id": id,
        "name": name,
        "brand": "ShopLane",
        "price": price,
        "originalPrice": price * 2,
        "images": [format!("uploads/{id}.jpg")],
        "sizes": ["S", "M", "L"],
        "stock": 12,
        "section": "men",
        "category": "clothing"
    })
}

/// Successful login response for `asha@example.com`.
#[must_use]
pub fn login_json() -> Value {
    json!({
        "success": true,
        "token": "tok_live_asha",
        "user": {"_id": "u1", "name": "Asha Rao", "email": "asha@example.com"}
    })
}
