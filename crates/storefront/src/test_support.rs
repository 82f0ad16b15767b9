//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use shoplane_core::{Email, Money, Product, ProductId, UserId, UserProfile, UserRole};

use crate::api::ApiError;
use crate::cache::{LocalCache, MemoryCache};
use crate::cart::{CartStore, MutationFailurePolicy};
use crate::models::{CartLine, LineKey, WishlistEntry};
use crate::notify::Notifier;
use crate::remote::RemoteStore;
use crate::session::{Identity, Session};

pub fn sample_identity() -> Identity {
    Identity {
        token: SecretString::from("tok_123"),
        user: UserProfile {
            id: UserId::new("u1"),
            name: "Asha Rao".to_string(),
            email: Email::parse("asha@shop.in").unwrap(),
            role: UserRole::User,
            phone: None,
            created_at: None,
        },
    }
}

pub fn product(id: &str, price: i64) -> Product {
    let mut product = Product::new(id, format!("Product {id}"), Money::from_major(price));
    product.images = vec![format!("uploads/{id}.jpg")];
    product
}

/// How the fake remote should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Server,
    Unauthorized,
}

impl Failure {
    fn to_error(self) -> ApiError {
        match self {
            Self::Server => ApiError::Api {
                status: 500,
                message: "boom".to_string(),
            },
            Self::Unauthorized => ApiError::Unauthorized,
        }
    }
}

#[derive(Default)]
struct FakeState {
    cart: Vec<CartLine>,
    wishlist: Vec<WishlistEntry>,
    calls: Vec<String>,
    fail_mutations: Option<Failure>,
    fail_fetch: Option<Failure>,
}

/// In-memory [`RemoteStore`] that records every call.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_cart(lines: Vec<CartLine>) -> Arc<Self> {
        let fake = Self::default();
        fake.state.lock().unwrap().cart = lines;
        Arc::new(fake)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn remote_cart(&self) -> Vec<CartLine> {
        self.state.lock().unwrap().cart.clone()
    }

    pub fn fail_mutations(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().fail_mutations = failure;
    }

    pub fn fail_fetch(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().fail_fetch = failure;
    }

    fn mutate(
        &self,
        call: String,
        apply: impl FnOnce(&mut FakeState),
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(failure) = state.fail_mutations {
            return Err(failure.to_error());
        }
        apply(&mut state);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("fetch_cart".to_string());
        match state.fail_fetch {
            Some(failure) => Err(failure.to_error()),
            None => Ok(state.cart.clone()),
        }
    }

    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        let state = self.state.lock().unwrap();
        match state.fail_fetch {
            Some(failure) => Err(failure.to_error()),
            None => Ok(state.wishlist.clone()),
        }
    }

    async fn add_to_cart(&self, key: &LineKey, quantity: u32) -> Result<(), ApiError> {
        let key = key.clone();
        self.mutate(format!("add {key} x{quantity}"), |state| {
            let mut line = CartLine::new(product(key.product_id.as_str(), 500), key.variant, 0);
            line.quantity = quantity;
            state.cart.push(line);
        })
    }

    async fn remove_from_cart(&self, key: &LineKey) -> Result<(), ApiError> {
        self.mutate(format!("remove {key}"), |state| {
            state.cart.retain(|line| !line.matches(key));
        })
    }

    async fn update_quantity(&self, key: &LineKey, quantity: u32) -> Result<(), ApiError> {
        self.mutate(format!("update {key} x{quantity}"), |state| {
            if let Some(line) = state.cart.iter_mut().find(|line| line.matches(key)) {
                line.quantity = quantity;
            }
        })
    }

    async fn empty_cart(&self) -> Result<(), ApiError> {
        self.mutate("empty".to_string(), |state| state.cart.clear())
    }

    async fn add_to_wishlist(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let id = product_id.clone();
        self.mutate(format!("wish+ {product_id}"), |state| {
            state.wishlist.push(WishlistEntry {
                product: product(id.as_str(), 500),
            });
        })
    }

    async fn remove_from_wishlist(&self, product_id: &ProductId) -> Result<(), ApiError> {
        self.mutate(format!("wish- {product_id}"), |state| {
            state.wishlist.retain(|e| &e.product.id != product_id);
        })
    }
}

/// Everything a cart test needs, wired together.
pub struct Harness {
    pub cache: Arc<dyn LocalCache>,
    pub remote: Arc<FakeRemote>,
    pub session: Session,
    pub notifier: Notifier,
    pub store: CartStore,
}

impl Harness {
    /// A signed-in store over `remote` with the given failure policy.
    pub fn signed_in(remote: Arc<FakeRemote>, policy: MutationFailurePolicy) -> Self {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let session = Session::restore(Arc::clone(&cache));
        session.sign_in(sample_identity()).unwrap();
        Self::build(cache, remote, session, policy)
    }

    pub fn signed_out(remote: Arc<FakeRemote>) -> Self {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let session = Session::restore(Arc::clone(&cache));
        Self::build(cache, remote, session, MutationFailurePolicy::default())
    }

    pub fn build(
        cache: Arc<dyn LocalCache>,
        remote: Arc<FakeRemote>,
        session: Session,
        policy: MutationFailurePolicy,
    ) -> Self {
        let notifier = Notifier::default();
        let store = CartStore::new(
            Arc::clone(&cache),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            session.clone(),
            notifier.clone(),
            policy,
        );
        Self {
            cache,
            remote,
            session,
            notifier,
            store,
        }
    }
}
