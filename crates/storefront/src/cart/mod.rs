//! Cart and wishlist state container.
//!
//! # Architecture
//!
//! - In-memory state is authoritative for rendering and lives behind a
//!   `std::sync::Mutex` that is never held across an `.await`
//! - Every mutation writes the full cart and wishlist through to the
//!   [`LocalCache`] before it returns
//! - Remote mutations are queued on a single outbox task and reach the
//!   server in the order they were issued
//! - A remote fetch replaces both collections wholesale, unless a local
//!   mutation happened while the fetch was in flight
//! - Background tasks share one [`CancellationToken`]; [`CartStore::shutdown`]
//!   cancels and waits for them
//!
//! Mutation methods never return errors. Failures become [`Notice`]s and are
//! handled according to the store's [`MutationFailurePolicy`].
//!
//! [`Notice`]: crate::notify::Notice

mod outbox;
pub mod pricing;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use shoplane_core::{Product, ProductId, VariantKey};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument;

use crate::api::ApiError;
use crate::cache::{LocalCache, LocalCacheExt, keys};
use crate::error::add_breadcrumb;
use crate::models::{CartLine, LineKey, WishlistEntry};
use crate::notify::Notifier;
use crate::remote::RemoteStore;
use crate::session::Session;

use outbox::{Command, Mutation};
pub use pricing::{CartSummary, Pricing};

/// What happens locally when a queued remote mutation fails.
///
/// Either way the failure is logged and the user is notified. Unauthorized
/// responses are not subject to the policy: they always wipe local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationFailurePolicy {
    /// Keep the optimistic local state. The next successful fetch corrects it.
    #[default]
    KeepOptimistic,
    /// Re-fetch remote state once the outbox is empty, discarding the
    /// optimistic change.
    Reconcile,
}

impl std::str::FromStr for MutationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "keep_optimistic" | "optimistic" => Ok(Self::KeepOptimistic),
            "reconcile" | "refetch" => Ok(Self::Reconcile),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Result of an add operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An identical line or wishlist entry already exists; nothing changed.
    AlreadyPresent,
}

/// Result of a remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Not signed in; nothing to fetch.
    Skipped,
    /// Local state now mirrors the server.
    Synced,
    /// Local state changed during the fetch, so the response was discarded.
    Stale,
    /// The credential was rejected; local state and credential were wiped.
    Unauthorized,
    /// The fetch failed; local state is unchanged.
    Failed,
}

#[derive(Debug, Default)]
struct CartState {
    cart: Vec<CartLine>,
    wishlist: Vec<WishlistEntry>,
    loading: bool,
    next_revision: u64,
    /// Bumped on every local change; a fetch that straddles a bump is stale.
    mutation_seq: u64,
}

impl CartState {
    const fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

struct StoreInner {
    state: Mutex<CartState>,
    cache: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteStore>,
    session: Session,
    notifier: Notifier,
    policy: MutationFailurePolicy,
    outbox: mpsc::UnboundedSender<Command>,
    /// Mutations enqueued but not yet finished by the outbox.
    queued: AtomicUsize,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

// =============================================================================
// CartStore
// =============================================================================

/// Shared cart and wishlist container. Cheap to clone.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<StoreInner>,
}

impl CartStore {
    /// Create a store seeded from the cache and start its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        session: Session,
        notifier: Notifier,
        policy: MutationFailurePolicy,
    ) -> Self {
        let cart: Vec<CartLine> = cache.get(keys::CART).ok().flatten().unwrap_or_default();
        let wishlist: Vec<WishlistEntry> = cache
            .get(keys::WISHLIST)
            .ok()
            .flatten()
            .unwrap_or_default();
        let next_revision = cart.iter().map(|line| line.revision).max().unwrap_or(0);
        tracing::debug!(
            cart_lines = cart.len(),
            wishlist_entries = wishlist.len(),
            "seeded cart state from cache"
        );

        let state = CartState {
            cart,
            wishlist,
            loading: session.is_signed_in(),
            next_revision,
            mutation_seq: 0,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(StoreInner {
            state: Mutex::new(state),
            cache,
            remote,
            session,
            notifier,
            policy,
            outbox: tx,
            queued: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        inner.tasks.spawn(outbox::run(
            Arc::downgrade(&inner),
            rx,
            inner.cancel.child_token(),
        ));
        spawn_session_listener(&inner);

        Self { inner }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn cart(&self) -> Vec<CartLine> {
        self.inner.lock().cart.clone()
    }

    #[must_use]
    pub fn wishlist(&self) -> Vec<WishlistEntry> {
        self.inner.lock().wishlist.clone()
    }

    /// The line for `product_id` and `variant`, if present.
    #[must_use]
    pub fn line(&self, product_id: &ProductId, variant: Option<VariantKey>) -> Option<CartLine> {
        let key = LineKey::new(product_id.clone(), variant);
        self.inner
            .lock()
            .cart
            .iter()
            .find(|line| line.matches(&key))
            .cloned()
    }

    #[must_use]
    pub fn in_wishlist(&self, product_id: &ProductId) -> bool {
        self.inner
            .lock()
            .wishlist
            .iter()
            .any(|entry| &entry.product.id == product_id)
    }

    #[must_use]
    pub fn summary(&self, pricing: &Pricing) -> CartSummary {
        pricing.summarize(&self.inner.lock().cart)
    }

    /// Whether the initial remote fetch is still outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    #[must_use]
    pub fn policy(&self) -> MutationFailurePolicy {
        self.inner.policy
    }

    // -------------------------------------------------------------------------
    // Cart mutations
    // -------------------------------------------------------------------------

    /// Add one unit of `product` as a new line.
    ///
    /// A line with the same product and variant is left untouched.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn add_item(&self, product: &Product, variant: Option<VariantKey>) -> AddOutcome {
        let key = LineKey::new(product.id.clone(), variant);
        {
            let mut state = self.inner.lock();
            if state.cart.iter().any(|line| line.matches(&key)) {
                drop(state);
                self.inner.notifier.info("Item already in bag!");
                return AddOutcome::AlreadyPresent;
            }
            let revision = state.bump_revision();
            state
                .cart
                .push(CartLine::new(product.clone(), key.variant.clone(), revision));
            self.inner.commit(&mut state);
        }

        add_breadcrumb("cart", "Added to bag", Some(&[("line", &key.to_string())]));
        self.inner.notifier.success("Added to bag!");
        self.inner.enqueue(Mutation::AddLine { key, quantity: 1 });
        AddOutcome::Added
    }

    /// Remove the line for `product_id` and `variant`.
    #[instrument(skip(self))]
    pub fn remove_item(&self, product_id: &ProductId, variant: Option<VariantKey>) {
        let key = LineKey::new(product_id.clone(), variant);
        {
            let mut state = self.inner.lock();
            let before = state.cart.len();
            state.cart.retain(|line| !line.matches(&key));
            if state.cart.len() == before {
                tracing::debug!(line = %key, "remove for absent line");
            }
            self.inner.commit(&mut state);
        }

        add_breadcrumb("cart", "Removed from bag", Some(&[("line", &key.to_string())]));
        self.inner.notifier.error("Removed from bag.");
        self.inner.enqueue(Mutation::RemoveLine { key });
    }

    /// Set the quantity of an existing line. Quantities below 1 are ignored.
    #[instrument(skip(self))]
    pub fn update_quantity(&self, product_id: &ProductId, quantity: u32, variant: Option<VariantKey>) {
        if quantity < 1 {
            return;
        }
        let key = LineKey::new(product_id.clone(), variant);
        let revision = {
            let mut state = self.inner.lock();
            let Some(index) = state.cart.iter().position(|line| line.matches(&key)) else {
                tracing::debug!(line = %key, "quantity update for absent line");
                return;
            };
            let revision = state.bump_revision();
            if let Some(line) = state.cart.get_mut(index) {
                line.quantity = quantity;
                line.revision = revision;
            }
            self.inner.commit(&mut state);
            revision
        };

        self.inner.enqueue(Mutation::UpdateQuantity {
            key,
            quantity,
            revision,
        });
    }

    // -------------------------------------------------------------------------
    // Wishlist mutations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn add_to_wishlist(&self, product: &Product) -> AddOutcome {
        {
            let mut state = self.inner.lock();
            if state.wishlist.iter().any(|e| e.product.id == product.id) {
                drop(state);
                self.inner.notifier.info("Already in wishlist!");
                return AddOutcome::AlreadyPresent;
            }
            state.wishlist.push(WishlistEntry {
                product: product.clone(),
            });
            self.inner.commit(&mut state);
        }

        self.inner.notifier.success("Added to wishlist!");
        self.inner.enqueue(Mutation::AddWish {
            product_id: product.id.clone(),
        });
        AddOutcome::Added
    }

    #[instrument(skip(self))]
    pub fn remove_from_wishlist(&self, product_id: &ProductId) {
        {
            let mut state = self.inner.lock();
            state.wishlist.retain(|e| &e.product.id != product_id);
            self.inner.commit(&mut state);
        }

        self.inner.notifier.error("Removed from wishlist.");
        self.inner.enqueue(Mutation::RemoveWish {
            product_id: product_id.clone(),
        });
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    /// Replace cart and wishlist with the server's view.
    ///
    /// Queued mutations are flushed first so the server has seen them.
    pub async fn fetch_remote_state(&self) -> SyncOutcome {
        self.settle().await;
        self.inner.fetch().await
    }

    /// Wipe cart, wishlist and credential from memory and cache (logout).
    pub fn clear_all(&self) {
        self.inner.wipe_local();
        self.inner.session.sign_out();
    }

    /// Empty the cart after a successful order.
    ///
    /// The remote cart is emptied first; local cart state is cleared whether
    /// or not that succeeds. The wishlist is kept.
    #[instrument(skip(self))]
    pub async fn clear_after_order(&self) {
        self.settle().await;
        if self.inner.session.is_signed_in()
            && let Err(e) = self.inner.remote.empty_cart().await
        {
            tracing::warn!(error = %e, "failed to empty remote cart after order");
        }
        let mut state = self.inner.lock();
        state.cart.clear();
        self.inner.commit(&mut state);
        drop(state);
        tracing::info!("cart cleared after order");
    }

    /// Wait until every mutation queued so far has been sent.
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.outbox.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Re-fetch remote state every `period` until shutdown.
    pub fn spawn_reconciler(&self, period: Duration) {
        let store = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.child_token();
        self.inner.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = store.upgrade() else { break };
                let outcome = CartStore { inner }.fetch_remote_state().await;
                tracing::debug!(?outcome, "periodic reconciliation");
            }
        });
    }

    /// Cancel background work and wait for it to stop.
    ///
    /// In-flight remote calls are abandoned and their results discarded.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        tracing::debug!("cart store stopped");
    }
}

// =============================================================================
// StoreInner
// =============================================================================

impl StoreInner {
    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a local change and write it through to the cache.
    fn commit(&self, state: &mut CartState) {
        state.mutation_seq += 1;
        self.persist(state);
    }

    fn persist(&self, state: &CartState) {
        if let Err(e) = self.cache.set(keys::CART, &state.cart) {
            tracing::warn!(error = %e, "failed to write cart to cache");
        }
        if let Err(e) = self.cache.set(keys::WISHLIST, &state.wishlist) {
            tracing::warn!(error = %e, "failed to write wishlist to cache");
        }
    }

    fn enqueue(&self, mutation: Mutation) {
        if !self.session.is_signed_in() {
            return;
        }
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.outbox.send(Command::Mutation(mutation)).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("outbox closed; remote mutation dropped");
        }
    }

    /// Clear cart and wishlist in memory and cache. The session is untouched.
    fn wipe_local(&self) {
        let mut state = self.lock();
        state.cart.clear();
        state.wishlist.clear();
        state.loading = false;
        state.mutation_seq += 1;
        drop(state);
        for key in [keys::CART, keys::WISHLIST] {
            if let Err(e) = self.cache.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove cache entry");
            }
        }
    }

    /// The server rejected our credential: forget everything.
    fn handle_unauthorized(&self) {
        tracing::warn!("credential rejected; clearing local state");
        self.wipe_local();
        self.session.sign_out();
    }

    async fn fetch(&self) -> SyncOutcome {
        if !self.session.is_signed_in() {
            self.lock().loading = false;
            return SyncOutcome::Skipped;
        }

        let started_at = self.lock().mutation_seq;
        let result = tokio::select! {
            () = self.cancel.cancelled() => return SyncOutcome::Stale,
            result = async {
                tokio::try_join!(self.remote.fetch_cart(), self.remote.fetch_wishlist())
            } => result,
        };

        match result {
            Ok((cart, wishlist)) => {
                let mut state = self.lock();
                state.loading = false;
                if self.cancel.is_cancelled()
                    || state.mutation_seq != started_at
                    || self.queued.load(Ordering::SeqCst) > 0
                {
                    tracing::debug!("discarding stale remote state");
                    return SyncOutcome::Stale;
                }
                let mut cart = cart;
                let mut revision = state.next_revision;
                for line in &mut cart {
                    revision += 1;
                    line.revision = revision;
                }
                state.next_revision = revision;
                state.cart = cart;
                state.wishlist = wishlist;
                self.persist(&state);
                tracing::debug!(
                    cart_lines = state.cart.len(),
                    wishlist_entries = state.wishlist.len(),
                    "synced remote state"
                );
                SyncOutcome::Synced
            }
            Err(ApiError::Unauthorized) => {
                self.handle_unauthorized();
                SyncOutcome::Unauthorized
            }
            Err(e) => {
                self.lock().loading = false;
                tracing::error!(error = %e, "failed to fetch remote cart state");
                SyncOutcome::Failed
            }
        }
    }
}

/// Follow session changes: wipe on sign-out, reload on sign-in.
fn spawn_session_listener(inner: &Arc<StoreInner>) {
    let store: Weak<StoreInner> = Arc::downgrade(inner);
    let cancel = inner.cancel.child_token();
    let mut rx = inner.session.subscribe();
    rx.mark_unchanged();
    inner.tasks.spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let signed_in = rx.borrow_and_update().is_some();
            let Some(inner) = store.upgrade() else { break };
            if signed_in {
                tracing::debug!("session started; loading remote state");
                let outcome = CartStore { inner }.fetch_remote_state().await;
                tracing::debug!(?outcome, "post sign-in sync");
            } else {
                tracing::debug!("session ended; clearing local state");
                inner.wipe_local();
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
