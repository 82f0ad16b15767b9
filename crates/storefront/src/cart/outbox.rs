//! Ordered delivery of cart mutations to the remote store.
//!
//! One task drains the queue, so the server sees mutations in the order the
//! user made them. A quantity update whose line has since changed again is
//! skipped: the later update is already queued behind it.

use std::sync::Weak;
use std::sync::atomic::Ordering;

use shoplane_core::ProductId;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{MutationFailurePolicy, StoreInner};
use crate::api::ApiError;
use crate::error::add_breadcrumb;
use crate::models::LineKey;

pub(super) enum Command {
    Mutation(Mutation),
    /// Acknowledged once every earlier command has been handled.
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone)]
pub(super) enum Mutation {
    AddLine {
        key: LineKey,
        quantity: u32,
    },
    RemoveLine {
        key: LineKey,
    },
    UpdateQuantity {
        key: LineKey,
        quantity: u32,
        revision: u64,
    },
    AddWish {
        product_id: ProductId,
    },
    RemoveWish {
        product_id: ProductId,
    },
}

impl Mutation {
    const fn label(&self) -> &'static str {
        match self {
            Self::AddLine { .. } => "add to bag",
            Self::RemoveLine { .. } => "remove from bag",
            Self::UpdateQuantity { .. } => "update quantity",
            Self::AddWish { .. } => "add to wishlist",
            Self::RemoveWish { .. } => "remove from wishlist",
        }
    }
}

pub(super) async fn run(
    store: Weak<StoreInner>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let mut reconcile_pending = false;

    loop {
        let command = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        let Some(inner) = store.upgrade() else { break };

        let ack = match command {
            Command::Flush(ack) => Some(ack),
            Command::Mutation(mutation) => {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = deliver(&inner, &mutation) => result,
                };
                inner.queued.fetch_sub(1, Ordering::SeqCst);
                if let Some(Err(e)) = result {
                    reconcile_pending |= handle_failure(&inner, &mutation, &e);
                }
                None
            }
        };

        if reconcile_pending && inner.queued.load(Ordering::SeqCst) == 0 {
            reconcile_pending = false;
            let outcome = inner.fetch().await;
            tracing::debug!(?outcome, "reconciled after failed mutation");
        }

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    tracing::debug!("cart outbox stopped");
}

/// Send one mutation. `None` means it was skipped.
async fn deliver(inner: &StoreInner, mutation: &Mutation) -> Option<Result<(), ApiError>> {
    if !inner.session.is_signed_in() {
        tracing::debug!(mutation = mutation.label(), "signed out; dropping mutation");
        return None;
    }

    let remote = inner.remote.as_ref();
    let result = match mutation {
        Mutation::AddLine { key, quantity } => remote.add_to_cart(key, *quantity).await,
        Mutation::RemoveLine { key } => remote.remove_from_cart(key).await,
        Mutation::UpdateQuantity {
            key,
            quantity,
            revision,
        } => {
            let current = inner
                .lock()
                .cart
                .iter()
                .find(|line| line.matches(key))
                .map(|line| line.revision);
            if current != Some(*revision) {
                tracing::debug!(line = %key, revision, ?current, "skipping superseded update");
                return None;
            }
            remote.update_quantity(key, *quantity).await
        }
        Mutation::AddWish { product_id } => remote.add_to_wishlist(product_id).await,
        Mutation::RemoveWish { product_id } => remote.remove_from_wishlist(product_id).await,
    };
    Some(result)
}

/// Apply the failure policy. Returns whether a reconcile should follow.
fn handle_failure(inner: &StoreInner, mutation: &Mutation, error: &ApiError) -> bool {
    match error {
        ApiError::Unauthorized => {
            inner.handle_unauthorized();
            inner.notifier.error("Session expired. Please sign in again.");
            false
        }
        ApiError::NotAuthenticated => {
            tracing::debug!(mutation = mutation.label(), "signed out mid-flight; dropped");
            false
        }
        other => {
            tracing::warn!(
                mutation = mutation.label(),
                error = %other,
                policy = ?inner.policy,
                "remote mutation failed"
            );
            add_breadcrumb(
                "cart",
                "Remote mutation failed",
                Some(&[("mutation", mutation.label()), ("error", &other.to_string())]),
            );
            match inner.policy {
                MutationFailurePolicy::KeepOptimistic => {
                    inner
                        .notifier
                        .error("Couldn't sync your bag. Changes are saved on this device.");
                    false
                }
                MutationFailurePolicy::Reconcile => {
                    inner
                        .notifier
                        .error("Couldn't sync your bag. Restoring your saved bag.");
                    true
                }
            }
        }
    }
}
