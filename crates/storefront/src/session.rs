//! Signed-in identity, shared across components.
//!
//! The session is the single source of truth for "who is signed in". It
//! persists the credential and profile to the local cache and publishes
//! every change on a `watch` channel, so the cart container can reload or
//! wipe itself when the identity changes instead of polling the cache.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use shoplane_core::UserProfile;
use tokio::sync::watch;

use crate::cache::{CacheError, LocalCache, LocalCacheExt, keys};
use crate::error::{clear_sentry_user, set_sentry_user};

/// A credential together with the profile it belongs to.
#[derive(Clone)]
pub struct Identity {
    pub token: SecretString,
    pub user: UserProfile,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.token.expose_secret() == other.token.expose_secret()
    }
}

struct Inner {
    cache: Arc<dyn LocalCache>,
    tx: watch::Sender<Option<Identity>>,
}

/// Shared session context. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Build a session from whatever credential the cache holds.
    ///
    /// A token without a decodable profile (or the reverse) is ignored.
    #[must_use]
    pub fn restore(cache: Arc<dyn LocalCache>) -> Self {
        let identity = read_identity(cache.as_ref());
        if let Some(identity) = &identity {
            tracing::debug!(user_id = %identity.user.id, "restored session from cache");
        }
        let (tx, _) = watch::channel(identity);
        Self {
            inner: Arc::new(Inner { cache, tx }),
        }
    }

    /// The current identity, if signed in.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.inner.tx.borrow().clone()
    }

    /// The current bearer token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.inner.tx.borrow().as_ref().map(|id| id.token.clone())
    }

    /// The current profile, if signed in.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.inner.tx.borrow().as_ref().map(|id| id.user.clone())
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.inner.tx.borrow().is_some()
    }

    /// Persist `identity` and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be written to the cache.
    /// The in-memory session is not changed in that case.
    pub fn sign_in(&self, identity: Identity) -> Result<(), CacheError> {
        self.inner
            .cache
            .set(keys::TOKEN, identity.token.expose_secret())?;
        self.inner.cache.set(keys::USER, &identity.user)?;

        set_sentry_user(&identity.user.id, Some(identity.user.email.as_str()));
        tracing::info!(user_id = %identity.user.id, "signed in");
        self.inner.tx.send_replace(Some(identity));
        Ok(())
    }

    /// Drop the credential from memory and cache.
    ///
    /// Subscribers are only notified when someone was actually signed in, so
    /// calling this from a subscriber does not loop.
    pub fn sign_out(&self) {
        for key in [keys::TOKEN, keys::USER] {
            if let Err(e) = self.inner.cache.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove credential from cache");
            }
        }
        let changed = self.inner.tx.send_if_modified(|current| {
            if current.is_some() {
                *current = None;
                true
            } else {
                false
            }
        });
        if changed {
            clear_sentry_user();
            tracing::info!("signed out");
        }
    }

    /// Replace the cached profile after a profile update.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be written to the cache.
    pub fn update_user(&self, user: UserProfile) -> Result<(), CacheError> {
        let Some(mut identity) = self.current() else {
            return Ok(());
        };
        self.inner.cache.set(keys::USER, &user)?;
        identity.user = user;
        self.inner.tx.send_replace(Some(identity));
        Ok(())
    }

    /// Re-read the credential from the cache, e.g. after another process
    /// sharing the cache directory signed in or out.
    pub fn resync_from_cache(&self) {
        let identity = read_identity(self.inner.cache.as_ref());
        self.inner.tx.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }

    /// Subscribe to identity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.tx.subscribe()
    }
}

fn read_identity(cache: &dyn LocalCache) -> Option<Identity> {
    let token: String = cache.get(keys::TOKEN).ok().flatten()?;
    let user: UserProfile = cache.get(keys::USER).ok().flatten()?;
    Some(Identity {
        token: SecretString::from(token),
        user,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::test_support::sample_identity;

    #[test]
    fn test_sign_in_persists_and_restores() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let session = Session::restore(Arc::clone(&cache));
        assert!(!session.is_signed_in());

        session.sign_in(sample_identity()).unwrap();
        assert!(session.is_signed_in());

        let restored = Session::restore(cache);
        assert_eq!(restored.user().unwrap().name, "Asha Rao");
        assert_eq!(restored.token().unwrap().expose_secret(), "tok_123");
    }

    #[tokio::test]
    async fn test_subscribers_see_sign_out_once() {
        let session = Session::restore(Arc::new(MemoryCache::new()));
        session.sign_in(sample_identity()).unwrap();

        let mut rx = session.subscribe();
        rx.borrow_and_update();

        session.sign_out();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());

        session.sign_out();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_resync_picks_up_external_sign_out() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let session = Session::restore(Arc::clone(&cache));
        session.sign_in(sample_identity()).unwrap();

        cache.remove(keys::TOKEN).unwrap();
        session.resync_from_cache();
        assert!(!session.is_signed_in());
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", sample_identity());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("tok_123"));
    }
}
