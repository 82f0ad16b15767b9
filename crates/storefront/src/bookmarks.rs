//! Scroll-position bookmarks.
//!
//! Listing pages remember how far the customer scrolled, keyed by the page's
//! query string, so returning from a product detail lands in the same place.

use std::sync::Arc;

use crate::cache::{LocalCache, LocalCacheExt, keys};

#[derive(Clone)]
pub struct Bookmarks {
    cache: Arc<dyn LocalCache>,
}

impl Bookmarks {
    #[must_use]
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    fn key(query: &str) -> String {
        format!("{}{}", keys::SCROLL_PREFIX, query)
    }

    /// Remember `offset` for the page identified by `query`.
    pub fn save(&self, query: &str, offset: u64) {
        if let Err(e) = self.cache.set(&Self::key(query), &offset) {
            tracing::debug!(query, error = %e, "failed to save scroll bookmark");
        }
    }

    /// The saved offset for `query`, if any.
    #[must_use]
    pub fn restore(&self, query: &str) -> Option<u64> {
        self.cache.get(&Self::key(query)).ok().flatten()
    }

    pub fn forget(&self, query: &str) {
        let _ = self.cache.remove(&Self::key(query));
    }

    /// Remove every bookmark.
    pub fn clear(&self) {
        let Ok(stored) = self.cache.keys() else { return };
        for key in stored.iter().filter(|k| k.starts_with(keys::SCROLL_PREFIX)) {
            let _ = self.cache.remove(key);
        }
    }
}
