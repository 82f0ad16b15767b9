//! Durable key-value cache for client state.
//!
//! The cache is a best-effort shadow of in-memory state: cart, wishlist,
//! credentials, addresses and scroll bookmarks are mirrored here so the next
//! start can render instantly before the remote store answers. It has no
//! authority of its own; a successful remote fetch always overwrites it.
//!
//! Two backends are provided:
//! - [`MemoryCache`] - process-local, used in tests and ephemeral sessions
//! - [`FileCache`] - one JSON file per key under a directory, written atomically

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Well-known cache keys.
pub mod keys {
    /// Serialized cart lines.
    pub const CART: &str = "cart";
    /// Serialized wishlist entries.
    pub const WISHLIST: &str = "wishlist";
    /// Bearer credential.
    pub const TOKEN: &str = "token";
    /// Signed-in user profile.
    pub const USER: &str = "user";
    /// Address chosen for the checkout in progress.
    pub const SHIPPING_ADDRESS: &str = "shippingAddress";
    /// Saved address book.
    pub const ADDRESSES: &str = "shoplane_user_addresses";
    /// Prefix for scroll-position bookmarks, followed by the page query string.
    pub const SCROLL_PREFIX: &str = "scroll:";
}

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A lock was poisoned by a panicking writer.
    #[error("cache lock poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for CacheError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// A synchronous string key-value store.
///
/// Writes are synchronous so every state mutation can write through before
/// it returns.
pub trait LocalCache: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;
    /// Store `value` under `key`, replacing any previous value.
    fn set_raw(&self, key: &str, value: &str) -> Result<(), CacheError>;
    /// Delete `key`. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>, CacheError>;
}

/// Typed JSON helpers over any [`LocalCache`].
pub trait LocalCacheExt: LocalCache {
    /// Read and decode the value under `key`.
    ///
    /// A value that no longer decodes (e.g. written by an older build) is
    /// treated as absent.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Encode and store `value` under `key`.
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }
}

impl<C: LocalCache + ?Sized> LocalCacheExt for C {}

// =============================================================================
// MemoryCache
// =============================================================================

/// In-process cache backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries.lock()?.keys().cloned().collect())
    }
}

// =============================================================================
// FileCache
// =============================================================================

/// Directory-backed cache, one file per key.
///
/// Each write goes to a temporary file that is then renamed over the target,
/// so readers never observe a half-written value. There is no locking between
/// processes sharing the directory: the last writer wins.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) a cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl LocalCache for FileCache {
    fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let target = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", encode_key(key), uuid::Uuid::new_v4().simple()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".json")
                && let Some(key) = decode_key(stem)
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// Percent-encode everything outside `[A-Za-z0-9_-]` so any key is a safe file name.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let byte = *bytes.get(i)?;
        if byte == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(byte);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
