//! Signing keys and the rotating key store

use base64::{prelude::BASE64_STANDARD, Engine};
use keyward_core::{ExpiringCache, KeywardError, KeywardResult};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tracing::debug;

const SNAPSHOT_CACHE_KEY: &str = "auth:keys";

/// Credential used to sign and verify tokens. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub enum Key {
    /// Shared secret; public and private views are the same bytes
    Symmetric(Arc<[u8]>),
    /// Distinct halves, usually PEM encoded
    Asymmetric {
        public: Arc<[u8]>,
        private: Arc<[u8]>,
    },
}

impl Key {
    pub fn symmetric(secret: impl AsRef<[u8]>) -> Self {
        Key::Symmetric(Arc::from(secret.as_ref()))
    }

    pub fn asymmetric(public: impl AsRef<[u8]>, private: impl AsRef<[u8]>) -> Self {
        Key::Asymmetric {
            public: Arc::from(public.as_ref()),
            private: Arc::from(private.as_ref()),
        }
    }

    /// Parse one configured key entry.
    ///
    /// `pem:<private>,<public>` reads both files, `base64:<data>` decodes the
    /// secret, anything else is used verbatim as the secret bytes.
    pub fn from_material(material: &str) -> KeywardResult<Self> {
        if let Some(paths) = material.strip_prefix("pem:") {
            let (private, public) = paths.split_once(',').ok_or_else(|| {
                KeywardError::invalid_configuration(
                    "pem key material must be 'pem:<private-path>,<public-path>'",
                )
            })?;
            let private = std::fs::read(private.trim())?;
            let public = std::fs::read(public.trim())?;
            return Ok(Key::asymmetric(public, private));
        }

        if let Some(encoded) = material.strip_prefix("base64:") {
            let secret = BASE64_STANDARD.decode(encoded.trim()).map_err(|e| {
                KeywardError::invalid_configuration(format!("invalid base64 key: {}", e))
            })?;
            return Ok(Key::symmetric(secret));
        }

        Ok(Key::symmetric(material.as_bytes()))
    }

    pub fn public(&self) -> &[u8] {
        match self {
            Key::Symmetric(secret) => secret,
            Key::Asymmetric { public, .. } => public,
        }
    }

    pub fn private(&self) -> &[u8] {
        match self {
            Key::Symmetric(secret) => secret,
            Key::Asymmetric { private, .. } => private,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, Key::Symmetric(_))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Symmetric(_) => f.debug_tuple("Symmetric").finish_non_exhaustive(),
            Key::Asymmetric { .. } => f.debug_struct("Asymmetric").finish_non_exhaustive(),
        }
    }
}

/// Keys available for verification, identified by an opaque id.
///
/// [`KeyStore::snapshot`] memoises the enumeration in an [`ExpiringCache`];
/// `add` and `remove` drop the memo so rotation shows up on the next
/// verification.
pub struct KeyStore {
    keys: RwLock<BTreeMap<String, Key>>,
    snapshots: ExpiringCache<Arc<[Key]>>,
    snapshot_ttl: Duration,
}

impl KeyStore {
    /// Must be called inside a Tokio runtime (the memo cache spawns its reclaimer).
    pub fn new(snapshot_ttl: Duration) -> Self {
        Self {
            keys: RwLock::new(BTreeMap::new()),
            snapshots: ExpiringCache::new(),
            snapshot_ttl,
        }
    }

    pub fn add(&self, id: impl Into<String>, key: Key) {
        let id = id.into();
        debug!(key_id = %id, "Adding key to key store");
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, key);
        self.invalidate();
    }

    pub fn remove(&self, id: &str) -> Option<Key> {
        let removed = self
            .keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            debug!(key_id = %id, "Removed key from key store");
            self.invalidate();
        }
        removed
    }

    /// Fresh enumeration of every key, bypassing the memo
    pub fn keys(&self) -> Vec<Key> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memoised key enumeration used by token verification
    pub fn snapshot(&self) -> Arc<[Key]> {
        match self.snapshots.get(SNAPSHOT_CACHE_KEY) {
            Ok(keys) => keys,
            Err(_) => {
                // held until the memo is stored so a concurrent add or remove
                // invalidates after it, never before
                let guard = self.keys.read().unwrap_or_else(PoisonError::into_inner);
                let keys: Arc<[Key]> = guard.values().cloned().collect();
                self.snapshots
                    .set(SNAPSHOT_CACHE_KEY, Arc::clone(&keys), Some(self.snapshot_ttl));
                keys
            }
        }
    }

    fn invalidate(&self) {
        // nothing memoised yet is fine
        let _ = self.snapshots.delete(SNAPSHOT_CACHE_KEY);
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("keys", &self.len())
            .field("snapshot_ttl", &self.snapshot_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_views_are_identical() {
        let key = Key::symmetric(b"shared");
        assert_eq!(key.public(), b"shared");
        assert_eq!(key.private(), b"shared");
        assert!(key.is_symmetric());
    }

    #[test]
    fn test_asymmetric_views_are_distinct() {
        let key = Key::asymmetric(b"pub", b"priv");
        assert_eq!(key.public(), b"pub");
        assert_eq!(key.private(), b"priv");
        assert!(!key.is_symmetric());
    }

    #[test]
    fn test_material_parsing() {
        assert_eq!(Key::from_material("plain").unwrap().private(), b"plain");
        assert_eq!(
            Key::from_material("base64:c2VjcmV0").unwrap().private(),
            b"secret"
        );
        assert!(Key::from_material("base64:***").is_err());
        assert!(Key::from_material("pem:only-one-path").is_err());
    }

    #[test]
    fn test_debug_hides_material() {
        let rendered = format!("{:?}", Key::symmetric(b"top-secret"));
        assert!(!rendered.contains("top"));
    }

    #[tokio::test]
    async fn test_snapshot_follows_rotation() {
        let store = KeyStore::new(Duration::from_secs(600));
        store.add("key-0", Key::symmetric(b"old"));
        assert_eq!(store.snapshot().len(), 1);

        store.add("key-1", Key::symmetric(b"new"));
        assert_eq!(store.snapshot().len(), 2);

        store.remove("key-0");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].private(), b"new");
    }

    #[tokio::test]
    async fn test_remove_unknown_key() {
        let store = KeyStore::new(Duration::from_secs(600));
        assert!(store.remove("missing").is_none());
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }
}
