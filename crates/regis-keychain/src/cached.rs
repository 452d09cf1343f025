use regis_cache::BucketKeyCache;

use crate::error::KeychainResult;
use crate::sector_key::{KeyState, SectorKey};
use crate::traits::Keychain;

/// Keychain fronted by a [`BucketKeyCache`] of keys known to be present.
///
/// Presence checks hit the cache first and fall back to the inner keychain,
/// warming the cache on success. Writes, erases and restores go through to
/// the inner keychain and keep the cache in step.
#[derive(Debug)]
pub struct CachedKeychain<K> {
    inner: K,
    cache: BucketKeyCache,
}

impl<K: Keychain> CachedKeychain<K> {
    pub fn new(inner: K, capacity_bytes: usize) -> Self {
        Self {
            inner,
            cache: BucketKeyCache::new(capacity_bytes),
        }
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }

    pub fn cache(&self) -> &BucketKeyCache {
        &self.cache
    }
}

impl<K: Keychain> Keychain for CachedKeychain<K> {
    fn get(&self, key: &[u8]) -> KeychainResult<Option<SectorKey>> {
        let record = self.inner.get(key)?;
        if record.is_some() {
            self.cache.put(key);
        } else {
            self.cache.remove(key);
        }
        Ok(record)
    }

    fn put(&self, record: &SectorKey) -> KeychainResult<()> {
        self.inner.put(record)?;
        if record.state.is_visible() {
            self.cache.put(&record.key);
        } else if record.state == KeyState::Empty {
            self.cache.remove(&record.key);
        }
        Ok(())
    }

    fn erase(&self, key: &[u8]) -> KeychainResult<bool> {
        self.cache.remove(key);
        self.inner.erase(key)
    }

    fn restore(&self, key: &[u8]) -> KeychainResult<bool> {
        let restored = self.inner.restore(key)?;
        if restored {
            self.cache.put(key);
        }
        Ok(restored)
    }

    fn keys(&self) -> KeychainResult<Vec<Vec<u8>>> {
        self.inner.keys()
    }

    fn has_key(&self, key: &[u8]) -> KeychainResult<bool> {
        if self.cache.get(key) {
            return Ok(true);
        }
        let present = self.inner.has_key(key)?;
        if present {
            self.cache.put(key);
        }
        Ok(present)
    }
}
