use std::path::Path;

use tracing::info;

use crate::config::{FileMapConfig, HashmapConfig};
use crate::error::{KeychainError, KeychainResult};
use crate::filemap::FileKeychain;
use crate::hashmap::HashmapKeychain;
use crate::sector_key::SectorKey;
use crate::traits::Keychain;

/// Spreads keys across independent keychains by a hash of the key.
///
/// Each shard has its own lock, so operations on keys in different shards
/// proceed in parallel.
#[derive(Debug)]
pub struct ShardedKeychain<K> {
    shards: Vec<K>,
}

impl<K: Keychain> ShardedKeychain<K> {
    pub fn new(shards: Vec<K>) -> KeychainResult<Self> {
        if shards.is_empty() {
            return Err(KeychainError::Config("at least one shard is required".into()));
        }
        Ok(Self { shards })
    }

    /// Shard index for `key`: low 64 bits of its BLAKE3 digest modulo the
    /// shard count.
    pub fn shard_of(&self, key: &[u8]) -> usize {
        let digest = blake3::hash(key);
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(low) % self.shards.len() as u64) as usize
    }

    pub fn shard(&self, index: usize) -> Option<&K> {
        self.shards.get(index)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn owner(&self, key: &[u8]) -> &K {
        &self.shards[self.shard_of(key)]
    }
}

fn shard_dir(dir: &Path, index: usize) -> std::path::PathBuf {
    dir.join(format!("shard.{index:03}"))
}

impl ShardedKeychain<FileKeychain> {
    /// Open `count` file keychains under `dir/shard.NNN`.
    pub fn open_filemap(dir: &Path, count: usize, config: &FileMapConfig) -> KeychainResult<Self> {
        let shards = (0..count)
            .map(|i| FileKeychain::open(shard_dir(dir, i), config.clone()))
            .collect::<KeychainResult<Vec<_>>>()?;
        info!(dir = %dir.display(), shards = count, "sharded filemap keychain opened");
        Self::new(shards)
    }
}

impl ShardedKeychain<HashmapKeychain> {
    /// Open `count` hashmap keychains under `dir/shard.NNN`.
    pub fn open_hashmap(dir: &Path, count: usize, config: &HashmapConfig) -> KeychainResult<Self> {
        let shards = (0..count)
            .map(|i| HashmapKeychain::open(shard_dir(dir, i), config.clone()))
            .collect::<KeychainResult<Vec<_>>>()?;
        info!(dir = %dir.display(), shards = count, "sharded hashmap keychain opened");
        Self::new(shards)
    }
}

impl<K: Keychain> Keychain for ShardedKeychain<K> {
    fn get(&self, key: &[u8]) -> KeychainResult<Option<SectorKey>> {
        self.owner(key).get(key)
    }

    fn put(&self, record: &SectorKey) -> KeychainResult<()> {
        self.owner(&record.key).put(record)
    }

    fn erase(&self, key: &[u8]) -> KeychainResult<bool> {
        self.owner(key).erase(key)
    }

    fn restore(&self, key: &[u8]) -> KeychainResult<bool> {
        self.owner(key).restore(key)
    }

    fn keys(&self) -> KeychainResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            keys.extend(shard.keys()?);
        }
        keys.sort();
        Ok(keys)
    }

    fn has_key(&self, key: &[u8]) -> KeychainResult<bool> {
        self.owner(key).has_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shard_list_rejected() {
        assert!(ShardedKeychain::<FileKeychain>::new(Vec::new()).is_err());
    }

    #[test]
    fn keys_land_in_their_shard() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ShardedKeychain::open_filemap(dir.path(), 4, &FileMapConfig::default()).unwrap();
        assert_eq!(chain.shard_count(), 4);
        for i in 0..32u32 {
            let key = format!("acct-{i}").into_bytes();
            chain.put(&SectorKey::ready(key.clone(), 0, i, 1)).unwrap();
            let shard = chain.shard(chain.shard_of(&key)).unwrap();
            assert!(shard.has_key(&key).unwrap());
        }
        assert_eq!(chain.keys().unwrap().len(), 32);
        assert!(dir.path().join("shard.003").exists());
    }

    #[test]
    fn erase_and_restore_route_to_owner() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ShardedKeychain::open_filemap(dir.path(), 3, &FileMapConfig::default()).unwrap();
        chain.put(&SectorKey::ready(b"k".to_vec(), 0, 1, 1)).unwrap();
        assert!(chain.erase(b"k").unwrap());
        assert!(!chain.has_key(b"k").unwrap());
        assert!(chain.restore(b"k").unwrap());
        assert_eq!(chain.get(b"k").unwrap().unwrap().sector_start, 1);
    }

    #[test]
    fn hashmap_shards() {
        let dir = tempfile::tempdir().unwrap();
        let config = HashmapConfig {
            total_buckets: 8,
            flush_interval_ms: 0,
            ..HashmapConfig::default()
        };
        let chain = ShardedKeychain::open_hashmap(dir.path(), 2, &config).unwrap();
        chain.put(&SectorKey::ready(b"h".to_vec(), 0, 4, 1)).unwrap();
        assert_eq!(chain.get(b"h").unwrap().unwrap().sector_start, 4);
        assert!(chain.erase(b"h").is_err());
    }
}
