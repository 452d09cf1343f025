use std::path::Path;

use regis_cache::bucket::BUCKET_OVERHEAD;
use serde::{Deserialize, Serialize};

use crate::error::{KeychainError, KeychainResult};

/// Durability strategy for keychain writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every write.
    EveryWrite,
    /// Flush to the OS and let it schedule the disk write.
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Settings for [`FileKeychain`](crate::FileKeychain).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMapConfig {
    /// Once the current file exceeds this size, new keys go to a new file.
    pub max_file_size: u64,
    pub sync_mode: SyncMode,
}

impl Default for FileMapConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
            sync_mode: SyncMode::default(),
        }
    }
}

/// Settings for [`HashmapKeychain`](crate::HashmapKeychain).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashmapConfig {
    /// Buckets per generation file.
    pub total_buckets: u32,
    /// Longest key stored verbatim; longer keys are compressed to this size.
    pub max_key_size: usize,
    /// Open generation file handles kept in the handle cache.
    pub max_open_files: usize,
    /// Slots kept in the disk page cache.
    pub page_cache_slots: usize,
    /// Interval between index checkpoints; `0` disables the flusher.
    pub flush_interval_ms: u64,
    pub sync_mode: SyncMode,
}

impl HashmapConfig {
    /// Bytes reserved per bucket slot.
    pub fn slot_size(&self) -> usize {
        self.max_key_size + crate::sector_key::HEADER_SIZE
    }

    pub fn validate(&self) -> KeychainResult<()> {
        if self.total_buckets == 0 {
            return Err(KeychainError::Config("total_buckets must be positive".into()));
        }
        if self.max_key_size == 0 {
            return Err(KeychainError::Config("max_key_size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for HashmapConfig {
    fn default() -> Self {
        Self {
            total_buckets: 256 * 256 * 64,
            max_key_size: 32,
            max_open_files: 8,
            page_cache_slots: 4096,
            flush_interval_ms: 1000,
            sync_mode: SyncMode::default(),
        }
    }
}

/// Settings for the key presence cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Accounted byte budget of the cache.
    pub capacity_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

/// Top-level keychain configuration, loadable from TOML.
///
/// ```toml
/// shards = 4
///
/// [filemap]
/// max_file_size = 1073741824
/// sync_mode = "every_write"
///
/// [hashmap]
/// total_buckets = 65536
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeychainConfig {
    /// Number of keychain shards.
    pub shards: usize,
    pub filemap: FileMapConfig,
    pub hashmap: HashmapConfig,
    pub cache: CacheConfig,
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self {
            shards: 1,
            filemap: FileMapConfig::default(),
            hashmap: HashmapConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl KeychainConfig {
    pub fn from_toml_str(s: &str) -> KeychainResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| KeychainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> KeychainResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> KeychainResult<String> {
        toml::to_string_pretty(self).map_err(|e| KeychainError::Config(e.to_string()))
    }

    pub fn validate(&self) -> KeychainResult<()> {
        if self.shards == 0 {
            return Err(KeychainError::Config("shards must be positive".into()));
        }
        if self.cache.capacity_bytes < BUCKET_OVERHEAD {
            return Err(KeychainError::Config(format!(
                "cache capacity_bytes must be at least {BUCKET_OVERHEAD}"
            )));
        }
        self.hashmap.validate()
    }
}
