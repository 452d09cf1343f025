//! Keychains: persistent indexes from binary keys to sector locations.
//!
//! A keychain stores [`SectorKey`] records. Each record carries a lifecycle
//! state, the owning key bytes, and the location of the key's data in a
//! separate sector store. Two on-disk layouts are provided:
//!
//! - [`FileKeychain`] -- append-only record files with an in-memory index
//!   rebuilt by replay at open.
//! - [`HashmapKeychain`] -- pre-sized bucket files with per-bucket
//!   generation counters checkpointed by a background flusher.
//!
//! [`ShardedKeychain`] spreads keys over several keychains and
//! [`CachedKeychain`] fronts any keychain with a
//! [`BucketKeyCache`](regis_cache::BucketKeyCache) presence cache.
//!
//! A missing key is a normal outcome (`Ok(None)` / `Ok(false)`); errors are
//! reserved for I/O failures, corruption, and unsupported operations.

pub mod cached;
pub mod config;
pub mod error;
pub mod filemap;
pub mod hashmap;
pub mod sector_key;
pub mod shard;
pub mod traits;

pub use cached::CachedKeychain;
pub use config::{CacheConfig, FileMapConfig, HashmapConfig, KeychainConfig, SyncMode};
pub use error::{KeychainError, KeychainResult};
pub use filemap::{FileKeychain, Location};
pub use hashmap::HashmapKeychain;
pub use sector_key::{KeyState, SectorHeader, SectorKey, HEADER_SIZE};
pub use shard::ShardedKeychain;
pub use traits::Keychain;
