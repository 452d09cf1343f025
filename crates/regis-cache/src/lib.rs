//! In-memory caches for the register store.
//!
//! - [`BucketKeyCache`] -- recency cache of opaque binary keys bounded by an
//!   accounted byte budget, one resident key per hash bucket.
//! - [`TemplateLru`] -- generic entry-count bounded LRU used by the keychains
//!   for open file handles and disk pages.
//!
//! Both caches are internally synchronized and can be shared by reference
//! across threads. Neither ever fails: a miss is a normal outcome.

pub mod bucket;
mod list;
pub mod lru;

pub use bucket::BucketKeyCache;
pub use lru::TemplateLru;
