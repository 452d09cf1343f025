use std::sync::Mutex;

use tracing::trace;

use crate::list::LinkedArena;

/// Capacity bytes allotted to each hash bucket.
pub const BYTES_PER_BUCKET: usize = 32;

/// Fixed accounting overhead charged per bucket.
pub const BUCKET_OVERHEAD: usize = 8;

/// Accounting overhead charged per resident key, on top of its length.
pub const ENTRY_OVERHEAD: usize = 32;

struct Entry {
    key: Vec<u8>,
    bucket: usize,
    touched: u64,
}

struct CacheState {
    buckets: Vec<Option<usize>>,
    list: LinkedArena<Entry>,
    current_size: usize,
    clock: u64,
}

/// Recency cache of binary keys with a byte budget.
///
/// Every key maps to one hash bucket and each bucket holds at most one key:
/// inserting a key whose bucket is occupied by a different key evicts the
/// occupant. Keys live on a recency list; once the accounted size exceeds
/// the capacity the least recently used keys are evicted until the cache fits
/// again or is empty.
///
/// Accounted size is `BUCKET_OVERHEAD * bucket_count` plus
/// `key.len() + ENTRY_OVERHEAD` for every resident key. A capacity below that
/// baseline is raised to it, so the accounted size never exceeds `capacity()`.
pub struct BucketKeyCache {
    capacity: usize,
    bucket_count: usize,
    state: Mutex<CacheState>,
}

impl BucketKeyCache {
    /// Create a cache bounded by `capacity` accounted bytes.
    pub fn new(capacity: usize) -> Self {
        let bucket_count = (capacity / BYTES_PER_BUCKET).max(1);
        let baseline = bucket_count * BUCKET_OVERHEAD;
        if capacity < baseline {
            trace!(requested = capacity, baseline, "cache capacity raised to bucket baseline");
        }
        let capacity = capacity.max(baseline);
        Self {
            capacity,
            bucket_count,
            state: Mutex::new(CacheState {
                buckets: vec![None; bucket_count],
                list: LinkedArena::new(),
                current_size: bucket_count * BUCKET_OVERHEAD,
                clock: 0,
            }),
        }
    }

    /// Bucket index of `key`: low 64 bits of its BLAKE3 digest modulo the
    /// bucket count.
    pub fn bucket_of(&self, key: &[u8]) -> usize {
        let digest = blake3::hash(key);
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(low) % self.bucket_count as u64) as usize
    }

    /// Returns `true` if `key` is resident, promoting it to most recent.
    pub fn get(&self, key: &[u8]) -> bool {
        let bucket = self.bucket_of(key);
        let mut state = self.state.lock().expect("lock poisoned");
        let Some(idx) = state.buckets[bucket] else {
            return false;
        };
        let matches = state.list.get(idx).is_some_and(|e| e.key == key);
        if matches {
            state.clock += 1;
            let now = state.clock;
            state.list.move_to_front(idx);
            if let Some(entry) = state.list.get_mut(idx) {
                entry.touched = now;
            }
        }
        matches
    }

    /// Insert `key` as most recent, evicting the bucket occupant and then
    /// least recently used keys as needed.
    pub fn put(&self, key: &[u8]) {
        let bucket = self.bucket_of(key);
        let mut state = self.state.lock().expect("lock poisoned");
        state.clock += 1;
        let now = state.clock;

        if let Some(idx) = state.buckets[bucket] {
            if state.list.get(idx).is_some_and(|e| e.key == key) {
                state.list.move_to_front(idx);
                if let Some(entry) = state.list.get_mut(idx) {
                    entry.touched = now;
                }
                return;
            }
            trace!(bucket, "bucket collision, evicting occupant");
            Self::evict(&mut state, idx);
        }

        let idx = state.list.push_front(Entry {
            key: key.to_vec(),
            bucket,
            touched: now,
        });
        state.buckets[bucket] = Some(idx);
        state.current_size += key.len() + ENTRY_OVERHEAD;

        while state.current_size > self.capacity {
            let Some(tail) = state.list.tail() else {
                break;
            };
            Self::evict(&mut state, tail);
        }
    }

    /// Remove `key`. Returns `true` if it was resident.
    pub fn remove(&self, key: &[u8]) -> bool {
        let bucket = self.bucket_of(key);
        let mut state = self.state.lock().expect("lock poisoned");
        match state.buckets[bucket] {
            Some(idx) if state.list.get(idx).is_some_and(|e| e.key == key) => {
                Self::evict(&mut state, idx);
                true
            }
            _ => false,
        }
    }

    /// Drop every resident key.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.list.clear();
        state.buckets.iter_mut().for_each(|b| *b = None);
        state.current_size = self.bucket_count * BUCKET_OVERHEAD;
    }

    /// Number of resident keys.
    pub fn len(&self) -> usize {
        self.state.lock().expect("lock poisoned").list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current accounted size in bytes.
    pub fn current_size(&self) -> usize {
        self.state.lock().expect("lock poisoned").current_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Resident keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().expect("lock poisoned");
        state.list.iter().map(|e| e.key.clone()).collect()
    }

    /// Logical time `key` was last inserted or read, if resident.
    pub fn last_touched(&self, key: &[u8]) -> Option<u64> {
        let bucket = self.bucket_of(key);
        let state = self.state.lock().expect("lock poisoned");
        let idx = state.buckets[bucket]?;
        state
            .list
            .get(idx)
            .filter(|e| e.key == key)
            .map(|e| e.touched)
    }

    fn evict(state: &mut CacheState, idx: usize) {
        if let Some(entry) = state.list.remove(idx) {
            if state.buckets[entry.bucket] == Some(idx) {
                state.buckets[entry.bucket] = None;
            }
            state.current_size -= entry.key.len() + ENTRY_OVERHEAD;
        }
    }
}

impl std::fmt::Debug for BucketKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketKeyCache")
            .field("capacity", &self.capacity)
            .field("bucket_count", &self.bucket_count)
            .field("len", &self.len())
            .field("current_size", &self.current_size())
            .finish()
    }
}
