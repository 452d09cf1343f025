use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::list::LinkedArena;

struct LruState<K, V> {
    index: HashMap<K, usize>,
    list: LinkedArena<(K, V)>,
}

/// Bounded least-recently-used map.
///
/// Holds at most `capacity` entries; inserting beyond that evicts the least
/// recently used entry and hands it back to the caller so resources such as
/// file handles can be released deliberately. Values are cloned out on
/// [`get`](Self::get), so shared resources are typically stored as `Arc`s.
pub struct TemplateLru<K, V> {
    capacity: usize,
    state: Mutex<LruState<K, V>>,
}

impl<K, V> TemplateLru<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an LRU holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState {
                index: HashMap::new(),
                list: LinkedArena::new(),
            }),
        }
    }

    /// Look up `key`, promoting it to most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().expect("lock poisoned");
        let idx = *state.index.get(key)?;
        state.list.move_to_front(idx);
        state.list.get(idx).map(|(_, v)| v.clone())
    }

    /// Returns `true` if `key` is present, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        self.state
            .lock()
            .expect("lock poisoned")
            .index
            .contains_key(key)
    }

    /// Insert or replace `key` as most recently used. Returns the entry
    /// evicted to make room, if any.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(&idx) = state.index.get(&key) {
            if let Some(slot) = state.list.get_mut(idx) {
                slot.1 = value;
            }
            state.list.move_to_front(idx);
            return None;
        }

        let idx = state.list.push_front((key.clone(), value));
        state.index.insert(key, idx);

        if state.list.len() > self.capacity {
            let tail = state.list.tail()?;
            let (old_key, old_value) = state.list.remove(tail)?;
            state.index.remove(&old_key);
            return Some((old_key, old_value));
        }
        None
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().expect("lock poisoned");
        let idx = state.index.remove(key)?;
        state.list.remove(idx).map(|(_, v)| v)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.index.clear();
        state.list.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("lock poisoned").list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> std::fmt::Debug for TemplateLru<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.state.lock().expect("lock poisoned").list.len();
        f.debug_struct("TemplateLru")
            .field("capacity", &self.capacity)
            .field("len", &len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn get_returns_inserted_value() {
        let lru = TemplateLru::new(4);
        lru.put(1u32, "one".to_string());
        assert_eq!(lru.get(&1).as_deref(), Some("one"));
        assert_eq!(lru.get(&2), None);
    }

    #[test]
    fn evicts_least_recent_and_returns_it() {
        let lru = TemplateLru::new(2);
        assert!(lru.put(1u32, 10u32).is_none());
        assert!(lru.put(2, 20).is_none());
        lru.get(&1);
        assert_eq!(lru.put(3, 30), Some((2, 20)));
        assert!(lru.contains(&1));
        assert!(!lru.contains(&2));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn replace_keeps_single_entry() {
        let lru = TemplateLru::new(2);
        lru.put("a", 1u8);
        lru.put("a", 2u8);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get(&"a"), Some(2));
    }

    #[test]
    fn remove_and_clear() {
        let lru = TemplateLru::new(3);
        lru.put(1u8, 1u8);
        lru.put(2, 2);
        assert_eq!(lru.remove(&1), Some(1));
        assert_eq!(lru.remove(&1), None);
        lru.clear();
        assert!(lru.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let lru = TemplateLru::new(0);
        assert_eq!(lru.capacity(), 1);
        lru.put(1u8, 1u8);
        assert_eq!(lru.put(2, 2), Some((1, 1)));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(
            capacity in 1usize..16,
            ops in proptest::collection::vec((0u8..32, any::<u16>()), 0..128),
        ) {
            let lru = TemplateLru::new(capacity);
            for (k, v) in ops {
                lru.put(k, v);
                prop_assert!(lru.len() <= capacity);
                prop_assert_eq!(lru.get(&k), Some(v));
            }
        }
    }
}
