use std::collections::HashMap;
use std::sync::RwLock;

use regis_register::State;
use regis_types::Address;

use crate::error::StoreResult;
use crate::traits::RegisterStore;

/// In-memory register store.
///
/// Intended for tests and embedding. States are cloned on read and write.
pub struct InMemoryRegisterStore {
    states: RwLock<HashMap<Address, State>>,
}

impl InMemoryRegisterStore {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Number of registers currently stored.
    pub fn len(&self) -> usize {
        self.states.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of every stored address.
    pub fn addresses(&self) -> Vec<Address> {
        let map = self.states.read().expect("lock poisoned");
        let mut addresses: Vec<Address> = map.keys().copied().collect();
        addresses.sort();
        addresses
    }

    pub fn clear(&self) {
        self.states.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryRegisterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterStore for InMemoryRegisterStore {
    fn read_state(&self, address: &Address) -> StoreResult<Option<State>> {
        let map = self.states.read().expect("lock poisoned");
        Ok(map.get(address).cloned())
    }

    fn write_state(&self, address: &Address, state: &State) -> StoreResult<()> {
        let mut map = self.states.write().expect("lock poisoned");
        map.insert(*address, state.clone());
        Ok(())
    }

    fn has_state(&self, address: &Address) -> StoreResult<bool> {
        let map = self.states.read().expect("lock poisoned");
        Ok(map.contains_key(address))
    }
}

impl std::fmt::Debug for InMemoryRegisterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRegisterStore")
            .field("register_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regis_register::RegisterType;
    use regis_types::Uint256;
    use std::sync::Arc;

    fn state(data: &[u8]) -> State {
        let mut state = State::new(RegisterType::Raw, Uint256::digest(b"owner"), data.to_vec());
        state.created = 1;
        state.set_checksum();
        state
    }

    #[test]
    fn write_then_read() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"a");
        assert_eq!(store.read_state(&address).unwrap(), None);
        assert!(!store.has_state(&address).unwrap());

        store.write_state(&address, &state(b"one")).unwrap();
        assert_eq!(store.read_state(&address).unwrap(), Some(state(b"one")));
        assert!(store.has_state(&address).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn write_replaces_previous_state() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"a");
        store.write_state(&address, &state(b"one")).unwrap();
        store.write_state(&address, &state(b"two")).unwrap();
        assert_eq!(store.read_state(&address).unwrap().unwrap().data, b"two");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn addresses_are_sorted_and_clear_empties() {
        let store = InMemoryRegisterStore::default();
        for i in [3u64, 1, 2] {
            store.write_state(&Uint256::from_u64(i), &state(b"x")).unwrap();
        }
        assert_eq!(
            store.addresses(),
            vec![Uint256::from_u64(1), Uint256::from_u64(2), Uint256::from_u64(3)]
        );
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_writers() {
        let store = Arc::new(InMemoryRegisterStore::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25u64 {
                        let address = Uint256::from_u64(t * 100 + i);
                        store.write_state(&address, &state(&i.to_le_bytes())).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 100);
    }
}
