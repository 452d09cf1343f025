use regis_register::State;
use regis_types::Address;

use crate::error::StoreResult;

/// Persistent home of register states, keyed by address.
///
/// Implementations must satisfy:
/// - A state read back is byte-identical to the state last written.
/// - Writes replace the previous state of the address wholesale.
/// - All I/O errors are propagated, never silently ignored.
pub trait RegisterStore: Send + Sync {
    /// Read the current state of a register.
    ///
    /// Returns `Ok(None)` if no state was ever written for `address`.
    fn read_state(&self, address: &Address) -> StoreResult<Option<State>>;

    /// Persist `state` as the current state of `address`.
    fn write_state(&self, address: &Address, state: &State) -> StoreResult<()>;

    /// Check whether a register exists.
    fn has_state(&self, address: &Address) -> StoreResult<bool> {
        Ok(self.read_state(address)?.is_some())
    }
}
