use crate::error::KeychainResult;
use crate::sector_key::SectorKey;

/// Persistent index from binary keys to [`SectorKey`] records.
///
/// All implementations must satisfy these invariants:
/// - A lookup of an unknown or erased key is `Ok(None)`, never an error.
/// - A record returned by [`get`](Self::get) carries exactly the requested
///   key bytes; a mismatch on disk is reported as corruption.
/// - Operations on one keychain are serialized; callers may share it across
///   threads.
pub trait Keychain: Send + Sync {
    /// Look up the record for `key`.
    fn get(&self, key: &[u8]) -> KeychainResult<Option<SectorKey>>;

    /// Persist `record` under its key.
    fn put(&self, record: &SectorKey) -> KeychainResult<()>;

    /// Mark the record for `key` erased. Returns `false` if the key is unknown.
    fn erase(&self, key: &[u8]) -> KeychainResult<bool>;

    /// Mark the record for `key` ready again. Returns `false` if the key is
    /// unknown.
    fn restore(&self, key: &[u8]) -> KeychainResult<bool>;

    /// All keys currently visible.
    fn keys(&self) -> KeychainResult<Vec<Vec<u8>>>;

    /// Check whether `key` resolves to a visible record.
    ///
    /// Default implementation performs a full [`get`](Self::get).
    fn has_key(&self, key: &[u8]) -> KeychainResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
