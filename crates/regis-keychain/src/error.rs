use std::path::PathBuf;

/// Errors from keychain operations.
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    /// On-disk data disagrees with the index or cannot be decoded.
    #[error("corrupt keychain data in {path} at offset {offset}: {reason}")]
    Corruption {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A record could not be decoded from raw bytes.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The key cannot be represented in a record.
    #[error("key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLarge { len: usize, max: usize },

    /// The keychain layout does not support the operation.
    #[error("{0} is not supported by this keychain")]
    NotImplemented(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeychainError {
    /// Returns `true` for errors that indicate damaged on-disk state.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::InvalidRecord(_))
    }
}

/// Result alias for keychain operations.
pub type KeychainResult<T> = Result<T, KeychainError>;
