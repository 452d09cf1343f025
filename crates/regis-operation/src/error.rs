use regis_keychain::KeychainError;
use regis_register::RegisterError;
use regis_types::Address;

use crate::opcode::OpCode;

/// Errors from register stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("keychain error: {0}")]
    Keychain(#[from] KeychainError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes do not decode to a state.
    #[error("corrupt state for {address}: {reason}")]
    CorruptState { address: Address, reason: String },

    #[error("state of {0} bytes does not fit in a sector")]
    TooLarge(usize),
}

/// Result alias for register store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from verifying, executing or committing an operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A precondition of the operation does not hold.
    #[error("{op} rejected: {reason}")]
    Rejected { op: OpCode, reason: String },

    /// The contract streams cannot be decoded.
    #[error("malformed contract: {0}")]
    Contract(String),

    #[error("register error: {0}")]
    Register(#[from] RegisterError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl OperationError {
    pub(crate) fn rejected(op: OpCode, reason: impl Into<String>) -> Self {
        Self::Rejected {
            op,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the failure came from the storage layer rather
    /// than from the operation being invalid.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result alias for operations.
pub type OperationResult<T> = Result<T, OperationError>;
