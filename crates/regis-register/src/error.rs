use crate::field::FieldType;

/// Errors from register and object operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("object has not been parsed")]
    NotParsed,

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("type mismatch for field {name}: stored {stored:?}, requested {requested:?}")]
    TypeMismatch {
        name: String,
        stored: FieldType,
        requested: FieldType,
    },

    #[error("field {0} is not mutable")]
    Immutable(String),

    /// Strings and byte arrays can only be replaced by values of equal size.
    #[error("size mismatch for field {name}: stored {stored} bytes, given {given}")]
    SizeMismatch {
        name: String,
        stored: usize,
        given: usize,
    },

    #[error("value of field {0} runs past the end of the object")]
    Overflow(String),

    #[error("malformed object at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("unknown field type {0:#04x}")]
    UnknownFieldType(u8),

    #[error("duplicate field: {0}")]
    DuplicateField(String),

    #[error("unknown register type {0:#04x}")]
    UnknownRegisterType(u8),

    #[error("malformed state: {0}")]
    MalformedState(String),

    #[error("register is not an object")]
    NotObject,
}

/// Result alias for register operations.
pub type RegisterResult<T> = Result<T, RegisterError>;
