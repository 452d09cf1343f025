//! Registers: versioned, owned, checksummed state blobs.
//!
//! A [`State`] is the unit the operation layer reads and writes. When its
//! type is [`RegisterType::Object`] the blob is a sequence of named, typed
//! fields which [`Object`] parses into a field map and reads or rewrites in
//! place.
//!
//! # Object field encoding
//!
//! ```text
//! [compact-size name length][name][0xFF if mutable]?[type byte][value]
//! ```
//!
//! Integers are little-endian; strings and byte arrays carry a compact-size
//! length prefix. Rewriting a field never changes the blob length.

pub mod builder;
pub mod error;
pub mod field;
pub mod object;
pub mod reserved;
pub mod state;

pub use builder::ObjectBuilder;
pub use error::{RegisterError, RegisterResult};
pub use field::{FieldType, FieldValue, ObjectValue, MUTABLE_MARKER};
pub use object::{FieldSlot, Object, Standard};
pub use reserved::is_reserved;
pub use state::{RegisterType, State};
