//! Foundation types for the register store.
//!
//! Every other `regis` crate depends on this one for its fixed-width integer
//! types and the compact-size integer encoding used by keychain records,
//! register blobs and operation streams.
//!
//! # Key Types
//!
//! - [`Uint256`], [`Uint512`], [`Uint1024`] -- fixed-width little-endian integers
//! - [`Address`] -- 256-bit register address
//! - [`compact`] -- compact-size length prefixes

pub mod compact;
pub mod error;
pub mod uint;

pub use error::TypeError;
pub use uint::{Uint1024, Uint256, Uint512};

/// Address of a register: a 256-bit identifier.
pub type Address = Uint256;
