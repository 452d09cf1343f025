//! Register operations.
//!
//! A [`Contract`] carries a stream of primitive operations plus a register
//! stream of pre-state snapshots and post-state checksums. Every primitive
//! runs in three phases against a [`RegisterStore`]:
//!
//! 1. **verify** -- structural and authorization checks against the
//!    contract's embedded pre-state.
//! 2. **execute** -- the state transition itself, stamping the modified time
//!    and recomputing the checksum.
//! 3. **commit** -- persisting the post-state.
//!
//! [`execute`] drives all three phases for every primitive in a contract and
//! checks each post-state against the checksum recorded in the contract.
//! [`build`] produces the register stream for a contract from the current
//! store contents.
//!
//! # Primitives
//!
//! - [`create`] -- allocate a new register
//! - [`write`] -- overwrite raw data or mutable object fields
//! - [`append`] -- extend append and raw registers
//! - [`transfer`] -- change the owner
//! - [`debit`] / [`credit`] -- move balance out of / into account objects

pub mod append;
pub mod contract;
pub mod create;
pub mod credit;
pub mod debit;
pub mod error;
pub mod execute;
pub mod memory;
pub mod opcode;
pub mod sector;
pub mod transfer;
pub mod traits;
pub mod write;

pub use contract::{Contract, Cursor};
pub use error::{OperationError, OperationResult, StoreError, StoreResult};
pub use execute::{build, execute};
pub use memory::InMemoryRegisterStore;
pub use opcode::{OpCode, StateFlag};
pub use sector::SectorRegisterStore;
pub use traits::RegisterStore;
