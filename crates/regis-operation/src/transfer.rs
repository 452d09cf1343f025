//! OP::TRANSFER -- hand a register to a new owner.

use regis_register::{Object, RegisterType, Standard, State};
use regis_types::{Address, Uint256};

use crate::contract::Contract;
use crate::error::{OperationError, OperationResult};
use crate::execute::{authorize, expect_opcode, persist, seal};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;

fn reject(reason: impl Into<String>) -> OperationError {
    OperationError::rejected(OpCode::Transfer, reason)
}

/// Check a TRANSFER whose opcode was just read. Both cursors are left where
/// they were.
pub fn verify(contract: &mut Contract) -> OperationResult<()> {
    let saved = contract.cursor();
    expect_opcode(contract, OpCode::Transfer)?;
    contract.read_uint256()?;
    contract.read_uint256()?;
    let state = contract.read_prestate(OpCode::Transfer)?;
    if state.register_type == RegisterType::System {
        return Err(reject("system registers cannot be transferred"));
    }
    authorize(OpCode::Transfer, &state, &contract.caller())?;
    contract.restore(saved);
    Ok(())
}

pub fn execute(state: &mut State, new_owner: &Uint256, timestamp: u64) -> OperationResult<()> {
    if new_owner.is_zero() {
        return Err(reject("new owner is zero"));
    }
    if *new_owner == state.owner {
        return Err(reject("register already belongs to the recipient"));
    }
    match state.register_type {
        RegisterType::System => return Err(reject("system registers cannot be transferred")),
        RegisterType::Object => {
            if Object::from_state(state.clone())?.standard() == Standard::Trust {
                return Err(reject("trust accounts cannot be transferred"));
            }
        }
        _ => {}
    }
    state.owner = *new_owner;
    seal(OpCode::Transfer, state, timestamp)
}

pub fn commit<S: RegisterStore + ?Sized>(
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    persist(OpCode::Transfer, store, address, state)
}
