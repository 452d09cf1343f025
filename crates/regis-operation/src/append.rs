//! OP::APPEND -- extend the data of append and raw registers.

use regis_register::{RegisterType, State};
use regis_types::Address;

use crate::contract::Contract;
use crate::error::{OperationError, OperationResult};
use crate::execute::{authorize, expect_opcode, persist, seal};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;

fn check_appendable(state: &State) -> OperationResult<()> {
    match state.register_type {
        RegisterType::Append | RegisterType::Raw => Ok(()),
        other => Err(OperationError::rejected(
            OpCode::Append,
            format!("{other:?} registers cannot be appended to"),
        )),
    }
}

/// Check an APPEND whose opcode was just read. Both cursors are left where
/// they were.
pub fn verify(contract: &mut Contract) -> OperationResult<()> {
    let saved = contract.cursor();
    expect_opcode(contract, OpCode::Append)?;
    contract.read_uint256()?;
    contract.read_bytes()?;
    let state = contract.read_prestate(OpCode::Append)?;
    check_appendable(&state)?;
    authorize(OpCode::Append, &state, &contract.caller())?;
    contract.restore(saved);
    Ok(())
}

pub fn execute(state: &mut State, payload: &[u8], timestamp: u64) -> OperationResult<()> {
    check_appendable(state)?;
    if payload.is_empty() {
        return Err(OperationError::rejected(OpCode::Append, "empty payload"));
    }
    state.data.extend_from_slice(payload);
    seal(OpCode::Append, state, timestamp)
}

pub fn commit<S: RegisterStore + ?Sized>(
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    persist(OpCode::Append, store, address, state)
}
