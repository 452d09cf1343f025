//! OP::DEBIT -- withdraw from an account balance.

use regis_register::{Object, RegisterType, Standard, State};
use regis_types::Address;

use crate::contract::Contract;
use crate::error::{OperationError, OperationResult};
use crate::execute::{authorize, expect_opcode, persist, seal};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;

/// Parse `state` as an object deriving from the account standard.
pub(crate) fn account(op: OpCode, state: &State) -> OperationResult<Object> {
    if state.register_type != RegisterType::Object {
        return Err(OperationError::rejected(op, "register is not an object"));
    }
    let object = Object::from_state(state.clone())?;
    if object.base() != Standard::Account {
        return Err(OperationError::rejected(op, "object is not an account"));
    }
    Ok(object)
}

/// Check a DEBIT whose opcode was just read. Both cursors are left where
/// they were.
pub fn verify(contract: &mut Contract) -> OperationResult<()> {
    let saved = contract.cursor();
    expect_opcode(contract, OpCode::Debit)?;
    contract.read_uint256()?;
    contract.read_u64()?;
    let state = contract.read_prestate(OpCode::Debit)?;
    authorize(OpCode::Debit, &state, &contract.caller())?;
    account(OpCode::Debit, &state)?;
    contract.restore(saved);
    Ok(())
}

pub fn execute(state: &mut State, amount: u64, timestamp: u64) -> OperationResult<()> {
    if amount == 0 {
        return Err(OperationError::rejected(OpCode::Debit, "amount is zero"));
    }
    let mut object = account(OpCode::Debit, state)?;
    let balance = object.read::<u64>("balance")?;
    let remaining = balance.checked_sub(amount).ok_or_else(|| {
        OperationError::rejected(
            OpCode::Debit,
            format!("balance {balance} is less than {amount}"),
        )
    })?;
    object.write("balance", remaining)?;
    *state = object.into_state();
    seal(OpCode::Debit, state, timestamp)
}

pub fn commit<S: RegisterStore + ?Sized>(
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    persist(OpCode::Debit, store, address, state)
}
