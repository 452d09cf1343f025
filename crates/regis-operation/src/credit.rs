//! OP::CREDIT -- deposit into an account balance.

use regis_register::State;
use regis_types::Address;

use crate::contract::Contract;
use crate::debit::account;
use crate::error::{OperationError, OperationResult};
use crate::execute::{authorize, expect_opcode, persist, seal};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;

/// Check a CREDIT whose opcode was just read. Both cursors are left where
/// they were.
pub fn verify(contract: &mut Contract) -> OperationResult<()> {
    let saved = contract.cursor();
    expect_opcode(contract, OpCode::Credit)?;
    contract.read_uint256()?;
    contract.read_u64()?;
    let state = contract.read_prestate(OpCode::Credit)?;
    authorize(OpCode::Credit, &state, &contract.caller())?;
    account(OpCode::Credit, &state)?;
    contract.restore(saved);
    Ok(())
}

pub fn execute(state: &mut State, amount: u64, timestamp: u64) -> OperationResult<()> {
    if amount == 0 {
        return Err(OperationError::rejected(OpCode::Credit, "amount is zero"));
    }
    let mut object = account(OpCode::Credit, state)?;
    let balance = object.read::<u64>("balance")?;
    let total = balance.checked_add(amount).ok_or_else(|| {
        OperationError::rejected(
            OpCode::Credit,
            format!("balance {balance} plus {amount} overflows"),
        )
    })?;
    object.write("balance", total)?;
    *state = object.into_state();
    seal(OpCode::Credit, state, timestamp)
}

pub fn commit<S: RegisterStore + ?Sized>(
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    persist(OpCode::Credit, store, address, state)
}
