//! OP::CREATE -- allocate a new register.

use regis_register::{Object, RegisterType, Standard, State};
use regis_types::{Address, Uint256};
use tracing::debug;

use crate::contract::Contract;
use crate::error::{OperationError, OperationResult};
use crate::execute::{expect_opcode, persist, seal};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;

fn reject(reason: impl Into<String>) -> OperationError {
    OperationError::rejected(OpCode::Create, reason)
}

/// Check a CREATE whose opcode was just read. Both cursors are left where
/// they were.
///
/// A CREATE carries no pre-state; only the operands are checked here.
pub fn verify(contract: &mut Contract) -> OperationResult<()> {
    let saved = contract.cursor();
    expect_opcode(contract, OpCode::Create)?;
    let address = contract.read_uint256()?;
    let type_byte = contract.read_u8()?;
    contract.read_bytes()?;

    if address.is_zero() {
        return Err(reject("address is zero"));
    }
    match RegisterType::from_byte(type_byte) {
        None => return Err(reject(format!("unknown register type {type_byte:#04x}"))),
        Some(RegisterType::System) => return Err(reject("system registers cannot be created")),
        Some(_) => {}
    }
    if contract.caller().is_zero() {
        return Err(reject("caller is zero"));
    }

    contract.restore(saved);
    Ok(())
}

/// The initial state of a register created by `owner`.
pub fn initial_state(register_type: RegisterType, owner: Uint256, payload: &[u8]) -> State {
    State::new(register_type, owner, payload.to_vec())
}

/// Validate a freshly allocated `state` and stamp its timestamps.
///
/// Object registers must parse, and standard objects must start empty:
/// accounts and trust accounts with zero balances, tokens with their whole
/// supply in their own balance.
pub fn execute(state: &mut State, timestamp: u64) -> OperationResult<()> {
    match state.register_type {
        RegisterType::System => return Err(reject("system registers cannot be created")),
        RegisterType::Object => check_object(state)?,
        _ => {}
    }
    state.created = timestamp;
    seal(OpCode::Create, state, timestamp)
}

fn check_object(state: &State) -> OperationResult<()> {
    let object = Object::from_state(state.clone())?;
    let standard = object.standard();
    debug!(?standard, fields = object.field_count(), "create object");

    match standard {
        Standard::Account => {
            if object.read::<u64>("balance")? != 0 {
                return Err(reject("account must start with zero balance"));
            }
        }
        Standard::Trust => {
            for name in ["balance", "trust", "stake"] {
                if object.read::<u64>(name)? != 0 {
                    return Err(reject(format!("trust account must start with zero {name}")));
                }
            }
        }
        Standard::Token => {
            if object.read::<Uint256>("identifier")?.is_zero() {
                return Err(reject("token identifier is zero"));
            }
            let supply = object.read::<u64>("supply")?;
            let balance = object.read::<u64>("balance")?;
            if supply != balance {
                return Err(reject(format!(
                    "token balance {balance} does not equal supply {supply}"
                )));
            }
        }
        Standard::NonStandard => {}
    }
    Ok(())
}

/// Persist a newly created register. Fails if the address is taken.
pub fn commit<S: RegisterStore + ?Sized>(
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    if store.has_state(address)? {
        return Err(reject(format!("register {} already exists", address.short_hex())));
    }
    persist(OpCode::Create, store, address, state)
}
