//! OP::WRITE -- overwrite raw register data or mutable object fields.

use std::collections::HashSet;

use regis_register::{is_reserved, FieldType, FieldValue, Object, RegisterType, State};
use regis_types::{compact, Address};
use tracing::debug;

use crate::contract::Contract;
use crate::error::{OperationError, OperationResult};
use crate::execute::{authorize, expect_opcode, persist, seal};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;

/// Encode `(name, value)` pairs as a WRITE payload for object registers.
pub fn encode_payload<'a>(fields: impl IntoIterator<Item = (&'a str, FieldValue)>) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        compact::encode_bytes(&mut out, name.as_bytes());
        out.push(value.field_type().as_byte());
        value.encode(&mut out);
    }
    out
}

/// Check a WRITE whose opcode was just read.
///
/// Rewinds to the opcode, re-reads the operands and the embedded pre-state,
/// and requires a writable register owned by the caller. Both cursors are
/// left where they were.
pub fn verify(contract: &mut Contract) -> OperationResult<()> {
    let saved = contract.cursor();
    expect_opcode(contract, OpCode::Write)?;
    contract.read_uint256()?;
    contract.read_bytes()?;
    let state = contract.read_prestate(OpCode::Write)?;

    match state.register_type {
        RegisterType::Raw | RegisterType::Object => {}
        other => {
            return Err(OperationError::rejected(
                OpCode::Write,
                format!("{other:?} registers cannot be written"),
            ))
        }
    }
    authorize(OpCode::Write, &state, &contract.caller())?;

    contract.restore(saved);
    Ok(())
}

/// Apply a WRITE payload to `state`.
///
/// Object registers take a stream of `[name][type byte][value]` triples;
/// raw registers take replacement bytes of the same length. Nothing is
/// applied unless the whole payload is.
pub fn execute(state: &mut State, payload: &[u8], timestamp: u64) -> OperationResult<()> {
    match state.register_type {
        RegisterType::Object => {
            let mut object = Object::from_state(state.clone())?;
            write_fields(&mut object, payload)?;
            *state = object.into_state();
        }
        RegisterType::Raw => {
            if payload.len() != state.data.len() {
                return Err(OperationError::rejected(
                    OpCode::Write,
                    format!(
                        "raw payload is {} bytes, register holds {}",
                        payload.len(),
                        state.data.len()
                    ),
                ));
            }
            state.data.copy_from_slice(payload);
        }
        other => {
            return Err(OperationError::rejected(
                OpCode::Write,
                format!("{other:?} registers cannot be written"),
            ))
        }
    }
    seal(OpCode::Write, state, timestamp)
}

fn write_fields(object: &mut Object, payload: &[u8]) -> OperationResult<()> {
    let mut seen = HashSet::new();
    let mut pos = 0usize;
    while pos < payload.len() {
        let (name, consumed) = compact::decode_bytes(&payload[pos..])
            .map_err(|e| OperationError::rejected(OpCode::Write, format!("field name at {pos}: {e}")))?;
        let name = std::str::from_utf8(name)
            .map_err(|e| OperationError::rejected(OpCode::Write, format!("field name at {pos}: {e}")))?
            .to_string();
        pos += consumed;

        if is_reserved(&name) {
            return Err(OperationError::rejected(
                OpCode::Write,
                format!("field {name} is reserved"),
            ));
        }
        if !seen.insert(name.clone()) {
            return Err(OperationError::rejected(
                OpCode::Write,
                format!("field {name} written twice"),
            ));
        }

        let type_byte = *payload.get(pos).ok_or_else(|| {
            OperationError::rejected(OpCode::Write, format!("field {name} has no type byte"))
        })?;
        let field_type = FieldType::from_byte(type_byte).ok_or_else(|| {
            OperationError::rejected(OpCode::Write, format!("field {name} has unknown type {type_byte:#04x}"))
        })?;
        let (value, end) = FieldValue::decode(field_type, payload, pos + 1)?;
        pos = end;

        debug!(field = %name, ?field_type, "write field");
        object.write_value(&name, value)?;
    }
    Ok(())
}

/// Persist the post-state of a WRITE.
pub fn commit<S: RegisterStore + ?Sized>(
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    persist(OpCode::Write, store, address, state)
}
