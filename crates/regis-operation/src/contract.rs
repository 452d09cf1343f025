use regis_register::{RegisterType, State};
use regis_types::{compact, Address, Uint256};

use crate::error::{OperationError, OperationResult};
use crate::opcode::{OpCode, StateFlag};

/// Saved positions of both contract streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    operation: usize,
    register: usize,
}

/// A caller's operations together with the register states they act on.
///
/// Operation stream: a sequence of `[opcode][operands]` primitives.
/// Register stream: per primitive, an optional `[PRESTATE][state]` section
/// followed by `[POSTSTATE][checksum: u64 LE]`.
///
/// Both streams are read sequentially through independent cursors which can
/// be saved and restored with [`cursor`](Self::cursor) and
/// [`restore`](Self::restore).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    caller: Uint256,
    timestamp: u64,
    operations: Vec<u8>,
    registers: Vec<u8>,
    op_pos: usize,
    reg_pos: usize,
}

impl Contract {
    pub fn new(caller: Uint256, timestamp: u64) -> Self {
        Self {
            caller,
            timestamp,
            operations: Vec::new(),
            registers: Vec::new(),
            op_pos: 0,
            reg_pos: 0,
        }
    }

    /// The identity the operations run on behalf of.
    pub fn caller(&self) -> Uint256 {
        self.caller
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn operations(&self) -> &[u8] {
        &self.operations
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    pub fn push_op(&mut self, op: OpCode) -> &mut Self {
        self.operations.push(op.as_byte());
        self
    }

    pub fn push_u8(&mut self, value: u8) -> &mut Self {
        self.operations.push(value);
        self
    }

    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.operations.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push_uint256(&mut self, value: &Uint256) -> &mut Self {
        self.operations.extend_from_slice(value.as_bytes());
        self
    }

    /// Append a compact-size length-prefixed byte string.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        compact::encode_bytes(&mut self.operations, bytes);
        self
    }

    pub fn push_create(&mut self, address: &Address, register_type: RegisterType, payload: &[u8]) -> &mut Self {
        self.push_op(OpCode::Create)
            .push_uint256(address)
            .push_u8(register_type.as_byte())
            .push_bytes(payload)
    }

    pub fn push_write(&mut self, address: &Address, payload: &[u8]) -> &mut Self {
        self.push_op(OpCode::Write).push_uint256(address).push_bytes(payload)
    }

    pub fn push_append(&mut self, address: &Address, payload: &[u8]) -> &mut Self {
        self.push_op(OpCode::Append).push_uint256(address).push_bytes(payload)
    }

    pub fn push_transfer(&mut self, address: &Address, new_owner: &Uint256) -> &mut Self {
        self.push_op(OpCode::Transfer).push_uint256(address).push_uint256(new_owner)
    }

    pub fn push_debit(&mut self, address: &Address, amount: u64) -> &mut Self {
        self.push_op(OpCode::Debit).push_uint256(address).push_u64(amount)
    }

    pub fn push_credit(&mut self, address: &Address, amount: u64) -> &mut Self {
        self.push_op(OpCode::Credit).push_uint256(address).push_u64(amount)
    }

    /// Record the state a primitive starts from.
    pub fn push_prestate(&mut self, state: &State) -> &mut Self {
        self.registers.push(StateFlag::PreState.as_byte());
        self.registers.extend_from_slice(&state.to_bytes());
        self
    }

    /// Record the checksum a primitive must produce.
    pub fn push_poststate(&mut self, checksum: u64) -> &mut Self {
        self.registers.push(StateFlag::PostState.as_byte());
        self.registers.extend_from_slice(&checksum.to_le_bytes());
        self
    }

    /// Drop the register stream so it can be rebuilt.
    pub fn clear_registers(&mut self) {
        self.registers.clear();
        self.reg_pos = 0;
    }

    // -----------------------------------------------------------------------
    // Cursors
    // -----------------------------------------------------------------------

    pub fn cursor(&self) -> Cursor {
        Cursor {
            operation: self.op_pos,
            register: self.reg_pos,
        }
    }

    pub fn restore(&mut self, cursor: Cursor) {
        self.op_pos = cursor.operation.min(self.operations.len());
        self.reg_pos = cursor.register.min(self.registers.len());
    }

    /// Move both cursors back to the start.
    pub fn reset(&mut self) {
        self.op_pos = 0;
        self.reg_pos = 0;
    }

    /// Step the operation cursor back `n` bytes.
    pub fn rewind(&mut self, n: usize) -> OperationResult<()> {
        self.op_pos = self.op_pos.checked_sub(n).ok_or_else(|| {
            OperationError::Contract(format!("cannot rewind {n} bytes from {}", self.op_pos))
        })?;
        Ok(())
    }

    /// Move the operation cursor to an absolute position.
    pub fn seek(&mut self, pos: usize) -> OperationResult<()> {
        if pos > self.operations.len() {
            return Err(OperationError::Contract(format!(
                "seek to {pos} past end {}",
                self.operations.len()
            )));
        }
        self.op_pos = pos;
        Ok(())
    }

    pub fn end_of_operations(&self) -> bool {
        self.op_pos >= self.operations.len()
    }

    // -----------------------------------------------------------------------
    // Operation stream
    // -----------------------------------------------------------------------

    fn take(&mut self, n: usize) -> OperationResult<&[u8]> {
        let end = self.op_pos + n;
        if end > self.operations.len() {
            return Err(OperationError::Contract(format!(
                "operation stream ends at {}, needed {n} bytes at {}",
                self.operations.len(),
                self.op_pos
            )));
        }
        let start = self.op_pos;
        self.op_pos = end;
        Ok(&self.operations[start..end])
    }

    pub fn read_op(&mut self) -> OperationResult<OpCode> {
        let byte = self.read_u8()?;
        OpCode::from_byte(byte)
            .ok_or_else(|| OperationError::Contract(format!("unknown opcode {byte:#04x}")))
    }

    pub fn read_u8(&mut self) -> OperationResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u64(&mut self) -> OperationResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_uint256(&mut self) -> OperationResult<Uint256> {
        let bytes = self.take(Uint256::BYTES)?;
        Uint256::from_slice(bytes).map_err(|e| OperationError::Contract(e.to_string()))
    }

    pub fn read_bytes(&mut self) -> OperationResult<Vec<u8>> {
        let (bytes, consumed) = compact::decode_bytes(&self.operations[self.op_pos..])
            .map_err(|e| OperationError::Contract(format!("byte string at {}: {e}", self.op_pos)))?;
        let bytes = bytes.to_vec();
        self.op_pos += consumed;
        Ok(bytes)
    }

    // -----------------------------------------------------------------------
    // Register stream
    // -----------------------------------------------------------------------

    pub fn read_state_flag(&mut self) -> OperationResult<StateFlag> {
        let byte = *self.registers.get(self.reg_pos).ok_or_else(|| {
            OperationError::Contract(format!("register stream ends at {}", self.reg_pos))
        })?;
        let flag = StateFlag::from_byte(byte)
            .ok_or_else(|| OperationError::Contract(format!("unknown state flag {byte:#04x}")))?;
        self.reg_pos += 1;
        Ok(flag)
    }

    pub fn read_state(&mut self) -> OperationResult<State> {
        let (state, consumed) = State::decode(&self.registers[self.reg_pos..])?;
        self.reg_pos += consumed;
        Ok(state)
    }

    pub fn read_checksum(&mut self) -> OperationResult<u64> {
        let bytes = self
            .registers
            .get(self.reg_pos..self.reg_pos + 8)
            .ok_or_else(|| OperationError::Contract("register stream ends before checksum".into()))?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        self.reg_pos += 8;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a `[PRESTATE][state]` section.
    pub fn read_prestate(&mut self, op: OpCode) -> OperationResult<State> {
        if self.read_state_flag()? != StateFlag::PreState {
            return Err(OperationError::rejected(op, "expected pre-state section"));
        }
        self.read_state()
    }

    /// Read a `[POSTSTATE][checksum]` section.
    pub fn read_poststate(&mut self, op: OpCode) -> OperationResult<u64> {
        if self.read_state_flag()? != StateFlag::PostState {
            return Err(OperationError::rejected(op, "expected post-state section"));
        }
        self.read_checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> Uint256 {
        Uint256::digest(b"caller")
    }

    #[test]
    fn operands_read_back_in_order() {
        let address = Uint256::digest(b"register");
        let mut contract = Contract::new(caller(), 10);
        contract.push_write(&address, b"payload").push_debit(&address, 77);

        assert_eq!(contract.read_op().unwrap(), OpCode::Write);
        assert_eq!(contract.read_uint256().unwrap(), address);
        assert_eq!(contract.read_bytes().unwrap(), b"payload");
        assert_eq!(contract.read_op().unwrap(), OpCode::Debit);
        assert_eq!(contract.read_uint256().unwrap(), address);
        assert_eq!(contract.read_u64().unwrap(), 77);
        assert!(contract.end_of_operations());
    }

    #[test]
    fn reading_past_end_is_malformed() {
        let mut contract = Contract::new(caller(), 0);
        contract.push_u8(1);
        contract.read_u8().unwrap();
        assert!(matches!(contract.read_u64(), Err(OperationError::Contract(_))));
        assert!(matches!(contract.read_bytes(), Err(OperationError::Contract(_))));
    }

    #[test]
    fn unknown_opcode_is_malformed() {
        let mut contract = Contract::new(caller(), 0);
        contract.push_u8(0x7f);
        assert!(matches!(contract.read_op(), Err(OperationError::Contract(_))));
    }

    #[test]
    fn rewind_seek_and_restore() {
        let mut contract = Contract::new(caller(), 0);
        contract.push_u64(5).push_u64(6);
        let start = contract.cursor();
        assert_eq!(contract.read_u64().unwrap(), 5);
        contract.rewind(8).unwrap();
        assert_eq!(contract.read_u64().unwrap(), 5);
        assert!(contract.rewind(9).is_err());
        contract.seek(8).unwrap();
        assert_eq!(contract.read_u64().unwrap(), 6);
        assert!(contract.seek(17).is_err());
        contract.restore(start);
        assert_eq!(contract.read_u64().unwrap(), 5);
    }

    #[test]
    fn register_stream_sections() {
        let mut state = State::new(RegisterType::Raw, caller(), b"raw".to_vec());
        state.created = 1;
        state.set_checksum();
        let mut contract = Contract::new(caller(), 0);
        contract.push_prestate(&state).push_poststate(state.checksum);

        assert_eq!(contract.read_prestate(OpCode::Write).unwrap(), state);
        assert_eq!(contract.read_poststate(OpCode::Write).unwrap(), state.checksum);
        assert!(contract.read_state_flag().is_err());

        contract.reset();
        assert!(matches!(
            contract.read_poststate(OpCode::Write),
            Err(OperationError::Rejected { .. })
        ));
    }

    #[test]
    fn clear_registers_resets_stream() {
        let mut contract = Contract::new(caller(), 0);
        contract.push_poststate(1);
        contract.read_state_flag().unwrap();
        contract.clear_registers();
        assert!(contract.registers().is_empty());
        assert_eq!(contract.cursor(), Cursor { operation: 0, register: 0 });
    }
}
