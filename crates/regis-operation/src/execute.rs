use std::collections::HashMap;

use regis_register::{RegisterType, State};
use regis_types::{Address, Uint256};
use tracing::{debug, info};

use crate::contract::Contract;
use crate::error::{OperationError, OperationResult};
use crate::opcode::OpCode;
use crate::traits::RegisterStore;
use crate::{append, create, credit, debit, transfer, write};

/// One decoded primitive of the operation stream.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Primitive {
    Write { address: Address, payload: Vec<u8> },
    Create { address: Address, register_type: RegisterType, payload: Vec<u8> },
    Append { address: Address, payload: Vec<u8> },
    Transfer { address: Address, new_owner: Uint256 },
    Debit { address: Address, amount: u64 },
    Credit { address: Address, amount: u64 },
}

impl Primitive {
    /// Read the operands of `op`, whose opcode byte was just consumed.
    fn read(op: OpCode, contract: &mut Contract) -> OperationResult<Self> {
        let address = contract.read_uint256()?;
        Ok(match op {
            OpCode::Write => Self::Write {
                address,
                payload: contract.read_bytes()?,
            },
            OpCode::Create => {
                let type_byte = contract.read_u8()?;
                let register_type = RegisterType::from_byte(type_byte).ok_or_else(|| {
                    OperationError::rejected(op, format!("unknown register type {type_byte:#04x}"))
                })?;
                Self::Create {
                    address,
                    register_type,
                    payload: contract.read_bytes()?,
                }
            }
            OpCode::Append => Self::Append {
                address,
                payload: contract.read_bytes()?,
            },
            OpCode::Transfer => Self::Transfer {
                address,
                new_owner: contract.read_uint256()?,
            },
            OpCode::Debit => Self::Debit {
                address,
                amount: contract.read_u64()?,
            },
            OpCode::Credit => Self::Credit {
                address,
                amount: contract.read_u64()?,
            },
        })
    }

    fn op(&self) -> OpCode {
        match self {
            Self::Write { .. } => OpCode::Write,
            Self::Create { .. } => OpCode::Create,
            Self::Append { .. } => OpCode::Append,
            Self::Transfer { .. } => OpCode::Transfer,
            Self::Debit { .. } => OpCode::Debit,
            Self::Credit { .. } => OpCode::Credit,
        }
    }

    fn address(&self) -> &Address {
        match self {
            Self::Write { address, .. }
            | Self::Create { address, .. }
            | Self::Append { address, .. }
            | Self::Transfer { address, .. }
            | Self::Debit { address, .. }
            | Self::Credit { address, .. } => address,
        }
    }

    fn verify(op: OpCode, contract: &mut Contract) -> OperationResult<()> {
        match op {
            OpCode::Write => write::verify(contract),
            OpCode::Create => create::verify(contract),
            OpCode::Append => append::verify(contract),
            OpCode::Transfer => transfer::verify(contract),
            OpCode::Debit => debit::verify(contract),
            OpCode::Credit => credit::verify(contract),
        }
    }

    /// Run the state transition from `current`.
    fn apply(&self, current: Option<State>, caller: Uint256, timestamp: u64) -> OperationResult<State> {
        let op = self.op();
        let address = self.address().short_hex();
        match (self, current) {
            (Self::Create { .. }, Some(_)) => Err(OperationError::rejected(
                op,
                format!("register {address} already exists"),
            )),
            (Self::Create { register_type, payload, .. }, None) => {
                let mut state = create::initial_state(*register_type, caller, payload);
                create::execute(&mut state, timestamp)?;
                Ok(state)
            }
            (_, None) => Err(OperationError::rejected(
                op,
                format!("register {address} does not exist"),
            )),
            (Self::Write { payload, .. }, Some(mut state)) => {
                write::execute(&mut state, payload, timestamp)?;
                Ok(state)
            }
            (Self::Append { payload, .. }, Some(mut state)) => {
                append::execute(&mut state, payload, timestamp)?;
                Ok(state)
            }
            (Self::Transfer { new_owner, .. }, Some(mut state)) => {
                transfer::execute(&mut state, new_owner, timestamp)?;
                Ok(state)
            }
            (Self::Debit { amount, .. }, Some(mut state)) => {
                debit::execute(&mut state, *amount, timestamp)?;
                Ok(state)
            }
            (Self::Credit { amount, .. }, Some(mut state)) => {
                credit::execute(&mut state, *amount, timestamp)?;
                Ok(state)
            }
        }
    }

    fn commit<S: RegisterStore + ?Sized>(&self, store: &S, state: &State) -> OperationResult<()> {
        let address = self.address();
        match self {
            Self::Write { .. } => write::commit(store, address, state),
            Self::Create { .. } => create::commit(store, address, state),
            Self::Append { .. } => append::commit(store, address, state),
            Self::Transfer { .. } => transfer::commit(store, address, state),
            Self::Debit { .. } => debit::commit(store, address, state),
            Self::Credit { .. } => credit::commit(store, address, state),
        }
    }
}

/// Current state of `address`, preferring states produced earlier in the
/// same contract.
fn current_state<S: RegisterStore + ?Sized>(
    store: &S,
    overlay: &HashMap<Address, State>,
    address: &Address,
) -> OperationResult<Option<State>> {
    match overlay.get(address) {
        Some(state) => Ok(Some(state.clone())),
        None => Ok(store.read_state(address)?),
    }
}

/// Verify, execute and commit every primitive in `contract`.
///
/// Each primitive's embedded pre-state must equal the register's current
/// state and its computed post-state must match the recorded checksum.
/// States are committed only after every primitive has passed, so a
/// declined contract leaves the store untouched.
pub fn execute<S: RegisterStore + ?Sized>(contract: &mut Contract, store: &S) -> OperationResult<()> {
    contract.reset();
    let result = run(contract, store);
    if let Err(e) = &result {
        if e.is_storage_failure() {
            tracing::error!(error = %e, "contract commit failed");
        } else {
            debug!(error = %e, "contract declined");
        }
    }
    result
}

fn run<S: RegisterStore + ?Sized>(contract: &mut Contract, store: &S) -> OperationResult<()> {
    let mut overlay = HashMap::new();
    let mut pending = Vec::new();

    while !contract.end_of_operations() {
        let op = contract.read_op()?;
        Primitive::verify(op, contract)?;
        let primitive = Primitive::read(op, contract)?;
        let address = *primitive.address();
        let current = current_state(store, &overlay, &address)?;

        if op != OpCode::Create {
            let prestate = contract.read_prestate(op)?;
            if current.as_ref() != Some(&prestate) {
                return Err(OperationError::rejected(
                    op,
                    format!("pre-state does not match register {}", address.short_hex()),
                ));
            }
        }

        let state = primitive.apply(current, contract.caller(), contract.timestamp())?;
        let expected = contract.read_poststate(op)?;
        if expected != state.checksum {
            return Err(OperationError::rejected(
                op,
                format!(
                    "post-state checksum {:016x} does not match computed {:016x}",
                    expected, state.checksum
                ),
            ));
        }

        debug!(%op, address = %address.short_hex(), "operation verified");
        overlay.insert(address, state.clone());
        pending.push((primitive, state));
    }

    for (primitive, state) in &pending {
        primitive.commit(store, state)?;
    }
    info!(operations = pending.len(), caller = %contract.caller().short_hex(), "contract executed");
    Ok(())
}

/// Fill the register stream of `contract` from the current store contents.
///
/// Any existing register stream is discarded. Every primitive is run
/// against the store (and the states produced by earlier primitives) to
/// record its pre-state and post-state checksum. Nothing is committed.
pub fn build<S: RegisterStore + ?Sized>(contract: &mut Contract, store: &S) -> OperationResult<()> {
    contract.reset();
    contract.clear_registers();
    let mut overlay = HashMap::new();

    while !contract.end_of_operations() {
        let op = contract.read_op()?;
        let primitive = Primitive::read(op, contract)?;
        let address = *primitive.address();
        let current = current_state(store, &overlay, &address)?;

        if op != OpCode::Create {
            if let Some(prestate) = &current {
                contract.push_prestate(prestate);
            }
        }
        let state = primitive.apply(current, contract.caller(), contract.timestamp())?;
        contract.push_poststate(state.checksum);
        overlay.insert(address, state);
    }

    contract.reset();
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared steps of the primitives
// ---------------------------------------------------------------------------

/// Step back over the opcode just read and check it is `op`.
pub(crate) fn expect_opcode(contract: &mut Contract, op: OpCode) -> OperationResult<()> {
    contract.rewind(1)?;
    let found = contract.read_op()?;
    if found != op {
        return Err(OperationError::Contract(format!("expected {op}, found {found}")));
    }
    Ok(())
}

/// The pre-state must be well formed and owned by the caller.
pub(crate) fn authorize(op: OpCode, state: &State, caller: &Uint256) -> OperationResult<()> {
    if !state.is_valid() {
        return Err(OperationError::rejected(
            op,
            "pre-state checksum does not match its contents",
        ));
    }
    if state.owner != *caller {
        return Err(OperationError::rejected(
            op,
            format!("caller {} is not the register owner", caller.short_hex()),
        ));
    }
    Ok(())
}

/// Stamp the modified time, recompute the checksum and re-check validity.
pub(crate) fn seal(op: OpCode, state: &mut State, timestamp: u64) -> OperationResult<()> {
    state.modified = timestamp;
    state.set_checksum();
    if !state.is_valid() {
        return Err(OperationError::rejected(op, "post-state is not valid"));
    }
    Ok(())
}

pub(crate) fn persist<S: RegisterStore + ?Sized>(
    op: OpCode,
    store: &S,
    address: &Address,
    state: &State,
) -> OperationResult<()> {
    store.write_state(address, state)?;
    debug!(%op, address = %address.short_hex(), checksum = state.checksum, "state committed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::memory::InMemoryRegisterStore;
    use crate::sector::SectorRegisterStore;
    use crate::write::encode_payload;
    use regis_keychain::{FileKeychain, FileMapConfig};
    use regis_register::{FieldValue, Object, ObjectBuilder};

    fn alice() -> Uint256 {
        Uint256::digest(b"alice")
    }

    fn bob() -> Uint256 {
        Uint256::digest(b"bob")
    }

    fn balance<S: RegisterStore + ?Sized>(store: &S, address: &Address) -> u64 {
        let state = store.read_state(address).unwrap().unwrap();
        Object::from_state(state).unwrap().read("balance").unwrap()
    }

    /// Build then execute a contract in one step.
    fn run_contract<S: RegisterStore + ?Sized>(
        store: &S,
        caller: Uint256,
        timestamp: u64,
        ops: impl FnOnce(&mut Contract),
    ) -> OperationResult<Contract> {
        let mut contract = Contract::new(caller, timestamp);
        ops(&mut contract);
        build(&mut contract, store)?;
        execute(&mut contract, store)?;
        Ok(contract)
    }

    fn account_payload() -> Vec<u8> {
        ObjectBuilder::account(Uint256::from_u64(1)).encode().unwrap()
    }

    // -----------------------------------------------------------------------
    // End to end
    // -----------------------------------------------------------------------

    #[test]
    fn create_then_write_raw_register() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"note");

        run_contract(&store, alice(), 10, |c| {
            c.push_create(&address, RegisterType::Raw, b"draft");
        })
        .unwrap();
        let state = store.read_state(&address).unwrap().unwrap();
        assert_eq!(state.owner, alice());
        assert_eq!((state.created, state.modified), (10, 10));

        run_contract(&store, alice(), 20, |c| {
            c.push_write(&address, b"final");
        })
        .unwrap();
        let state = store.read_state(&address).unwrap().unwrap();
        assert_eq!(state.data, b"final");
        assert_eq!((state.created, state.modified), (10, 20));
        assert!(state.is_valid());
    }

    #[test]
    fn several_primitives_chain_through_one_contract() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"wallet");

        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Object, &account_payload())
                .push_credit(&address, 100)
                .push_debit(&address, 40)
                .push_credit(&address, 5);
        })
        .unwrap();
        assert_eq!(balance(&store, &address), 65);
    }

    #[test]
    fn transfer_then_new_owner_writes() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"log");
        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Append, b"a");
        })
        .unwrap();
        run_contract(&store, alice(), 2, |c| {
            c.push_append(&address, b"b").push_transfer(&address, &bob());
        })
        .unwrap();

        let err = run_contract(&store, alice(), 3, |c| {
            c.push_append(&address, b"c");
        })
        .unwrap_err();
        assert!(err.to_string().contains("owner"));

        run_contract(&store, bob(), 4, |c| {
            c.push_append(&address, b"c");
        })
        .unwrap();
        let state = store.read_state(&address).unwrap().unwrap();
        assert_eq!(state.data, b"abc");
        assert_eq!(state.owner, bob());
    }

    #[test]
    fn object_write_through_contract() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"profile");
        let profile = ObjectBuilder::new()
            .mutable_field("score", 0u64)
            .field("kind", 1u8)
            .encode()
            .unwrap();
        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Object, &profile);
        })
        .unwrap();

        let payload = encode_payload([("score", FieldValue::Uint64(42))]);
        run_contract(&store, alice(), 2, |c| {
            c.push_write(&address, &payload);
        })
        .unwrap();
        let object = Object::from_state(store.read_state(&address).unwrap().unwrap()).unwrap();
        assert_eq!(object.read::<u64>("score").unwrap(), 42);
    }

    // -----------------------------------------------------------------------
    // Declines
    // -----------------------------------------------------------------------

    #[test]
    fn declined_contract_commits_nothing() {
        let store = InMemoryRegisterStore::new();
        let wallet = Uint256::digest(b"wallet");
        let note = Uint256::digest(b"note");
        run_contract(&store, alice(), 1, |c| {
            c.push_create(&wallet, RegisterType::Object, &account_payload())
                .push_credit(&wallet, 10);
        })
        .unwrap();

        let mut contract = Contract::new(alice(), 2);
        contract
            .push_create(&note, RegisterType::Raw, b"x")
            .push_credit(&wallet, 5)
            .push_debit(&wallet, 100);
        let err = build(&mut contract, &store).unwrap_err();
        assert!(matches!(err, OperationError::Rejected { op: OpCode::Debit, .. }));

        assert!(!store.has_state(&note).unwrap());
        assert_eq!(balance(&store, &wallet), 10);
    }

    #[test]
    fn late_decline_discards_earlier_primitives() {
        let store = InMemoryRegisterStore::new();
        let theirs = Uint256::digest(b"bob's note");
        let mine = Uint256::digest(b"alice's note");
        run_contract(&store, bob(), 1, |c| {
            c.push_create(&theirs, RegisterType::Raw, b"bob");
        })
        .unwrap();

        // Builds fine: ownership is only checked when verifying.
        let mut contract = Contract::new(alice(), 2);
        contract
            .push_create(&mine, RegisterType::Raw, b"x")
            .push_write(&theirs, b"eve");
        build(&mut contract, &store).unwrap();

        let err = execute(&mut contract, &store).unwrap_err();
        assert!(matches!(err, OperationError::Rejected { op: OpCode::Write, .. }));
        assert!(!store.has_state(&mine).unwrap());
        assert_eq!(store.read_state(&theirs).unwrap().unwrap().data, b"bob");
    }

    #[test]
    fn duplicate_field_write_leaves_store_untouched() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"profile");
        let profile = ObjectBuilder::new()
            .mutable_field("a", 1u8)
            .mutable_field("b", 2u8)
            .encode()
            .unwrap();
        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Object, &profile);
        })
        .unwrap();
        let before = store.read_state(&address).unwrap();

        let payload = encode_payload([
            ("a", FieldValue::Uint8(9)),
            ("b", FieldValue::Uint8(9)),
            ("a", FieldValue::Uint8(8)),
        ]);
        let err = run_contract(&store, alice(), 2, |c| {
            c.push_write(&address, &payload);
        })
        .unwrap_err();
        assert!(!err.is_storage_failure());
        assert_eq!(store.read_state(&address).unwrap(), before);
    }

    #[test]
    fn tampered_poststate_rejected() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"note");
        let mut contract = Contract::new(alice(), 1);
        contract.push_create(&address, RegisterType::Raw, b"x");
        build(&mut contract, &store).unwrap();

        // Same operations, wrong checksum.
        let mut forged = Contract::new(alice(), 1);
        forged.push_create(&address, RegisterType::Raw, b"x");
        forged.push_poststate(0xdead_beef);
        let err = execute(&mut forged, &store).unwrap_err();
        assert!(err.to_string().contains("post-state"));
        assert!(!store.has_state(&address).unwrap());

        execute(&mut contract, &store).unwrap();
        assert!(store.has_state(&address).unwrap());
    }

    #[test]
    fn stale_prestate_rejected() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"note");
        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Raw, b"one");
        })
        .unwrap();

        let mut first = Contract::new(alice(), 2);
        first.push_write(&address, b"two");
        build(&mut first, &store).unwrap();
        let mut second = first.clone();

        execute(&mut first, &store).unwrap();
        let err = execute(&mut second, &store).unwrap_err();
        assert!(err.to_string().contains("pre-state"));
    }

    #[test]
    fn create_on_existing_address_rejected() {
        let store = InMemoryRegisterStore::new();
        let address = Uint256::digest(b"note");
        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Raw, b"one");
        })
        .unwrap();
        let err = run_contract(&store, bob(), 2, |c| {
            c.push_create(&address, RegisterType::Raw, b"two");
        })
        .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(store.read_state(&address).unwrap().unwrap().owner, alice());
    }

    #[test]
    fn missing_register_rejected() {
        let store = InMemoryRegisterStore::new();
        let err = run_contract(&store, alice(), 1, |c| {
            c.push_write(&Uint256::digest(b"nowhere"), b"x");
        })
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn truncated_contract_is_malformed() {
        let store = InMemoryRegisterStore::new();
        let mut contract = Contract::new(alice(), 1);
        contract.push_op(OpCode::Debit).push_u8(1);
        assert!(matches!(
            execute(&mut contract, &store),
            Err(OperationError::Contract(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Storage failures
    // -----------------------------------------------------------------------

    struct FailingStore(InMemoryRegisterStore);

    impl RegisterStore for FailingStore {
        fn read_state(&self, address: &Address) -> StoreResult<Option<State>> {
            self.0.read_state(address)
        }

        fn write_state(&self, _address: &Address, _state: &State) -> StoreResult<()> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn commit_failure_is_a_storage_failure() {
        let store = FailingStore(InMemoryRegisterStore::new());
        let err = run_contract(&store, alice(), 1, |c| {
            c.push_create(&Uint256::digest(b"note"), RegisterType::Raw, b"x");
        })
        .unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn runs_over_sector_store() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = FileKeychain::open(dir.path().join("keychain"), FileMapConfig::default()).unwrap();
        let store =
            SectorRegisterStore::open(dir.path().join("sectors"), keychain, &FileMapConfig::default())
                .unwrap();
        let address = Uint256::digest(b"wallet");

        run_contract(&store, alice(), 1, |c| {
            c.push_create(&address, RegisterType::Object, &account_payload())
                .push_credit(&address, 7);
        })
        .unwrap();
        run_contract(&store, alice(), 2, |c| {
            c.push_debit(&address, 3);
        })
        .unwrap();
        assert_eq!(balance(&store, &address), 4);
    }
}
