use std::collections::HashSet;

use regis_types::{compact, Uint256};

use crate::error::{RegisterError, RegisterResult};
use crate::field::{FieldValue, MUTABLE_MARKER};
use crate::object::Object;
use crate::state::{RegisterType, State};

/// Declarative construction of object register data.
///
/// ```
/// use regis_register::{ObjectBuilder, Standard};
/// use regis_types::Uint256;
///
/// let object = ObjectBuilder::account(Uint256::from_u64(1))
///     .build(Uint256::digest(b"owner"), 1_700_000_000)
///     .unwrap();
/// assert_eq!(object.standard(), Standard::Account);
/// assert_eq!(object.read::<u64>("balance").unwrap(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ObjectBuilder {
    fields: Vec<(String, FieldValue, bool)>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read-only field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name.into(), value.into(), false));
        self
    }

    /// Add a field that later writes may change.
    pub fn mutable_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name.into(), value.into(), true));
        self
    }

    /// An empty account for the token `identifier`.
    pub fn account(identifier: Uint256) -> Self {
        Self::new()
            .mutable_field("balance", 0u64)
            .field("identifier", identifier)
    }

    /// An empty trust account of the native token.
    pub fn trust() -> Self {
        Self::new()
            .mutable_field("balance", 0u64)
            .field("identifier", Uint256::ZERO)
            .mutable_field("trust", 0u64)
            .mutable_field("stake", 0u64)
    }

    /// A token whose whole `supply` starts in its own balance.
    pub fn token(identifier: Uint256, supply: u64, digits: u8) -> Self {
        Self::new()
            .mutable_field("balance", supply)
            .field("identifier", identifier)
            .field("supply", supply)
            .field("digits", digits)
    }

    /// Encode the fields in declaration order.
    pub fn encode(&self) -> RegisterResult<Vec<u8>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (name, value, mutable) in &self.fields {
            if !seen.insert(name.as_str()) {
                return Err(RegisterError::DuplicateField(name.clone()));
            }
            compact::encode_bytes(&mut out, name.as_bytes());
            if *mutable {
                out.push(MUTABLE_MARKER);
            }
            out.push(value.field_type().as_byte());
            value.encode(&mut out);
        }
        Ok(out)
    }

    /// A checksummed object register state owned by `owner`.
    pub fn build_state(&self, owner: Uint256, timestamp: u64) -> RegisterResult<State> {
        let mut state = State::new(RegisterType::Object, owner, self.encode()?);
        state.created = timestamp;
        state.modified = timestamp;
        state.set_checksum();
        Ok(state)
    }

    /// A parsed object register owned by `owner`.
    pub fn build(&self, owner: Uint256, timestamp: u64) -> RegisterResult<Object> {
        Object::from_state(self.build_state(owner, timestamp)?)
    }
}
