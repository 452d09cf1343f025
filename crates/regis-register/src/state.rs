use regis_types::{compact, Uint256};
use serde::{Deserialize, Serialize};

use crate::error::{RegisterError, RegisterResult};

/// Current state serialization version.
pub const STATE_VERSION: u16 = 1;

/// Kind of register, fixing which operations may change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RegisterType {
    /// Written once at creation.
    Readonly = 0x01,
    /// Data may only grow.
    Append = 0x02,
    /// Opaque bytes, rewritable by the owner.
    Raw = 0x03,
    /// Self-describing field blob.
    Object = 0x04,
    /// Maintained by the ledger itself.
    System = 0x05,
}

impl RegisterType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Readonly),
            0x02 => Some(Self::Append),
            0x03 => Some(Self::Raw),
            0x04 => Some(Self::Object),
            0x05 => Some(Self::System),
            _ => None,
        }
    }
}

/// A register's state.
///
/// Serialized layout (all integers little-endian):
/// ```text
/// [version: u16][type: u8][owner: 32][created: u64][modified: u64]
/// [data: compact-size length + bytes][checksum: u64]
/// ```
/// The checksum is the low 64 bits of the BLAKE3 hash of everything before
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub version: u16,
    pub register_type: RegisterType,
    pub owner: Uint256,
    pub created: u64,
    pub modified: u64,
    pub data: Vec<u8>,
    pub checksum: u64,
}

impl State {
    pub fn new(register_type: RegisterType, owner: Uint256, data: Vec<u8>) -> Self {
        Self {
            version: STATE_VERSION,
            register_type,
            owner,
            created: 0,
            modified: 0,
            data,
            checksum: 0,
        }
    }

    /// A state with no owner, data, or timestamps.
    pub fn is_null(&self) -> bool {
        self.owner.is_zero() && self.data.is_empty() && self.created == 0 && self.modified == 0
    }

    /// Serialization without the trailing checksum.
    fn body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 1 + 32 + 8 + 8 + 9 + self.data.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.register_type.as_byte());
        out.extend_from_slice(self.owner.as_bytes());
        out.extend_from_slice(&self.created.to_le_bytes());
        out.extend_from_slice(&self.modified.to_le_bytes());
        compact::encode_bytes(&mut out, &self.data);
        out
    }

    /// Hash of the state excluding its checksum field.
    pub fn hash(&self) -> u64 {
        let digest = blake3::hash(&self.body());
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(low)
    }

    pub fn set_checksum(&mut self) {
        self.checksum = self.hash();
    }

    /// Non-null and carrying a checksum that matches its contents.
    pub fn is_valid(&self) -> bool {
        !self.is_null() && self.checksum == self.hash()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.body();
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> RegisterResult<Self> {
        let (state, consumed) = Self::decode(data)?;
        if consumed != data.len() {
            return Err(RegisterError::MalformedState(format!(
                "{} trailing bytes",
                data.len() - consumed
            )));
        }
        Ok(state)
    }

    /// Decode a state from the front of `data`. Returns the state and the
    /// number of bytes consumed.
    pub fn decode(data: &[u8]) -> RegisterResult<(Self, usize)> {
        const FIXED: usize = 2 + 1 + 32 + 8 + 8;
        if data.len() < FIXED {
            return Err(RegisterError::MalformedState(format!(
                "header needs {FIXED} bytes, got {}",
                data.len()
            )));
        }
        let version = u16::from_le_bytes([data[0], data[1]]);
        let register_type =
            RegisterType::from_byte(data[2]).ok_or(RegisterError::UnknownRegisterType(data[2]))?;
        let owner = Uint256::from_slice(&data[3..35])
            .map_err(|e| RegisterError::MalformedState(e.to_string()))?;
        let created = read_u64(&data[35..43]);
        let modified = read_u64(&data[43..51]);

        let (blob, consumed) = compact::decode_bytes(&data[FIXED..])
            .map_err(|e| RegisterError::MalformedState(format!("data: {e}")))?;
        let pos = FIXED + consumed;
        let checksum_bytes = data.get(pos..pos + 8).ok_or_else(|| {
            RegisterError::MalformedState("missing checksum".into())
        })?;

        Ok((
            Self {
                version,
                register_type,
                owner,
                created,
                modified,
                data: blob.to_vec(),
                checksum: read_u64(checksum_bytes),
            },
            pos + 8,
        ))
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
