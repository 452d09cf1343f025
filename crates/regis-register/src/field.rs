use std::fmt;

use regis_types::{compact, Uint1024, Uint256, Uint512};
use serde::{Deserialize, Serialize};

use crate::error::{RegisterError, RegisterResult};

/// Marker byte preceding the type byte of a mutable field.
pub const MUTABLE_MARKER: u8 = 0xff;

/// Type tag of an object field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldType {
    Uint8 = 0x01,
    Uint16 = 0x02,
    Uint32 = 0x03,
    Uint64 = 0x04,
    Uint256 = 0x05,
    Uint512 = 0x06,
    Uint1024 = 0x07,
    String = 0x08,
    Bytes = 0x09,
}

impl FieldType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Uint8),
            0x02 => Some(Self::Uint16),
            0x03 => Some(Self::Uint32),
            0x04 => Some(Self::Uint64),
            0x05 => Some(Self::Uint256),
            0x06 => Some(Self::Uint512),
            0x07 => Some(Self::Uint1024),
            0x08 => Some(Self::String),
            0x09 => Some(Self::Bytes),
            _ => None,
        }
    }

    /// Encoded width of fixed-size types; `None` for strings and bytes.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Uint8 => Some(1),
            Self::Uint16 => Some(2),
            Self::Uint32 => Some(4),
            Self::Uint64 => Some(8),
            Self::Uint256 => Some(Uint256::BYTES),
            Self::Uint512 => Some(Uint512::BYTES),
            Self::Uint1024 => Some(Uint1024::BYTES),
            Self::String | Self::Bytes => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Uint256 => "uint256",
            Self::Uint512 => "uint512",
            Self::Uint1024 => "uint1024",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint256(Uint256),
    Uint512(Uint512),
    Uint1024(Uint1024),
    String(String),
    Bytes(Vec<u8>),
}

fn malformed(offset: usize, reason: impl Into<String>) -> RegisterError {
    RegisterError::Malformed {
        offset,
        reason: reason.into(),
    }
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Uint8(_) => FieldType::Uint8,
            Self::Uint16(_) => FieldType::Uint16,
            Self::Uint32(_) => FieldType::Uint32,
            Self::Uint64(_) => FieldType::Uint64,
            Self::Uint256(_) => FieldType::Uint256,
            Self::Uint512(_) => FieldType::Uint512,
            Self::Uint1024(_) => FieldType::Uint1024,
            Self::String(_) => FieldType::String,
            Self::Bytes(_) => FieldType::Bytes,
        }
    }

    /// Append the value encoding (without type byte) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Uint8(v) => out.push(*v),
            Self::Uint16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Uint32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Uint64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Uint256(v) => out.extend_from_slice(v.as_bytes()),
            Self::Uint512(v) => out.extend_from_slice(v.as_bytes()),
            Self::Uint1024(v) => out.extend_from_slice(v.as_bytes()),
            Self::String(v) => compact::encode_bytes(out, v.as_bytes()),
            Self::Bytes(v) => compact::encode_bytes(out, v),
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(v) => compact::encoded_len(v.len() as u64) + v.len(),
            Self::Bytes(v) => compact::encoded_len(v.len() as u64) + v.len(),
            other => other.field_type().fixed_width().unwrap_or(0),
        }
    }

    /// Decode a value of `field_type` starting at `offset` in `data`.
    /// Returns the value and the offset just past it.
    pub fn decode(field_type: FieldType, data: &[u8], offset: usize) -> RegisterResult<(Self, usize)> {
        let end = value_end(field_type, data, offset)?;
        let raw = &data[offset..end];
        let value = match field_type {
            FieldType::Uint8 => Self::Uint8(raw[0]),
            FieldType::Uint16 => Self::Uint16(u16::from_le_bytes([raw[0], raw[1]])),
            FieldType::Uint32 => Self::Uint32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            FieldType::Uint64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Self::Uint64(u64::from_le_bytes(buf))
            }
            FieldType::Uint256 => Self::Uint256(Uint256::from_slice(raw).map_err(|e| malformed(offset, e.to_string()))?),
            FieldType::Uint512 => Self::Uint512(Uint512::from_slice(raw).map_err(|e| malformed(offset, e.to_string()))?),
            FieldType::Uint1024 => Self::Uint1024(Uint1024::from_slice(raw).map_err(|e| malformed(offset, e.to_string()))?),
            FieldType::String => {
                let (bytes, _) = compact::decode_bytes(raw).map_err(|e| malformed(offset, e.to_string()))?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| malformed(offset, format!("invalid utf-8 string: {e}")))?;
                Self::String(text.to_string())
            }
            FieldType::Bytes => {
                let (bytes, _) = compact::decode_bytes(raw).map_err(|e| malformed(offset, e.to_string()))?;
                Self::Bytes(bytes.to_vec())
            }
        };
        Ok((value, end))
    }
}

/// Offset just past the value of `field_type` starting at `offset`.
pub fn value_end(field_type: FieldType, data: &[u8], offset: usize) -> RegisterResult<usize> {
    let rest = data
        .get(offset..)
        .ok_or_else(|| malformed(offset, "value starts past end of data"))?;
    let len = match field_type.fixed_width() {
        Some(width) => width,
        None => {
            let (_, consumed) =
                compact::decode_bytes(rest).map_err(|e| malformed(offset, e.to_string()))?;
            consumed
        }
    };
    if rest.len() < len {
        return Err(malformed(
            offset,
            format!("{} value needs {len} bytes, {} available", field_type.name(), rest.len()),
        ));
    }
    Ok(offset + len)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint8(v) => write!(f, "{v}"),
            Self::Uint16(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Uint256(v) => write!(f, "{v}"),
            Self::Uint512(v) => write!(f, "{v}"),
            Self::Uint1024(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

/// Rust types that map onto a single object field type.
pub trait ObjectValue: Sized {
    const FIELD_TYPE: FieldType;

    fn from_field(value: FieldValue) -> Option<Self>;

    fn into_field(self) -> FieldValue;
}

macro_rules! object_value {
    ($ty:ty, $variant:ident) => {
        impl ObjectValue for $ty {
            const FIELD_TYPE: FieldType = FieldType::$variant;

            fn from_field(value: FieldValue) -> Option<Self> {
                match value {
                    FieldValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_field(self) -> FieldValue {
                FieldValue::$variant(self)
            }
        }

        impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                FieldValue::$variant(value)
            }
        }
    };
}

object_value!(u8, Uint8);
object_value!(u16, Uint16);
object_value!(u32, Uint32);
object_value!(u64, Uint64);
object_value!(Uint256, Uint256);
object_value!(Uint512, Uint512);
object_value!(Uint1024, Uint1024);
object_value!(String, String);
object_value!(Vec<u8>, Bytes);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}
