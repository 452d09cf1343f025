use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TypeError;

macro_rules! wide_uint {
    ($(#[$meta:meta])* $name:ident, $bytes:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; $bytes]);

        impl $name {
            /// Width of the integer in bytes.
            pub const BYTES: usize = $bytes;

            /// The zero value.
            pub const ZERO: Self = Self([0u8; $bytes]);

            /// Wrap raw little-endian bytes.
            pub const fn from_bytes(bytes: [u8; $bytes]) -> Self {
                Self(bytes)
            }

            /// Build from a slice that must be exactly [`Self::BYTES`] long.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
                if bytes.len() != $bytes {
                    return Err(TypeError::InvalidLength {
                        expected: $bytes,
                        actual: bytes.len(),
                    });
                }
                let mut arr = [0u8; $bytes];
                arr.copy_from_slice(bytes);
                Ok(Self(arr))
            }

            /// Widen a `u64` into the low bytes.
            pub fn from_u64(value: u64) -> Self {
                let mut arr = [0u8; $bytes];
                arr[..8].copy_from_slice(&value.to_le_bytes());
                Self(arr)
            }

            /// Derive a value from arbitrary data with the BLAKE3 XOF.
            pub fn digest(data: &[u8]) -> Self {
                let mut arr = [0u8; $bytes];
                blake3::Hasher::new()
                    .update(data)
                    .finalize_xof()
                    .fill(&mut arr);
                Self(arr)
            }

            /// The low 64 bits.
            pub fn low_u64(&self) -> u64 {
                let mut low = [0u8; 8];
                low.copy_from_slice(&self.0[..8]);
                u64::from_le_bytes(low)
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8; $bytes] {
                &self.0
            }

            /// Hex of the raw little-endian bytes.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Short hex representation (first 8 characters).
            pub fn short_hex(&self) -> String {
                hex::encode(&self.0[..4])
            }

            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.iter().rev().cmp(other.0.iter().rev())
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::from_u64(value)
            }
        }

        impl From<[u8; $bytes]> for $name {
            fn from(bytes: [u8; $bytes]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct HexVisitor;

                impl<'de> Visitor<'de> for HexVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a {}-byte hex string", $bytes)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        $name::from_hex(v).map_err(E::custom)
                    }
                }

                deserializer.deserialize_str(HexVisitor)
            }
        }
    };
}

wide_uint!(
    /// 256-bit unsigned integer stored as 32 little-endian bytes.
    ///
    /// Used for register addresses, owner identities and token identifiers.
    Uint256,
    32
);

wide_uint!(
    /// 512-bit unsigned integer stored as 64 little-endian bytes.
    Uint512,
    64
);

wide_uint!(
    /// 1024-bit unsigned integer stored as 128 little-endian bytes.
    Uint1024,
    128
);
