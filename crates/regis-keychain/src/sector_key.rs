use serde::{Deserialize, Serialize};

use crate::error::{KeychainError, KeychainResult};

/// Size of the fixed record header in bytes.
///
/// ```text
/// [state: u8][length: u16 LE][sector_file: u16 LE][sector_size: u32 LE][sector_start: u32 LE]
/// ```
pub const HEADER_SIZE: usize = 13;

/// Lifecycle state of a keychain record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyState {
    /// Erased; the slot is a hole.
    Empty = 0,
    Read = 1,
    Write = 2,
    /// Committed and visible.
    Ready = 3,
    /// Written inside an open transaction; visible to lookups.
    Transaction = 4,
}

impl KeyState {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Empty),
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::Ready),
            4 => Some(Self::Transaction),
            _ => None,
        }
    }

    /// States whose records a lookup returns.
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Ready | Self::Transaction)
    }
}

/// Decoded fixed-size record header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorHeader {
    pub state: KeyState,
    /// Length of the key bytes following the header.
    pub length: u16,
    pub sector_file: u16,
    pub sector_size: u32,
    pub sector_start: u32,
}

impl SectorHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.state.as_byte();
        out[1..3].copy_from_slice(&self.length.to_le_bytes());
        out[3..5].copy_from_slice(&self.sector_file.to_le_bytes());
        out[5..9].copy_from_slice(&self.sector_size.to_le_bytes());
        out[9..13].copy_from_slice(&self.sector_start.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> KeychainResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(KeychainError::InvalidRecord(format!(
                "header needs {HEADER_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let state = KeyState::from_byte(data[0]).ok_or_else(|| {
            KeychainError::InvalidRecord(format!("unknown key state {:#04x}", data[0]))
        })?;
        Ok(Self {
            state,
            length: u16::from_le_bytes([data[1], data[2]]),
            sector_file: u16::from_le_bytes([data[3], data[4]]),
            sector_size: u32::from_le_bytes([data[5], data[6], data[7], data[8]]),
            sector_start: u32::from_le_bytes([data[9], data[10], data[11], data[12]]),
        })
    }
}

/// A keychain record: a key and the sector location of its data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorKey {
    pub state: KeyState,
    /// File index of the data in the sector store.
    pub sector_file: u16,
    /// Length of the data in the sector store.
    pub sector_size: u32,
    /// Byte offset of the data within its sector file.
    pub sector_start: u32,
    pub key: Vec<u8>,
}

impl SectorKey {
    pub fn new(
        state: KeyState,
        key: Vec<u8>,
        sector_file: u16,
        sector_start: u32,
        sector_size: u32,
    ) -> Self {
        Self {
            state,
            sector_file,
            sector_size,
            sector_start,
            key,
        }
    }

    /// A committed record.
    pub fn ready(key: impl Into<Vec<u8>>, sector_file: u16, sector_start: u32, sector_size: u32) -> Self {
        Self::new(KeyState::Ready, key.into(), sector_file, sector_start, sector_size)
    }

    /// Serialized size: header plus key bytes.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.key.len()
    }

    pub fn is_ready(&self) -> bool {
        self.state == KeyState::Ready
    }

    pub fn header(&self) -> KeychainResult<SectorHeader> {
        let length = u16::try_from(self.key.len()).map_err(|_| KeychainError::KeyTooLarge {
            len: self.key.len(),
            max: u16::MAX as usize,
        })?;
        Ok(SectorHeader {
            state: self.state,
            length,
            sector_file: self.sector_file,
            sector_size: self.sector_size,
            sector_start: self.sector_start,
        })
    }

    /// Header followed by the key bytes.
    pub fn to_bytes(&self) -> KeychainResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&self.header()?.encode());
        out.extend_from_slice(&self.key);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> KeychainResult<Self> {
        let header = SectorHeader::decode(data)?;
        let end = HEADER_SIZE + header.length as usize;
        if data.len() < end {
            return Err(KeychainError::InvalidRecord(format!(
                "record needs {end} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self::from_header(header, data[HEADER_SIZE..end].to_vec()))
    }

    pub(crate) fn from_header(header: SectorHeader, key: Vec<u8>) -> Self {
        Self::new(
            header.state,
            key,
            header.sector_file,
            header.sector_start,
            header.sector_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian() {
        let key = SectorKey::ready(b"k".to_vec(), 0x0102, 0x0a0b0c0d, 0x11223344);
        let bytes = key.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 1);
        assert_eq!(bytes[0], 3);
        assert_eq!(&bytes[1..3], &[1, 0]);
        assert_eq!(&bytes[3..5], &[0x02, 0x01]);
        assert_eq!(&bytes[5..9], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&bytes[9..13], &[0x0d, 0x0c, 0x0b, 0x0a]);
        assert_eq!(bytes[13], b'k');
    }

    #[test]
    fn decode_inverts_encode() {
        let key = SectorKey::new(KeyState::Transaction, b"account".to_vec(), 7, 4096, 220);
        let decoded = SectorKey::from_bytes(&key.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.size(), HEADER_SIZE + 7);
    }

    #[test]
    fn unknown_state_is_invalid() {
        let mut bytes = SectorKey::ready(b"x".to_vec(), 0, 0, 0).to_bytes().unwrap();
        bytes[0] = 9;
        let err = SectorKey::from_bytes(&bytes).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn truncated_record_is_invalid() {
        let bytes = SectorKey::ready(b"abcdef".to_vec(), 0, 0, 0).to_bytes().unwrap();
        assert!(SectorKey::from_bytes(&bytes[..HEADER_SIZE + 2]).is_err());
        assert!(SectorHeader::decode(&bytes[..4]).is_err());
    }

    #[test]
    fn oversized_key_rejected() {
        let key = SectorKey::ready(vec![0u8; u16::MAX as usize + 1], 0, 0, 0);
        assert!(matches!(
            key.to_bytes(),
            Err(KeychainError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn visibility_by_state() {
        assert!(KeyState::Ready.is_visible());
        assert!(KeyState::Transaction.is_visible());
        assert!(!KeyState::Empty.is_visible());
        assert!(!KeyState::Write.is_visible());
        assert_eq!(KeyState::from_byte(KeyState::Read.as_byte()), Some(KeyState::Read));
    }
}
