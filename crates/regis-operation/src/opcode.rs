use std::fmt;

/// Primitive operation codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Write = 0x01,
    Create = 0x02,
    Append = 0x03,
    Transfer = 0x04,
    Debit = 0x11,
    Credit = 0x12,
}

impl OpCode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Write),
            0x02 => Some(Self::Create),
            0x03 => Some(Self::Append),
            0x04 => Some(Self::Transfer),
            0x11 => Some(Self::Debit),
            0x12 => Some(Self::Credit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Write => "WRITE",
            Self::Create => "CREATE",
            Self::Append => "APPEND",
            Self::Transfer => "TRANSFER",
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Section markers of the register stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StateFlag {
    /// Followed by a serialized pre-state.
    PreState = 0x01,
    /// Followed by the post-state checksum.
    PostState = 0x02,
}

impl StateFlag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::PreState),
            0x02 => Some(Self::PostState),
            _ => None,
        }
    }
}
