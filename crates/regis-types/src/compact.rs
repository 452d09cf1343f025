//! Compact-size integers.
//!
//! Encoding:
//! ```text
//! value < 0xfd          -> [value:u8]
//! value <= 0xffff       -> [0xfd][value:u16 LE]
//! value <= 0xffff_ffff  -> [0xfe][value:u32 LE]
//! otherwise             -> [0xff][value:u64 LE]
//! ```
//! Decoding rejects encodings that are longer than necessary.

use crate::error::TypeError;

/// Append the compact-size encoding of `value` to `out`.
pub fn encode(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Number of bytes [`encode`] emits for `value`.
pub fn encoded_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Decode a compact-size integer. Returns `(value, bytes_consumed)`.
pub fn decode(data: &[u8]) -> Result<(u64, usize), TypeError> {
    let first = *data.first().ok_or(TypeError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let width = match first {
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
        _ => return Ok((first as u64, 1)),
    };
    if data.len() < 1 + width {
        return Err(TypeError::Truncated {
            needed: 1 + width,
            available: data.len(),
        });
    }
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&data[1..1 + width]);
    let value = u64::from_le_bytes(buf);
    if encoded_len(value) != 1 + width {
        return Err(TypeError::NonCanonical);
    }
    Ok((value, 1 + width))
}

/// Append a compact-size length prefix followed by `bytes`.
pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    encode(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Decode a length-prefixed byte string. Returns `(bytes, bytes_consumed)`.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], usize), TypeError> {
    let (len, consumed) = decode(data)?;
    let available = data.len() - consumed;
    if len > available as u64 {
        return Err(TypeError::Truncated {
            needed: len as usize,
            available,
        });
    }
    let end = consumed + len as usize;
    Ok((&data[consumed..end], end))
}
