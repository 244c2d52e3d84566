//! Low-level string helpers shared by the token, login and RPC codecs.
//!
//! TDS carries text as UTF-16LE. Lengths are counted in UTF-16 code units
//! and prefixed as a byte (`B_VARCHAR`) or a little-endian u16 (`US_VARCHAR`).

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Read a `B_VARCHAR`: 1-byte character count followed by UTF-16LE bytes.
pub fn read_b_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = src.get_u8() as usize;
    read_utf16_string(src, len)
}

/// Read a `US_VARCHAR`: 2-byte character count followed by UTF-16LE bytes.
pub fn read_us_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = src.get_u16_le() as usize;
    read_utf16_string(src, len)
}

/// Read `char_count` UTF-16LE code units.
pub fn read_utf16_string(src: &mut impl Buf, char_count: usize) -> Result<String, ProtocolError> {
    let byte_count = char_count * 2;
    if src.remaining() < byte_count {
        return Err(ProtocolError::IncompletePacket {
            expected: byte_count,
            actual: src.remaining(),
        });
    }

    let units: Vec<u16> = (0..char_count).map(|_| src.get_u16_le()).collect();
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidString("utf-16 text"))
}

/// Decode a whole byte slice as UTF-16LE. A trailing odd byte is an error.
pub fn decode_utf16_bytes(bytes: &[u8], context: &'static str) -> Result<String, ProtocolError> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::InvalidString(context));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidString(context))
}

/// Write a `B_VARCHAR`. Strings longer than 255 code units are truncated.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().take(u8::MAX as usize).collect();
    dst.put_u8(units.len() as u8);
    for unit in units {
        dst.put_u16_le(unit);
    }
}

/// Write a `US_VARCHAR`. Strings longer than 65535 code units are truncated.
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().take(u16::MAX as usize).collect();
    dst.put_u16_le(units.len() as u16);
    for unit in units {
        dst.put_u16_le(unit);
    }
}

/// Write a UTF-16LE string without length prefix.
pub fn write_utf16_string(dst: &mut impl BufMut, s: &str) {
    for c in s.encode_utf16() {
        dst.put_u16_le(c);
    }
}

/// Byte length of the UTF-16 encoding of `s`.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}
