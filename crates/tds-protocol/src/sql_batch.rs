//! SQL batch payloads (packet type 0x01).
//!
//! A batch payload is an optional ALL_HEADERS section followed by the SQL
//! text as UTF-16LE.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf16_bytes, write_utf16_string};
use crate::error::ProtocolError;

/// Size of the ALL_HEADERS block written by [`encode_sql_batch`].
pub const ALL_HEADERS_LEN: usize = 22;

/// Decode a SQL batch payload into its text.
///
/// ALL_HEADERS is detected by its little-endian total length: it must be at
/// least 4, fit inside the payload, and every contained header length must
/// add up to it. Clients that omit the block send bare UTF-16LE.
pub fn decode_sql_batch(payload: &[u8]) -> Result<String, ProtocolError> {
    let text = &payload[all_headers_len(payload)..];
    decode_utf16_bytes(text, "sql batch")
}

fn all_headers_len(payload: &[u8]) -> usize {
    let Some(head) = payload.get(..4) else {
        return 0;
    };
    let total = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    if total < 4 || total > payload.len() {
        return 0;
    }

    let mut pos = 4;
    while pos < total {
        let Some(len) = payload.get(pos..pos + 4) else {
            return 0;
        };
        let header_len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if header_len < 6 || pos + header_len > total {
            return 0;
        }
        pos += header_len;
    }
    total
}

/// Encode a SQL batch with an auto-commit transaction descriptor header.
///
/// ```
/// use tds_protocol::{decode_sql_batch, encode_sql_batch};
///
/// let payload = encode_sql_batch("SELECT 1");
/// assert_eq!(decode_sql_batch(&payload).unwrap(), "SELECT 1");
/// ```
#[must_use]
pub fn encode_sql_batch(sql: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_LEN + sql.len() * 2);

    buf.put_u32_le(ALL_HEADERS_LEN as u32);
    // Transaction descriptor header: length, type 0x0002, descriptor, request count
    buf.put_u32_le(18);
    buf.put_u16_le(0x0002);
    buf.put_u64_le(0);
    buf.put_u32_le(1);

    write_utf16_string(&mut buf, sql);
    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sql_batch_layout() {
        let payload = encode_sql_batch("SELECT 1");
        assert_eq!(payload.len(), 38);
        assert_eq!(&payload[0..4], &[22, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[18, 0, 0, 0]);
        assert_eq!(&payload[8..10], &[0x02, 0x00]);
        assert_eq!(&payload[22..24], &[b'S', 0]);
    }

    #[test]
    fn test_decode_with_all_headers() {
        let payload = encode_sql_batch("SELECT * FROM t WHERE s = 'é'");
        assert_eq!(
            decode_sql_batch(&payload).unwrap(),
            "SELECT * FROM t WHERE s = 'é'"
        );
    }

    #[test]
    fn test_decode_without_all_headers() {
        let mut buf = BytesMut::new();
        write_utf16_string(&mut buf, "SELECT 1");
        assert_eq!(decode_sql_batch(&buf).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_decode_empty_batch() {
        assert_eq!(decode_sql_batch(&encode_sql_batch("")).unwrap(), "");
        assert_eq!(decode_sql_batch(&[]).unwrap(), "");
    }

    #[test]
    fn test_decode_odd_length_rejected() {
        assert_eq!(
            decode_sql_batch(&[b'S', 0, b'E']).unwrap_err(),
            ProtocolError::InvalidString("sql batch")
        );
    }
}
