//! TDS packet codec implementation.

use bytes::{BufMut, BytesMut};
use tds_protocol::packet::{DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A TDS packet with header and payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Packet payload (excluding header).
    pub payload: BytesMut,
}

impl Packet {
    /// Create a new packet with the given header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Get the total packet size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// TDS packet codec for tokio-util framing.
///
/// Decoding buffers partial input until a whole packet is available.
/// Encoding recomputes the header length from the payload and stamps the
/// packet id; the caller's `length` and `packet_id` are ignored.
#[derive(Debug)]
pub struct TdsCodec {
    /// Largest packet accepted on read.
    max_read_size: usize,
    /// Largest packet produced on write.
    max_write_size: usize,
    /// Next outgoing packet id.
    packet_id: u8,
    /// SPID stamped on outgoing packets.
    spid: u16,
}

impl TdsCodec {
    /// Create a new TDS codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_read_size: MAX_PACKET_SIZE,
            max_write_size: DEFAULT_PACKET_SIZE,
            packet_id: 1,
            spid: 0,
        }
    }

    /// Cap incoming packet size.
    #[must_use]
    pub fn with_max_read_size(mut self, size: usize) -> Self {
        self.max_read_size = size.clamp(PACKET_HEADER_SIZE, MAX_PACKET_SIZE);
        self
    }

    /// Cap outgoing packet size (the negotiated packet size).
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_write_size = size.clamp(PACKET_HEADER_SIZE + 1, MAX_PACKET_SIZE);
        self
    }

    /// Set the SPID written into outgoing headers.
    #[must_use]
    pub fn with_spid(mut self, spid: u16) -> Self {
        self.spid = spid;
        self
    }

    /// Largest packet produced on write.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_write_size
    }

    /// SPID stamped on outgoing packets.
    #[must_use]
    pub fn spid(&self) -> u16 {
        self.spid
    }

    /// Largest payload that fits one outgoing packet.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.max_write_size - PACKET_HEADER_SIZE
    }

    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        id
    }

    /// Restart packet numbering; called at the start of every message.
    pub fn reset_packet_id(&mut self) {
        self.packet_id = 1;
    }
}

impl Default for TdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TdsCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < PACKET_HEADER_SIZE {
            return Err(CodecError::InvalidHeader);
        }
        if length > self.max_read_size {
            return Err(CodecError::PacketTooLarge {
                size: length,
                max: self.max_read_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut packet_bytes = src.split_to(length);
        let header = PacketHeader::decode(&mut packet_bytes.as_ref())?;
        let payload = packet_bytes.split_off(PACKET_HEADER_SIZE);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = length,
            packet_id = header.packet_id,
            is_eom = header.is_end_of_message(),
            "decoded TDS packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None if buf.is_empty() => Ok(None),
            None => {
                let expected = if buf.len() >= 4 {
                    u16::from_be_bytes([buf[2], buf[3]]) as usize
                } else {
                    PACKET_HEADER_SIZE
                };
                Err(CodecError::IncompletePacket {
                    expected,
                    actual: buf.len(),
                })
            }
        }
    }
}

impl Encoder<Packet> for TdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();
        if total_length > self.max_write_size {
            return Err(CodecError::PacketTooLarge {
                size: total_length,
                max: self.max_write_size,
            });
        }

        dst.reserve(total_length);

        let header = item
            .header
            .with_packet_id(self.next_packet_id())
            .with_spid(self.spid);
        let header = PacketHeader {
            length: total_length as u16,
            ..header
        };
        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total_length,
            packet_id = header.packet_id,
            "encoded TDS packet"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_protocol::packet::{PacketStatus, PacketType};

    fn raw_packet(length: u16, payload: &[u8]) -> BytesMut {
        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(length);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        data.put_slice(payload);
        data
    }

    #[test]
    fn test_decode_packet() {
        let mut codec = TdsCodec::new();
        let mut data = raw_packet(12, b"test");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.packet_type, PacketType::SqlBatch);
        assert!(packet.is_end_of_message());
        assert_eq!(&packet.payload[..], b"test");
        assert!(data.is_empty());
    }

    #[test]
    fn test_partial_packet_is_buffered() {
        let mut codec = TdsCodec::new();
        let full = raw_packet(12, b"test");

        let mut data = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut data).unwrap().is_none());
        data.extend_from_slice(&full[10..]);
        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(&packet.payload[..], b"test");
    }

    #[test]
    fn test_eof_mid_packet_is_incomplete() {
        let mut codec = TdsCodec::new();
        let mut data = raw_packet(12, b"te");
        assert!(matches!(
            codec.decode_eof(&mut data),
            Err(CodecError::IncompletePacket {
                expected: 12,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_eof_on_boundary_is_clean() {
        let mut codec = TdsCodec::new();
        let mut data = BytesMut::new();
        assert!(codec.decode_eof(&mut data).unwrap().is_none());
    }

    #[test]
    fn test_invalid_and_oversized_lengths() {
        let mut codec = TdsCodec::new();
        assert!(matches!(
            codec.decode(&mut raw_packet(4, b"")),
            Err(CodecError::InvalidHeader)
        ));

        let mut codec = TdsCodec::new().with_max_read_size(512);
        assert!(matches!(
            codec.decode(&mut raw_packet(1000, b"")),
            Err(CodecError::PacketTooLarge { size: 1000, max: 512 })
        ));
    }

    #[test]
    fn test_encode_recomputes_length_and_id() {
        let mut codec = TdsCodec::new().with_spid(55);
        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 0);

        let mut dst = BytesMut::new();
        codec
            .encode(Packet::new(header, BytesMut::from(&b"test"[..])), &mut dst)
            .unwrap();
        codec
            .encode(Packet::new(header, BytesMut::from(&b"x"[..])), &mut dst)
            .unwrap();

        assert_eq!(&dst[..8], &[0x04, 0x01, 0x00, 12, 0x00, 55, 1, 0]);
        assert_eq!(&dst[12..20], &[0x04, 0x01, 0x00, 9, 0x00, 55, 2, 0]);
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let mut codec = TdsCodec::new().with_max_packet_size(16);
        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 0);
        let result = codec.encode(
            Packet::new(header, BytesMut::from(&[0u8; 20][..])),
            &mut BytesMut::new(),
        );
        assert!(matches!(result, Err(CodecError::PacketTooLarge { size: 28, max: 16 })));
    }
}
