//! TDS packet header definitions.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// TDS packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Maximum TDS packet size (64KB - 1).
pub const MAX_PACKET_SIZE: usize = 65535;

/// Default TDS packet size.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// TDS packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SQL batch request.
    SqlBatch = 0x01,
    /// Pre-TDS7 login packet.
    PreTds7Login = 0x02,
    /// Remote procedure call.
    Rpc = 0x03,
    /// Tabular response.
    TabularResult = 0x04,
    /// Attention signal.
    Attention = 0x06,
    /// Bulk load data.
    BulkLoad = 0x07,
    /// Federated authentication token.
    FedAuthToken = 0x08,
    /// Transaction manager request.
    TransactionManager = 0x0E,
    /// TDS7+ login packet.
    Login = 0x10,
    /// SSPI authentication.
    Sspi = 0x11,
    /// Pre-login packet.
    PreLogin = 0x12,
}

impl PacketType {
    /// Create a packet type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::SqlBatch),
            0x02 => Ok(Self::PreTds7Login),
            0x03 => Ok(Self::Rpc),
            0x04 => Ok(Self::TabularResult),
            0x06 => Ok(Self::Attention),
            0x07 => Ok(Self::BulkLoad),
            0x08 => Ok(Self::FedAuthToken),
            0x0E => Ok(Self::TransactionManager),
            0x10 => Ok(Self::Login),
            0x11 => Ok(Self::Sspi),
            0x12 => Ok(Self::PreLogin),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

bitflags! {
    /// TDS packet status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Normal packet, more packets to follow.
        const NORMAL = 0x00;
        /// End of message (last packet).
        const END_OF_MESSAGE = 0x01;
        /// Ignore this event.
        const IGNORE = 0x02;
        /// Reset connection state before processing the request.
        const RESET_CONNECTION = 0x08;
        /// Reset connection state but keep the transaction.
        const RESET_CONNECTION_SKIP_TRAN = 0x10;
    }
}

/// TDS packet header.
///
/// Every TDS packet begins with an 8-byte header that describes
/// the packet type, status, and length. All multi-byte fields are
/// big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Type of packet.
    pub packet_type: PacketType,
    /// Status flags.
    pub status: PacketStatus,
    /// Total packet length including header.
    pub length: u16,
    /// Channel / server process ID (SPID).
    pub spid: u16,
    /// Packet sequence number (wraps at 255).
    pub packet_id: u8,
    /// Window (unused, should be 0).
    pub window: u8,
}

impl PacketHeader {
    /// Create a new packet header.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            spid: 0,
            packet_id: 0,
            window: 0,
        }
    }

    /// Create a header whose length describes `payload_len` bytes of payload.
    ///
    /// Callers never hand-compute `length`; payloads larger than one packet
    /// must be split by the framing layer before a header is built.
    pub fn for_payload(
        packet_type: PacketType,
        status: PacketStatus,
        payload_len: usize,
    ) -> Result<Self, ProtocolError> {
        let total = PACKET_HEADER_SIZE + payload_len;
        let length = u16::try_from(total).map_err(|_| ProtocolError::IncompletePacket {
            expected: total,
            actual: MAX_PACKET_SIZE,
        })?;
        Ok(Self::new(packet_type, status, length))
    }

    /// Parse a packet header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let packet_type = PacketType::from_u8(src.get_u8())?;
        let status_byte = src.get_u8();
        let status = PacketStatus::from_bits(status_byte)
            .ok_or(ProtocolError::InvalidPacketStatus(status_byte))?;
        let length = src.get_u16();
        if (length as usize) < PACKET_HEADER_SIZE {
            return Err(ProtocolError::InvalidPacketLength(length));
        }
        let spid = src.get_u16();
        let packet_id = src.get_u8();
        let window = src.get_u8();

        Ok(Self {
            packet_type,
            status,
            length,
            spid,
            packet_id,
            window,
        })
    }

    /// Encode the packet header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.packet_id);
        dst.put_u8(self.window);
    }

    /// Encode the packet header to a new `Bytes` buffer.
    #[must_use]
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Get the payload length (total length minus header).
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length.saturating_sub(PACKET_HEADER_SIZE as u16) as usize
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }

    /// Set the packet ID (sequence number).
    #[must_use]
    pub const fn with_packet_id(mut self, id: u8) -> Self {
        self.packet_id = id;
        self
    }

    /// Set the SPID.
    #[must_use]
    pub const fn with_spid(mut self, spid: u16) -> Self {
        self.spid = spid;
        self
    }
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self {
            packet_type: PacketType::TabularResult,
            status: PacketStatus::END_OF_MESSAGE,
            length: PACKET_HEADER_SIZE as u16,
            spid: 0,
            packet_id: 1,
            window: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TYPES: [PacketType; 11] = [
        PacketType::SqlBatch,
        PacketType::PreTds7Login,
        PacketType::Rpc,
        PacketType::TabularResult,
        PacketType::Attention,
        PacketType::BulkLoad,
        PacketType::FedAuthToken,
        PacketType::TransactionManager,
        PacketType::Login,
        PacketType::Sspi,
        PacketType::PreLogin,
    ];

    #[test]
    fn test_header_roundtrip() {
        let header = PacketHeader {
            packet_type: PacketType::SqlBatch,
            status: PacketStatus::END_OF_MESSAGE,
            length: 100,
            spid: 54,
            packet_id: 1,
            window: 0,
        };

        let bytes = header.encode_to_bytes();
        assert_eq!(bytes.len(), PACKET_HEADER_SIZE);

        let mut cursor = bytes.as_ref();
        let decoded = PacketHeader::decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_header_wire_layout() {
        let header = PacketHeader::new(PacketType::PreLogin, PacketStatus::END_OF_MESSAGE, 0x0102)
            .with_spid(0x0304)
            .with_packet_id(5);
        let bytes = header.encode_to_bytes();
        assert_eq!(&bytes[..], &[0x12, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x00]);
    }

    #[test]
    fn test_payload_length() {
        let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 100);
        assert_eq!(header.payload_length(), 92);
    }

    #[test]
    fn test_for_payload_computes_length() {
        let header =
            PacketHeader::for_payload(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 12)
                .unwrap();
        assert_eq!(header.length, 20);
        assert!(
            PacketHeader::for_payload(PacketType::TabularResult, PacketStatus::NORMAL, 70_000)
                .is_err()
        );
    }

    #[test]
    fn test_short_header_is_incomplete() {
        let mut cursor: &[u8] = &[0x01, 0x01, 0x00];
        let err = PacketHeader::decode(&mut cursor).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::IncompletePacket {
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn test_length_below_header_rejected() {
        let mut cursor: &[u8] = &[0x01, 0x01, 0x00, 0x04, 0, 0, 1, 0];
        assert_eq!(
            PacketHeader::decode(&mut cursor).unwrap_err(),
            ProtocolError::InvalidPacketLength(4)
        );
    }

    #[test]
    fn test_packet_type_from_u8() {
        assert_eq!(PacketType::from_u8(0x01).unwrap(), PacketType::SqlBatch);
        assert_eq!(PacketType::from_u8(0x10).unwrap(), PacketType::Login);
        assert_eq!(PacketType::from_u8(0x12).unwrap(), PacketType::PreLogin);
        assert!(PacketType::from_u8(0xFF).is_err());
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(
            type_index in 0usize..TYPES.len(),
            status in prop::sample::select(vec![0x00u8, 0x01, 0x02, 0x08, 0x09, 0x10, 0x11]),
            length in (PACKET_HEADER_SIZE as u16)..=u16::MAX,
            spid: u16,
            packet_id: u8,
            window: u8,
        ) {
            let header = PacketHeader {
                packet_type: TYPES[type_index],
                status: PacketStatus::from_bits(status).unwrap(),
                length,
                spid,
                packet_id,
                window,
            };
            let bytes = header.encode_to_bytes();
            let decoded = PacketHeader::decode(&mut bytes.as_ref()).unwrap();
            prop_assert_eq!(header, decoded);
        }
    }
}
