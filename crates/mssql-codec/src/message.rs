//! TDS message reassembly and splitting.
//!
//! A message may span several packets; the last one carries
//! `END_OF_MESSAGE`. Incoming packets are glued back together by
//! [`MessageAssembler`], outgoing payloads are cut up by [`split_message`].

use bytes::{Bytes, BytesMut};
use tds_protocol::packet::{PacketHeader, PacketStatus, PacketType};

use crate::error::CodecError;
use crate::packet_codec::Packet;

/// Default cap on a reassembled request (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// A complete TDS message reassembled from one or more packets.
#[derive(Debug, Clone)]
pub struct Message {
    /// The packet type of this message.
    pub packet_type: PacketType,
    /// Status bits of the first packet.
    pub status: PacketStatus,
    /// The complete message payload (all packets combined).
    pub payload: Bytes,
}

impl Message {
    /// Get the message payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether the client asked for a session reset with this request.
    #[must_use]
    pub fn resets_connection(&self) -> bool {
        self.status.intersects(
            PacketStatus::RESET_CONNECTION | PacketStatus::RESET_CONNECTION_SKIP_TRAN,
        )
    }
}

/// Reassembles multiple TDS packets into complete messages.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    /// Type and status of the first packet of the message in progress.
    first: Option<(PacketType, PacketStatus)>,
    packet_count: usize,
    max_message_size: usize,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    /// Create a new message assembler with the default size cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create an assembler that rejects messages larger than `max` bytes.
    #[must_use]
    pub fn with_max_message_size(max: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            first: None,
            packet_count: 0,
            max_message_size: max,
        }
    }

    /// The largest payload a reassembled message may have.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Push a packet into the assembler.
    ///
    /// Returns `Some(Message)` if this packet completes a message,
    /// `None` if more packets are needed. Continuation packets inherit the
    /// type of the first packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MessageTooLarge`] once the buffered payload would
    /// exceed the size cap. The partial message is discarded.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Message>, CodecError> {
        let size = self.buffer.len() + packet.payload.len();
        if size > self.max_message_size {
            let max = self.max_message_size;
            self.clear();
            return Err(CodecError::MessageTooLarge { size, max });
        }

        let (packet_type, status) = *self
            .first
            .get_or_insert((packet.header.packet_type, packet.header.status));

        self.buffer.extend_from_slice(&packet.payload);
        self.packet_count += 1;

        tracing::trace!(
            packet_type = ?packet_type,
            packet_count = self.packet_count,
            buffer_len = self.buffer.len(),
            is_eom = packet.is_end_of_message(),
            "assembling message"
        );

        if !packet.is_end_of_message() {
            return Ok(None);
        }

        self.first = None;
        self.packet_count = 0;
        Ok(Some(Message {
            packet_type,
            status,
            payload: self.buffer.split().freeze(),
        }))
    }

    /// Check if the assembler has partial data buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.first.is_some()
    }

    /// Get the number of packets accumulated so far.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Clear any partial message data.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.first = None;
        self.packet_count = 0;
    }
}

/// Cut a payload into packets of at most `max_payload` bytes each.
///
/// Only the last packet carries `END_OF_MESSAGE`. An empty payload still
/// produces one (empty) packet. Lengths and packet ids are filled in by the
/// encoder.
#[must_use]
pub fn split_message(packet_type: PacketType, payload: &[u8], max_payload: usize) -> Vec<Packet> {
    let max_payload = max_payload.max(1);
    if payload.is_empty() {
        let header = PacketHeader::new(packet_type, PacketStatus::END_OF_MESSAGE, 0);
        return vec![Packet::new(header, BytesMut::new())];
    }

    let chunk_count = payload.len().div_ceil(max_payload);
    payload
        .chunks(max_payload)
        .enumerate()
        .map(|(i, chunk)| {
            let status = if i + 1 == chunk_count {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            Packet::new(
                PacketHeader::new(packet_type, status, 0),
                BytesMut::from(chunk),
            )
        })
        .collect()
}
