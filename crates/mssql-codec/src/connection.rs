//! Server side of a TDS connection.
//!
//! The transport is split into read and write halves. Requests are read as
//! whole messages, responses are cut into packets no larger than the
//! negotiated packet size.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tds_protocol::packet::{DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PacketType};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::error::CodecError;
use crate::framed::{PacketReader, PacketWriter};
use crate::message::{Message, MessageAssembler, split_message};
use crate::packet_codec::{Packet, TdsCodec};

/// A framed TDS connection as seen by the server.
///
/// # Example
///
/// ```rust,ignore
/// use mssql_codec::Connection;
///
/// let mut conn = Connection::new(tcp_stream);
/// while let Some(message) = conn.read_message().await? {
///     let reply = handle(message);
///     conn.send_message(PacketType::TabularResult, reply).await?;
/// }
/// ```
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: PacketReader<ReadHalf<T>>,
    writer: PacketWriter<WriteHalf<T>>,
    assembler: MessageAssembler,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new connection using the default packet size for responses.
    pub fn new(transport: T) -> Self {
        Self::with_packet_size(transport, DEFAULT_PACKET_SIZE)
    }

    /// Create a new connection that writes packets of at most `packet_size`
    /// bytes. Incoming packets may use the full 16-bit length range.
    pub fn with_packet_size(transport: T, packet_size: usize) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let read_codec = TdsCodec::new().with_max_read_size(MAX_PACKET_SIZE);
        let write_codec = TdsCodec::new().with_max_packet_size(packet_size);

        Self {
            reader: PacketReader::with_codec(read_half, read_codec),
            writer: PacketWriter::with_codec(write_half, write_codec),
            assembler: MessageAssembler::new(),
        }
    }

    /// Cap the size of a reassembled request at `max` bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.assembler = MessageAssembler::with_max_message_size(max);
        self
    }

    /// Change the outgoing packet size, e.g. after LOGIN7 negotiation.
    pub fn set_packet_size(&mut self, packet_size: usize) {
        let spid = self.writer.codec().spid();
        *self.writer.codec_mut() = TdsCodec::new()
            .with_max_packet_size(packet_size)
            .with_spid(spid);
    }

    /// Set the SPID stamped on outgoing packets.
    pub fn set_spid(&mut self, spid: u16) {
        let size = self.writer.codec().max_packet_size();
        *self.writer.codec_mut() = TdsCodec::new().with_max_packet_size(size).with_spid(spid);
    }

    /// Current outgoing packet size.
    pub fn packet_size(&self) -> usize {
        self.writer.codec().max_packet_size()
    }

    /// Read the next complete request.
    ///
    /// Returns `Ok(None)` when the client closes the connection between
    /// messages, and [`CodecError::ConnectionClosed`] when it closes in the
    /// middle of one. A request larger than the message size cap fails with
    /// [`CodecError::MessageTooLarge`].
    pub async fn read_message(&mut self) -> Result<Option<Message>, CodecError> {
        loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet)? {
                        tracing::debug!(
                            packet_type = ?message.packet_type,
                            length = message.len(),
                            "received message"
                        );
                        return Ok(Some(message));
                    }
                }
                Some(Err(e)) => {
                    self.assembler.clear();
                    return Err(e);
                }
                None => {
                    if self.assembler.has_partial() {
                        self.assembler.clear();
                        return Err(CodecError::ConnectionClosed);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Send a message, splitting it across as many packets as needed.
    ///
    /// Packet ids restart at 1 for every message and only the last packet
    /// carries `END_OF_MESSAGE`.
    pub async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<(), CodecError> {
        let codec = self.writer.codec_mut();
        codec.reset_packet_id();
        let max_payload = codec.max_payload_size();

        let packets = split_message(packet_type, &payload, max_payload);
        tracing::debug!(
            packet_type = ?packet_type,
            length = payload.len(),
            packets = packets.len(),
            "sending message"
        );

        for packet in packets {
            self.writer.feed(packet).await?;
        }
        self.writer.flush().await
    }

    /// Send a single pre-built packet.
    pub async fn send_packet(&mut self, packet: Packet) -> Result<(), CodecError> {
        self.writer.codec_mut().reset_packet_id();
        self.writer.send(packet).await
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("packet_size", &self.writer.codec().max_packet_size())
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use tds_protocol::packet::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus};
    use tokio::io::AsyncReadExt;

    fn wire_packet(packet_type: PacketType, status: PacketStatus, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let header = PacketHeader::new(
            packet_type,
            status,
            (PACKET_HEADER_SIZE + payload.len()) as u16,
        );
        header.encode(&mut buf);
        buf.put_slice(payload);
        buf.to_vec()
    }

    #[tokio::test]
    async fn test_reads_multi_packet_message() {
        let mut data = wire_packet(PacketType::SqlBatch, PacketStatus::NORMAL, b"SELECT ");
        data.extend(wire_packet(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, b"1"));

        let mock = tokio_test::io::Builder::new().read(&data).build();
        let mut conn = Connection::new(mock);

        let message = conn.read_message().await.unwrap().unwrap();
        assert_eq!(message.packet_type, PacketType::SqlBatch);
        assert_eq!(&message.payload[..], b"SELECT 1");
        assert!(conn.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_message_is_error() {
        let data = wire_packet(PacketType::SqlBatch, PacketStatus::NORMAL, b"SELECT ");
        let mock = tokio_test::io::Builder::new().read(&data).build();
        let mut conn = Connection::new(mock);

        assert!(matches!(
            conn.read_message().await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_request_over_message_cap_is_error() {
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend(wire_packet(PacketType::SqlBatch, PacketStatus::NORMAL, &[b'x'; 100]));
        }
        let mock = tokio_test::io::Builder::new().read(&data).build();
        let mut conn = Connection::new(mock).with_max_message_size(250);

        match conn.read_message().await {
            Err(e @ CodecError::MessageTooLarge { .. }) => assert!(!e.is_disconnect()),
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eof_inside_packet_is_error() {
        let data = wire_packet(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, b"SELECT 1");
        let mock = tokio_test::io::Builder::new().read(&data[..10]).build();
        let mut conn = Connection::new(mock);

        assert!(matches!(
            conn.read_message().await,
            Err(CodecError::IncompletePacket { .. })
        ));
    }

    #[tokio::test]
    async fn test_small_response_is_one_packet() {
        let mut expected =
            wire_packet(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, b"ok");
        expected[6] = 1;

        let mock = tokio_test::io::Builder::new().write(&expected).build();
        let mut conn = Connection::new(mock);
        conn.send_message(PacketType::TabularResult, Bytes::from_static(b"ok"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_large_response_is_split_with_sequential_ids() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut conn = Connection::with_packet_size(server, 512);
        let payload = Bytes::from(vec![0xAB; 1200]);

        conn.send_message(PacketType::TabularResult, payload).await.unwrap();
        drop(conn);

        let mut client = client;
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();

        let mut offset = 0;
        let mut ids = Vec::new();
        let mut body = 0;
        let mut last_status = PacketStatus::NORMAL;
        while offset < raw.len() {
            let header = PacketHeader::decode(&mut &raw[offset..]).unwrap();
            assert!(header.length as usize <= 512);
            ids.push(header.packet_id);
            body += header.payload_length();
            last_status = header.status;
            offset += header.length as usize;
        }
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(body, 1200);
        assert!(last_status.contains(PacketStatus::END_OF_MESSAGE));
    }

    #[tokio::test]
    async fn test_packet_ids_restart_per_message() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mut conn = Connection::new(server);

        conn.send_message(PacketType::TabularResult, Bytes::from_static(b"a"))
            .await
            .unwrap();
        conn.send_message(PacketType::TabularResult, Bytes::from_static(b"b"))
            .await
            .unwrap();

        let mut raw = [0u8; 18];
        client.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw[6], 1);
        assert_eq!(raw[15], 1);
    }
}
