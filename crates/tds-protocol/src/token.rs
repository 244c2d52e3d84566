//! TDS token stream encoding and parsing.
//!
//! Tokens are the units of a tabular response: column metadata, rows,
//! completion records, messages and login/environment notifications. The
//! server writes them with [`ResultSetEncoder`]; test clients read them
//! back with [`TokenParser`].
//!
//! ## Result set layout
//!
//! Every column is described as VARCHAR. Integers inside tokens are
//! little-endian unless noted.
//!
//! ```text
//! COLMETADATA  0x81 count:1 { usertype:4 flags:2 0xA7 maxlen:2=0xFFFF
//!                             collation:5 tablename:1=0 name:B_VARCHAR }*
//! ROW          0xD1 { len:2 (0xFFFF = NULL) bytes:len }*
//! DONE         0xFD status:2 curcmd:2 rowcount:4 0x00
//! ```

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_b_varchar, read_us_varchar, utf16_byte_len, write_b_varchar, write_us_varchar};
use crate::error::ProtocolError;
use crate::types::{COLUMN_NULLABLE, COLUMN_UPDATEABLE, TypeId};
use crate::version::{SqlServerVersion, TdsVersion};

/// Collation advertised for every VARCHAR column (Latin1_General, LCID 0x0409).
pub const DEFAULT_COLLATION: [u8; 5] = [0x00, 0xD0, 0x04, 0x09, 0x34];

/// Length marker for a NULL column value.
pub const NULL_VALUE_LENGTH: u16 = 0xFFFF;

/// `curcmd` value reported for SELECT statements.
pub const CMD_SELECT: u16 = 0x00C1;

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgment (LOGINACK).
    LoginAck = 0xAD,
    /// Row data (ROW).
    Row = 0xD1,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Done (DONE).
    Done = 0xFD,
}

impl TokenType {
    /// Create a token type from a raw byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0xAD => Some(Self::LoginAck),
            0xD1 => Some(Self::Row),
            0xE3 => Some(Self::EnvChange),
            0xFD => Some(Self::Done),
            _ => None,
        }
    }
}

/// Parsed TDS token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Column metadata describing result set structure.
    ColMetaData(Vec<ColumnMeta>),
    /// Row data, one optional text value per column.
    Row(Vec<Option<String>>),
    /// Completion of a statement.
    Done(Done),
    /// Error message.
    Error(ServerMessage),
    /// Informational message.
    Info(ServerMessage),
    /// Login acknowledgment.
    LoginAck(LoginAck),
    /// Environment change notification.
    EnvChange(EnvChange),
}

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Whether the column may contain NULL.
    pub nullable: bool,
}

impl ColumnMeta {
    /// A nullable VARCHAR column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
        }
    }

    /// Name to use for a column the engine left unnamed (1-based).
    #[must_use]
    pub fn positional_name(index: usize) -> String {
        format!("Column{}", index + 1)
    }

    fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(0);
        let mut flags = COLUMN_UPDATEABLE;
        if self.nullable {
            flags |= COLUMN_NULLABLE;
        }
        dst.put_u16_le(flags);
        dst.put_u8(TypeId::BigVarChar as u8);
        dst.put_u16_le(0xFFFF);
        dst.put_slice(&DEFAULT_COLLATION);
        dst.put_u8(0);
        write_b_varchar(dst, &self.name);
    }

    fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        // usertype, flags, type tag, max length, collation, table name length
        if src.remaining() < 15 {
            return Err(ProtocolError::UnexpectedEof);
        }
        src.advance(4);
        let flags = src.get_u16_le();
        let tag = src.get_u8();
        if tag != TypeId::BigVarChar as u8 {
            return Err(ProtocolError::UnsupportedParameterType(tag));
        }
        src.advance(2 + DEFAULT_COLLATION.len() + 1);
        let name = read_b_varchar(src)?;
        Ok(Self {
            name,
            nullable: flags & COLUMN_NULLABLE != 0,
        })
    }
}

bitflags! {
    /// DONE token status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DoneStatus: u16 {
        /// Final DONE in the response.
        const FINAL = 0x0000;
        /// More results follow.
        const MORE = 0x0001;
        /// The statement failed.
        const ERROR = 0x0002;
        /// A transaction is in progress.
        const IN_XACT = 0x0004;
        /// The row count is valid.
        const COUNT = 0x0010;
        /// Acknowledges an attention signal.
        const ATTN = 0x0020;
        /// Server error terminated the statement.
        const SRVERROR = 0x0100;
    }
}

/// Done token indicating statement completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count.
    pub row_count: u32,
}

impl Done {
    /// Size of the DONE token in bytes (excluding token type byte).
    pub const SIZE: usize = 9; // 2 (status) + 2 (curcmd) + 4 (rowcount) + 1

    /// A DONE that reports `row_count` rows.
    #[must_use]
    pub fn with_count(row_count: usize, more: bool) -> Self {
        let mut status = DoneStatus::COUNT;
        if more {
            status |= DoneStatus::MORE;
        }
        Self {
            status,
            cur_cmd: 0,
            row_count: u32::try_from(row_count).unwrap_or(u32::MAX),
        }
    }

    /// A final DONE flagging a failed statement.
    #[must_use]
    pub const fn error() -> Self {
        Self {
            status: DoneStatus::ERROR,
            cur_cmd: 0,
            row_count: 0,
        }
    }

    /// A DONE acknowledging an attention signal.
    #[must_use]
    pub const fn attention() -> Self {
        Self {
            status: DoneStatus::ATTN,
            cur_cmd: 0,
            row_count: 0,
        }
    }

    /// Set the current command.
    #[must_use]
    pub const fn with_cur_cmd(mut self, cur_cmd: u16) -> Self {
        self.cur_cmd = cur_cmd;
        self
    }

    /// Decode a DONE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        let status = DoneStatus::from_bits_retain(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u32_le();
        src.advance(1);

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the DONE token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::Done as u8);
        dst.put_u16_le(self.status.bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u32_le(self.row_count);
        dst.put_u8(0);
    }

    /// Check if more results follow this DONE token.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status.contains(DoneStatus::MORE)
    }

    /// Check if the statement failed.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.status.contains(DoneStatus::ERROR)
    }
}

/// ERROR or INFO message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    /// Message number.
    pub number: i32,
    /// State.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

impl ServerMessage {
    /// Severity used for failed statements.
    pub const ERROR_CLASS: u8 = 16;

    /// Longest message text sent, in UTF-16 code units.
    pub const MAX_MESSAGE_LEN: usize = 4000;

    /// An error message with severity 16.
    pub fn error(number: i32, message: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            number,
            state: 1,
            class: Self::ERROR_CLASS,
            message: message.into(),
            server: server.into(),
            procedure: String::new(),
            line: 1,
        }
    }

    /// An informational message (PRINT output).
    pub fn info(message: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            number: 0,
            state: 1,
            class: 0,
            message: message.into(),
            server: server.into(),
            procedure: String::new(),
            line: 1,
        }
    }

    /// Set the procedure the message originated from.
    #[must_use]
    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = procedure.into();
        self
    }

    /// Encode as an ERROR or INFO token.
    pub fn encode(&self, token: TokenType, dst: &mut impl BufMut) {
        let message = truncate_utf16(&self.message, Self::MAX_MESSAGE_LEN);
        let server = truncate_utf16(&self.server, u8::MAX as usize);
        let procedure = truncate_utf16(&self.procedure, u8::MAX as usize);

        let len = 4 + 1 + 1
            + 2 + utf16_byte_len(&message)
            + 1 + utf16_byte_len(&server)
            + 1 + utf16_byte_len(&procedure)
            + 4;

        dst.put_u8(token as u8);
        dst.put_u16_le(len as u16);
        dst.put_i32_le(self.number);
        dst.put_u8(self.state);
        dst.put_u8(self.class);
        write_us_varchar(dst, &message);
        write_b_varchar(dst, &server);
        write_b_varchar(dst, &procedure);
        dst.put_i32_le(self.line);
    }

    /// Decode an ERROR or INFO token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 8 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let _length = src.get_u16_le();
        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();
        let message = read_us_varchar(src)?;
        let server = read_b_varchar(src)?;
        let procedure = read_b_varchar(src)?;
        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let line = src.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }
}

/// Login acknowledgment token.
///
/// Fixed layout: `0xAD len:1 interface:1 tds_version:4 prog_name_len:2=0
/// version:4`, with the version fields big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginAck {
    /// Interface type (1 = SQL).
    pub interface: u8,
    /// TDS version.
    pub tds_version: TdsVersion,
    /// Server product version.
    pub version: SqlServerVersion,
}

impl LoginAck {
    /// Body length after the length byte.
    pub const BODY_LEN: u8 = 11;

    /// Create a LOGINACK for the SQL interface.
    #[must_use]
    pub const fn new(tds_version: TdsVersion, version: SqlServerVersion) -> Self {
        Self {
            interface: 1,
            tds_version,
            version,
        }
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::LoginAck as u8);
        dst.put_u8(Self::BODY_LEN);
        dst.put_u8(self.interface);
        dst.put_u32(self.tds_version.raw());
        dst.put_u16(0);
        dst.put_u32(self.version.raw());
    }

    /// Decode a LOGINACK body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 1 + Self::BODY_LEN as usize {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = src.get_u8() as usize;
        if len < Self::BODY_LEN as usize || src.remaining() < len {
            return Err(ProtocolError::UnexpectedEof);
        }
        let interface = src.get_u8();
        let tds_version = TdsVersion::new(src.get_u32());
        let prog_name_len = src.get_u16() as usize;
        if len != Self::BODY_LEN as usize + prog_name_len || src.remaining() < prog_name_len + 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        src.advance(prog_name_len);
        let version = SqlServerVersion::from_raw(src.get_u32(), 0);

        Ok(Self {
            interface,
            tds_version,
            version,
        })
    }
}

/// Environment change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvChangeType {
    /// Current database.
    Database = 1,
    /// Session language.
    Language = 2,
    /// Character set.
    CharacterSet = 3,
    /// Negotiated packet size.
    PacketSize = 4,
}

impl EnvChangeType {
    /// Create from raw byte value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Database),
            2 => Some(Self::Language),
            3 => Some(Self::CharacterSet),
            4 => Some(Self::PacketSize),
            _ => None,
        }
    }
}

/// Environment change token with string values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvChange {
    /// Type of environment change.
    pub env_type: EnvChangeType,
    /// New value.
    pub new_value: String,
    /// Old value.
    pub old_value: String,
}

impl EnvChange {
    /// Create an environment change.
    pub fn new(
        env_type: EnvChangeType,
        new_value: impl Into<String>,
        old_value: impl Into<String>,
    ) -> Self {
        Self {
            env_type,
            new_value: truncate_utf16(&new_value.into(), u8::MAX as usize),
            old_value: truncate_utf16(&old_value.into(), u8::MAX as usize),
        }
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let len = 1 + 1 + utf16_byte_len(&self.new_value) + 1 + utf16_byte_len(&self.old_value);
        dst.put_u8(TokenType::EnvChange as u8);
        dst.put_u16_le(len as u16);
        dst.put_u8(self.env_type as u8);
        write_b_varchar(dst, &self.new_value);
        write_b_varchar(dst, &self.old_value);
    }

    /// Decode an ENVCHANGE body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 3 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = src.get_u16_le() as usize;
        if src.remaining() < len {
            return Err(ProtocolError::UnexpectedEof);
        }
        let raw_type = src.get_u8();
        let env_type =
            EnvChangeType::from_u8(raw_type).ok_or(ProtocolError::InvalidTokenType(raw_type))?;
        let new_value = read_b_varchar(src)?;
        let old_value = read_b_varchar(src)?;
        Ok(Self {
            env_type,
            new_value,
            old_value,
        })
    }
}

/// Builder for a tabular response payload.
///
/// ```
/// use tds_protocol::{ColumnMeta, Done, ResultSetEncoder};
///
/// let mut enc = ResultSetEncoder::new();
/// enc.column_metadata(&[ColumnMeta::new("id")]).unwrap();
/// enc.row(&[Some("1")]).unwrap();
/// enc.done(Done::with_count(1, false));
/// assert_eq!(enc.finish()[0], 0x81);
/// ```
#[derive(Debug, Default)]
pub struct ResultSetEncoder {
    buf: BytesMut,
    columns: usize,
}

impl ResultSetEncoder {
    /// Create an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a COLMETADATA token.
    pub fn column_metadata(&mut self, columns: &[ColumnMeta]) -> Result<(), ProtocolError> {
        let count =
            u8::try_from(columns.len()).map_err(|_| ProtocolError::TooManyColumns(columns.len()))?;
        self.buf.put_u8(TokenType::ColMetaData as u8);
        self.buf.put_u8(count);
        for column in columns {
            column.encode(&mut self.buf);
        }
        self.columns = columns.len();
        Ok(())
    }

    /// Write a ROW token. The value count must match the last metadata.
    ///
    /// A value longer than 0xFFFE bytes fails with
    /// [`ProtocolError::ValueTooLong`] and nothing is written.
    pub fn row<S: AsRef<str>>(&mut self, values: &[Option<S>]) -> Result<(), ProtocolError> {
        if values.len() != self.columns {
            return Err(ProtocolError::ColumnCountMismatch {
                expected: self.columns,
                actual: values.len(),
            });
        }
        let max = NULL_VALUE_LENGTH as usize - 1;
        if let Some(length) = values
            .iter()
            .flatten()
            .map(|text| text.as_ref().len())
            .find(|&len| len > max)
        {
            return Err(ProtocolError::ValueTooLong {
                what: "row value",
                length,
                max,
            });
        }

        self.buf.put_u8(TokenType::Row as u8);
        for value in values {
            match value {
                Some(text) => {
                    let bytes = text.as_ref().as_bytes();
                    self.buf.put_u16_le(bytes.len() as u16);
                    self.buf.put_slice(bytes);
                }
                None => self.buf.put_u16_le(NULL_VALUE_LENGTH),
            }
        }
        Ok(())
    }

    /// Write a DONE token.
    pub fn done(&mut self, done: Done) {
        done.encode(&mut self.buf);
    }

    /// Write an ERROR token.
    pub fn error(&mut self, message: &ServerMessage) {
        message.encode(TokenType::Error, &mut self.buf);
    }

    /// Write an INFO token.
    pub fn info(&mut self, message: &ServerMessage) {
        message.encode(TokenType::Info, &mut self.buf);
    }

    /// Write a LOGINACK token.
    pub fn login_ack(&mut self, ack: &LoginAck) {
        ack.encode(&mut self.buf);
    }

    /// Write an ENVCHANGE token.
    pub fn env_change(&mut self, change: &EnvChange) {
        change.encode(&mut self.buf);
    }

    /// Write a whole result set: metadata, rows, then a DONE carrying the
    /// row count. `more` marks that further results follow.
    pub fn result_set<S: AsRef<str>>(
        &mut self,
        columns: &[ColumnMeta],
        rows: &[Vec<Option<S>>],
        more: bool,
    ) -> Result<(), ProtocolError> {
        self.column_metadata(columns)?;
        for row in rows {
            self.row(row)?;
        }
        self.done(Done::with_count(rows.len(), more).with_cur_cmd(CMD_SELECT));
        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the encoded payload.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Encode rows under columns named `Column1..N`, sized from the first row,
    /// followed by a final DONE. No rows yields a lone DONE.
    pub fn encode_rows<S: AsRef<str>>(rows: &[Vec<Option<S>>]) -> Result<Bytes, ProtocolError> {
        let mut enc = Self::new();
        match rows.first() {
            Some(first) => {
                let columns: Vec<ColumnMeta> = (0..first.len())
                    .map(|i| ColumnMeta::new(ColumnMeta::positional_name(i)))
                    .collect();
                enc.result_set(&columns, rows, false)?;
            }
            None => enc.done(Done::with_count(0, false)),
        }
        Ok(enc.finish())
    }

    /// Encode rows under the given column names; empty names fall back to
    /// `ColumnN`.
    pub fn encode_result<S: AsRef<str>>(
        names: &[String],
        rows: &[Vec<Option<S>>],
        more: bool,
    ) -> Result<Bytes, ProtocolError> {
        let columns: Vec<ColumnMeta> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if name.is_empty() {
                    ColumnMeta::new(ColumnMeta::positional_name(i))
                } else {
                    ColumnMeta::new(name.as_str())
                }
            })
            .collect();
        let mut enc = Self::new();
        enc.result_set(&columns, rows, more)?;
        Ok(enc.finish())
    }
}

/// Streaming parser for token payloads produced by [`ResultSetEncoder`].
///
/// ```rust
/// use tds_protocol::{ResultSetEncoder, Token, TokenParser};
///
/// let payload = ResultSetEncoder::encode_rows(&[vec![Some("1")]]).unwrap();
/// let mut parser = TokenParser::new(payload);
/// while let Some(token) = parser.next_token().unwrap() {
///     if let Token::Done(done) = token {
///         assert_eq!(done.row_count, 1);
///     }
/// }
/// ```
#[derive(Debug)]
pub struct TokenParser {
    data: Bytes,
    columns: Option<usize>,
}

impl TokenParser {
    /// Create a new token parser from bytes.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            columns: None,
        }
    }

    /// Get remaining bytes in the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    /// Parse the next token. Returns `None` once the payload is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        if !self.data.has_remaining() {
            return Ok(None);
        }

        let raw = self.data.get_u8();
        let token_type = TokenType::from_u8(raw).ok_or(ProtocolError::InvalidTokenType(raw))?;
        let src = &mut self.data;

        let token = match token_type {
            TokenType::ColMetaData => {
                if !src.has_remaining() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let count = src.get_u8() as usize;
                let columns = (0..count)
                    .map(|_| ColumnMeta::decode(src))
                    .collect::<Result<Vec<_>, _>>()?;
                self.columns = Some(count);
                Token::ColMetaData(columns)
            }
            TokenType::Row => {
                let count = self.columns.ok_or(ProtocolError::MissingMetadata)?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    if src.remaining() < 2 {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    let len = src.get_u16_le();
                    if len == NULL_VALUE_LENGTH {
                        values.push(None);
                        continue;
                    }
                    if src.remaining() < len as usize {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    let bytes = src.split_to(len as usize);
                    let text = String::from_utf8(bytes.to_vec())
                        .map_err(|_| ProtocolError::InvalidString("row value"))?;
                    values.push(Some(text));
                }
                Token::Row(values)
            }
            TokenType::Done => Token::Done(Done::decode(src)?),
            TokenType::Error => Token::Error(ServerMessage::decode(src)?),
            TokenType::Info => Token::Info(ServerMessage::decode(src)?),
            TokenType::LoginAck => Token::LoginAck(LoginAck::decode(src)?),
            TokenType::EnvChange => Token::EnvChange(EnvChange::decode(src)?),
        };

        Ok(Some(token))
    }

    /// Parse every remaining token.
    pub fn collect_tokens(mut self) -> Result<Vec<Token>, ProtocolError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn truncate_utf16(s: &str, max_units: usize) -> String {
    let mut units = 0;
    s.chars()
        .take_while(|c| {
            units += c.len_utf16();
            units <= max_units
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rows_wire_layout() {
        let payload = ResultSetEncoder::encode_rows(&[vec![Some("ab")]]).unwrap();
        assert_eq!(payload[0], 0x81);
        assert_eq!(payload[1], 1);
        // usertype
        assert_eq!(&payload[2..6], &[0, 0, 0, 0]);
        // type tag and max length
        assert_eq!(payload[8], 0xA7);
        assert_eq!(&payload[9..11], &[0xFF, 0xFF]);
        assert_eq!(&payload[11..16], &DEFAULT_COLLATION);
        assert_eq!(payload[16], 0);
        // "Column1" as B_VARCHAR
        assert_eq!(payload[17], 7);
        let row_start = 18 + 14;
        assert_eq!(&payload[row_start..row_start + 5], &[0xD1, 2, 0, b'a', b'b']);
        let done = &payload[row_start + 5..];
        assert_eq!(done, &[0xFD, 0x10, 0x00, 0xC1, 0x00, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_rows_empty_is_lone_done() {
        let payload = ResultSetEncoder::encode_rows::<&str>(&[]).unwrap();
        assert_eq!(payload.len(), 1 + Done::SIZE);
        assert_eq!(payload[0], TokenType::Done as u8);
    }

    #[test]
    fn test_result_roundtrip_through_parser() {
        let names = vec!["id".to_string(), String::new()];
        let rows = vec![
            vec![Some("1".to_string()), None],
            vec![Some("2".to_string()), Some("O'Brien".to_string())],
        ];
        let payload = ResultSetEncoder::encode_result(&names, &rows, false).unwrap();
        let tokens = TokenParser::new(payload).collect_tokens().unwrap();

        assert_eq!(
            tokens[0],
            Token::ColMetaData(vec![ColumnMeta::new("id"), ColumnMeta::new("Column2")])
        );
        assert_eq!(tokens[1], Token::Row(rows[0].clone()));
        assert_eq!(tokens[2], Token::Row(rows[1].clone()));
        match &tokens[3] {
            Token::Done(done) => {
                assert_eq!(done.row_count, 2);
                assert!(!done.has_more());
                assert!(done.status.contains(DoneStatus::COUNT));
            }
            other => panic!("expected DONE, got {other:?}"),
        }
    }

    #[test]
    fn test_row_column_count_mismatch() {
        let mut enc = ResultSetEncoder::new();
        enc.column_metadata(&[ColumnMeta::new("a")]).unwrap();
        assert_eq!(
            enc.row(&[Some("1"), Some("2")]).unwrap_err(),
            ProtocolError::ColumnCountMismatch {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_row_value_at_length_limit() {
        let longest = "x".repeat(0xFFFE);
        let mut enc = ResultSetEncoder::new();
        enc.column_metadata(&[ColumnMeta::new("v")]).unwrap();
        enc.row(&[Some(longest.as_str())]).unwrap();
        enc.done(Done::with_count(1, false));

        let tokens = TokenParser::new(enc.finish()).collect_tokens().unwrap();
        assert_eq!(tokens[1], Token::Row(vec![Some(longest)]));
    }

    #[test]
    fn test_row_value_over_length_limit_is_rejected() {
        let mut enc = ResultSetEncoder::new();
        enc.column_metadata(&[ColumnMeta::new("a"), ColumnMeta::new("b")])
            .unwrap();
        let before = enc.buf.len();

        // 0x8000 two-byte characters: cutting at 0xFFFE would split one.
        let wide = "é".repeat(0x8000);
        assert_eq!(
            enc.row(&[Some("ok"), Some(wide.as_str())]).unwrap_err(),
            ProtocolError::ValueTooLong {
                what: "row value",
                length: 0x10000,
                max: 0xFFFE,
            }
        );
        assert_eq!(enc.buf.len(), before);

        let exact = "x".repeat(0xFFFF);
        assert!(enc.row(&[Some(exact.as_str()), None]).is_err());
    }

    #[test]
    fn test_too_many_columns() {
        let columns: Vec<ColumnMeta> = (0..300).map(|i| ColumnMeta::new(format!("c{i}"))).collect();
        assert_eq!(
            ResultSetEncoder::new().column_metadata(&columns).unwrap_err(),
            ProtocolError::TooManyColumns(300)
        );
    }

    #[test]
    fn test_login_ack_layout() {
        let mut buf = BytesMut::new();
        LoginAck::new(TdsVersion::V7_4, SqlServerVersion::new(16, 0, 0)).encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[0xAD, 11, 1, 0x74, 0, 0, 4, 0, 0, 16, 0, 0, 0]
        );

        let mut parser = TokenParser::new(buf.freeze());
        match parser.next_token().unwrap() {
            Some(Token::LoginAck(ack)) => {
                assert_eq!(ack.tds_version, TdsVersion::V7_4);
                assert_eq!(ack.version.major, 16);
            }
            other => panic!("expected LOGINACK, got {other:?}"),
        }
    }

    #[test]
    fn test_messages_and_env_change_roundtrip() {
        let mut enc = ResultSetEncoder::new();
        enc.env_change(&EnvChange::new(EnvChangeType::Database, "sales", "master"));
        enc.info(&ServerMessage::info("hello", "TdsLite"));
        enc.error(&ServerMessage::error(2812, "Could not find stored procedure 'x'.", "TdsLite").with_procedure("x"));
        enc.done(Done::error());

        let tokens = TokenParser::new(enc.finish()).collect_tokens().unwrap();
        assert_eq!(
            tokens[0],
            Token::EnvChange(EnvChange::new(EnvChangeType::Database, "sales", "master"))
        );
        assert!(matches!(&tokens[1], Token::Info(m) if m.message == "hello" && m.class == 0));
        assert!(matches!(&tokens[2], Token::Error(m) if m.number == 2812 && m.procedure == "x"));
        assert!(matches!(&tokens[3], Token::Done(d) if d.has_error()));
    }

    #[test]
    fn test_row_without_metadata() {
        let mut parser = TokenParser::new(Bytes::from_static(&[0xD1, 0, 0]));
        assert_eq!(parser.next_token().unwrap_err(), ProtocolError::MissingMetadata);
    }

    #[test]
    fn test_unknown_token() {
        let mut parser = TokenParser::new(Bytes::from_static(&[0x42]));
        assert_eq!(
            parser.next_token().unwrap_err(),
            ProtocolError::InvalidTokenType(0x42)
        );
    }

    #[test]
    fn test_attention_done() {
        let mut buf = BytesMut::new();
        Done::attention().encode(&mut buf);
        let done = Done::decode(&mut &buf[1..]).unwrap();
        assert!(done.status.contains(DoneStatus::ATTN));
    }
}
