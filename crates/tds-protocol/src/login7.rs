//! TDS LOGIN7 packet handling.
//!
//! The server decodes LOGIN7 only for the informational fields it needs
//! (host, user, application, server and database names); credentials are
//! never checked. The encode side exists for test clients.
//!
//! ## Packet Structure
//!
//! - Fixed-length header (94 bytes, little-endian integers)
//! - Offset/length table starting at byte 36, lengths in UTF-16 code units
//! - Variable-length data section (strings are UTF-16LE)

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf16_bytes, write_utf16_string};
use crate::error::ProtocolError;
use crate::version::TdsVersion;

/// LOGIN7 packet header size (fixed portion).
pub const LOGIN7_HEADER_SIZE: usize = 94;

const HOSTNAME_ENTRY: usize = 36;
const USERNAME_ENTRY: usize = 40;
const PASSWORD_ENTRY: usize = 44;
const APP_NAME_ENTRY: usize = 48;
const SERVER_NAME_ENTRY: usize = 52;
const UNUSED_ENTRY: usize = 56;
const LIBRARY_NAME_ENTRY: usize = 60;
const LANGUAGE_ENTRY: usize = 64;
const DATABASE_ENTRY: usize = 68;

/// Fields of a LOGIN7 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login7 {
    /// TDS version requested by the client.
    pub tds_version: TdsVersion,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client process ID.
    pub client_pid: u32,
    /// Hostname (client machine name).
    pub hostname: String,
    /// Login name.
    pub username: String,
    /// Password; only ever populated on the encode side.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name the client thinks it is talking to.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Language.
    pub language: String,
    /// Initial database, empty when the client did not ask for one.
    pub database: String,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TdsVersion::V7_4,
            packet_size: 4096,
            client_pid: std::process::id(),
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("tds-lite"),
            server_name: String::new(),
            library_name: String::from("tds-lite"),
            language: String::new(),
            database: String::new(),
        }
    }
}

impl Login7 {
    /// Create a new Login7 packet builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn with_sql_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the database to connect to.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the hostname (client machine name).
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// The database requested at login, if any.
    #[must_use]
    pub fn requested_database(&self) -> Option<&str> {
        let db = self.database.trim();
        (!db.is_empty()).then_some(db)
    }

    /// Decode a LOGIN7 payload.
    ///
    /// The password field is skipped.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < LOGIN7_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: LOGIN7_HEADER_SIZE,
                actual: payload.len(),
            });
        }

        let u32_at = |pos: usize| {
            u32::from_le_bytes([
                payload[pos],
                payload[pos + 1],
                payload[pos + 2],
                payload[pos + 3],
            ])
        };
        let string_at = |entry: usize| -> Result<String, ProtocolError> {
            let offset = u16::from_le_bytes([payload[entry], payload[entry + 1]]) as usize;
            let chars = u16::from_le_bytes([payload[entry + 2], payload[entry + 3]]) as usize;
            if chars == 0 {
                return Ok(String::new());
            }
            let bytes = payload
                .get(offset..offset + chars * 2)
                .ok_or(ProtocolError::UnexpectedEof)?;
            decode_utf16_bytes(bytes, "login7 field")
        };

        Ok(Self {
            tds_version: TdsVersion::new(u32_at(4)),
            packet_size: u32_at(8),
            client_pid: u32_at(16),
            hostname: string_at(HOSTNAME_ENTRY)?,
            username: string_at(USERNAME_ENTRY)?,
            password: String::new(),
            app_name: string_at(APP_NAME_ENTRY)?,
            server_name: string_at(SERVER_NAME_ENTRY)?,
            library_name: string_at(LIBRARY_NAME_ENTRY)?,
            language: string_at(LANGUAGE_ENTRY)?,
            database: string_at(DATABASE_ENTRY)?,
        })
    }

    /// Encode the LOGIN7 packet to bytes.
    ///
    /// Feature extensions, SSPI and password change are never emitted.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let fields: [(usize, &str); 9] = [
            (HOSTNAME_ENTRY, &self.hostname),
            (USERNAME_ENTRY, &self.username),
            (PASSWORD_ENTRY, &self.password),
            (APP_NAME_ENTRY, &self.app_name),
            (SERVER_NAME_ENTRY, &self.server_name),
            (UNUSED_ENTRY, ""),
            (LIBRARY_NAME_ENTRY, &self.library_name),
            (LANGUAGE_ENTRY, &self.language),
            (DATABASE_ENTRY, &self.database),
        ];

        let mut table = BytesMut::with_capacity(LOGIN7_HEADER_SIZE - HOSTNAME_ENTRY);
        let mut var_data = BytesMut::new();
        let mut offset = LOGIN7_HEADER_SIZE;

        for (entry, value) in fields {
            let chars = value.encode_utf16().count();
            table.put_u16_le(offset as u16);
            table.put_u16_le(chars as u16);
            if entry == PASSWORD_ENTRY {
                write_obfuscated_password(&mut var_data, value);
            } else {
                write_utf16_string(&mut var_data, value);
            }
            offset += chars * 2;
        }

        // Client ID
        table.put_slice(&[0u8; 6]);
        // SSPI, attach db file, change password: all empty
        for _ in 0..3 {
            table.put_u16_le(offset as u16);
            table.put_u16_le(0);
        }
        // SSPI long
        table.put_u32_le(0);

        let total_length = LOGIN7_HEADER_SIZE + var_data.len();
        let mut buf = BytesMut::with_capacity(total_length);
        buf.put_u32_le(total_length as u32);
        buf.put_u32_le(self.tds_version.raw());
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(0); // client program version
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id
        buf.put_u8(0xE0); // fUseDB | fDatabase | fSetLang
        buf.put_u8(0x03); // fLanguage | fODBC
        buf.put_u8(0x00);
        buf.put_u8(0x00);
        buf.put_i32_le(0); // timezone
        buf.put_u32_le(0x0409); // LCID
        buf.put_slice(&table);
        buf.put_slice(&var_data);

        buf.freeze()
    }
}

/// Swap nibbles then XOR with 0xA5, per byte of the UTF-16LE password.
fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for c in password.encode_utf16() {
        let [low, high] = c.to_le_bytes();
        dst.put_u8(low.rotate_right(4) ^ 0xA5);
        dst.put_u8(high.rotate_right(4) ^ 0xA5);
    }
}
