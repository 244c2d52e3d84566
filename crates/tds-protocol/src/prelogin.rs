//! TDS pre-login packet handling.
//!
//! The pre-login packet is the first message a client sends. It carries a
//! directory of 5-byte option entries (`type:1, offset:2, length:2`, both
//! big-endian) terminated by `0xFF`, followed by the option payloads. Offsets
//! are absolute from the start of the packet payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::version::SqlServerVersion;

/// Upper bound on directory entries read from a single pre-login payload.
pub const MAX_PRELOGIN_OPTIONS: usize = 16;

/// Pre-login option types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PreLoginOption {
    /// Version information.
    Version = 0x00,
    /// Encryption negotiation.
    Encryption = 0x01,
    /// Instance name (for named instances).
    Instance = 0x02,
    /// Thread ID.
    ThreadId = 0x03,
    /// MARS (Multiple Active Result Sets) support.
    Mars = 0x04,
    /// Trace ID for distributed tracing.
    TraceId = 0x05,
    /// Federated authentication required.
    FedAuthRequired = 0x06,
    /// Nonce for encryption.
    Nonce = 0x07,
    /// Terminator (end of options).
    Terminator = 0xFF,
}

impl PreLoginOption {
    /// Create from raw byte value. Unknown option types yield `None`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Version),
            0x01 => Some(Self::Encryption),
            0x02 => Some(Self::Instance),
            0x03 => Some(Self::ThreadId),
            0x04 => Some(Self::Mars),
            0x05 => Some(Self::TraceId),
            0x06 => Some(Self::FedAuthRequired),
            0x07 => Some(Self::Nonce),
            0xFF => Some(Self::Terminator),
            _ => None,
        }
    }
}

/// Encryption level negotiated in pre-login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encryption is off (login packet only, in a real server).
    #[default]
    Off = 0x00,
    /// Encryption is on.
    On = 0x01,
    /// Encryption is not supported.
    NotSupported = 0x02,
    /// Encryption is required.
    Required = 0x03,
}

impl EncryptionLevel {
    /// Create from raw byte value; unknown values map to `Off`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            0x03 => Self::Required,
            _ => Self::Off,
        }
    }

    /// Check if encryption is required.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self, Self::On | Self::Required)
    }

    /// Level the server answers with, given what the client asked for.
    ///
    /// The server has no TLS stack: a client that cannot encrypt gets
    /// `NotSupported` back, anyone else gets the configured level.
    #[must_use]
    pub const fn negotiate(requested: Self, configured: Self) -> Self {
        match requested {
            Self::NotSupported => Self::NotSupported,
            _ => configured,
        }
    }
}

/// Pre-login message, used for both the client request and the server response.
///
/// `version` is the sender's product version: a client library's own
/// version in requests, the SQL Server product version in responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreLogin {
    /// Product version of the sender.
    pub version: SqlServerVersion,
    /// Encryption level.
    pub encryption: EncryptionLevel,
    /// Instance name (for named instances).
    pub instance: Option<String>,
    /// Thread ID.
    pub thread_id: Option<u32>,
    /// MARS enabled.
    pub mars: bool,
}

impl PreLogin {
    /// Create a new pre-login message with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the server's answer to a client pre-login.
    ///
    /// MARS is never offered and the thread id is not echoed.
    #[must_use]
    pub fn response(
        request: &Self,
        server_version: SqlServerVersion,
        configured: EncryptionLevel,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            version: server_version,
            encryption: EncryptionLevel::negotiate(request.encryption, configured),
            instance: Some(instance.into()),
            thread_id: None,
            mars: false,
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: SqlServerVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the encryption level.
    #[must_use]
    pub fn with_encryption(mut self, level: EncryptionLevel) -> Self {
        self.encryption = level;
        self
    }

    /// Enable MARS.
    #[must_use]
    pub fn with_mars(mut self, enabled: bool) -> Self {
        self.mars = enabled;
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Set the thread id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: u32) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Encode the pre-login message.
    ///
    /// Offsets are always regenerated from the current field values.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut entries: Vec<(PreLoginOption, Vec<u8>)> = Vec::with_capacity(5);

        let mut version = Vec::with_capacity(6);
        version.put_u32(self.version.raw());
        version.put_u16_le(self.version.sub_build);
        entries.push((PreLoginOption::Version, version));

        entries.push((PreLoginOption::Encryption, vec![self.encryption as u8]));

        if let Some(ref instance) = self.instance {
            let mut data = instance.as_bytes().to_vec();
            data.push(0);
            entries.push((PreLoginOption::Instance, data));
        }

        if let Some(thread_id) = self.thread_id {
            entries.push((PreLoginOption::ThreadId, thread_id.to_be_bytes().to_vec()));
        }

        entries.push((PreLoginOption::Mars, vec![u8::from(self.mars)]));

        let header_size = entries.len() * 5 + 1;
        let data_size: usize = entries.iter().map(|(_, d)| d.len()).sum();
        let mut buf = BytesMut::with_capacity(header_size + data_size);

        let mut offset = header_size;
        for (option, data) in &entries {
            buf.put_u8(*option as u8);
            buf.put_u16(offset as u16);
            buf.put_u16(data.len() as u16);
            offset += data.len();
        }
        buf.put_u8(PreLoginOption::Terminator as u8);

        for (_, data) in &entries {
            buf.put_slice(data);
        }

        buf.freeze()
    }

    /// Decode a pre-login payload.
    ///
    /// The directory walk stops at the terminator or after
    /// [`MAX_PRELOGIN_OPTIONS`] entries. Unknown option types are skipped and
    /// any option whose `offset + length` runs past the payload is ignored.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut prelogin = Self::default();
        let mut options = Vec::new();
        let mut pos = 0;

        for _ in 0..MAX_PRELOGIN_OPTIONS {
            let Some(&option_type) = payload.get(pos) else {
                return Err(ProtocolError::UnexpectedEof);
            };
            if option_type == PreLoginOption::Terminator as u8 {
                break;
            }
            let Some(entry) = payload.get(pos + 1..pos + 5) else {
                return Err(ProtocolError::UnexpectedEof);
            };
            let offset = u16::from_be_bytes([entry[0], entry[1]]) as usize;
            let length = u16::from_be_bytes([entry[2], entry[3]]) as usize;
            pos += 5;

            if let Some(option) = PreLoginOption::from_u8(option_type) {
                options.push((option, offset, length));
            }
        }

        for (option, offset, length) in options {
            let Some(data) = payload.get(offset..offset + length) else {
                continue;
            };

            match option {
                PreLoginOption::Version if length >= 4 => {
                    let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                    let sub_build = if length >= 6 {
                        u16::from_le_bytes([data[4], data[5]])
                    } else {
                        0
                    };
                    prelogin.version = SqlServerVersion::from_raw(raw, sub_build);
                }
                PreLoginOption::Encryption if length >= 1 => {
                    prelogin.encryption = EncryptionLevel::from_u8(data[0]);
                }
                // A present option is kept even when empty: clients send a
                // lone NUL for the default instance.
                PreLoginOption::Instance => {
                    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                    if let Ok(s) = core::str::from_utf8(&data[..end]) {
                        prelogin.instance = Some(s.to_string());
                    }
                }
                PreLoginOption::ThreadId if length >= 4 => {
                    prelogin.thread_id =
                        Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
                }
                PreLoginOption::Mars if length >= 1 => {
                    prelogin.mars = data[0] != 0;
                }
                _ => {}
            }
        }

        Ok(prelogin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use proptest::prelude::*;

    #[test]
    fn test_prelogin_encode_layout() {
        let encoded = PreLogin::new().encode();
        // VERSION, ENCRYPTION, MARS + terminator
        assert_eq!(encoded[0], PreLoginOption::Version as u8);
        assert_eq!(&encoded[1..5], &[0x00, 16, 0x00, 6]);
        assert_eq!(encoded[15], PreLoginOption::Terminator as u8);
        assert_eq!(encoded.len(), 16 + 6 + 1 + 1);
    }

    #[test]
    fn test_encryption_negotiation() {
        assert_eq!(
            EncryptionLevel::negotiate(EncryptionLevel::NotSupported, EncryptionLevel::Off),
            EncryptionLevel::NotSupported
        );
        assert_eq!(
            EncryptionLevel::negotiate(EncryptionLevel::Required, EncryptionLevel::Off),
            EncryptionLevel::Off
        );
        assert!(EncryptionLevel::Required.is_required());
        assert!(!EncryptionLevel::NotSupported.is_required());
    }

    #[test]
    fn test_response_has_terminator_and_instance() {
        let request = PreLogin::new().with_encryption(EncryptionLevel::On);
        let response = PreLogin::response(
            &request,
            SqlServerVersion::new(16, 0, 1000),
            EncryptionLevel::Off,
            "MSSQLServer",
        );
        let encoded = response.encode();
        assert!(encoded.contains(&0xFF));

        let decoded = PreLogin::decode(&encoded).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::Off);
        assert_eq!(decoded.instance.as_deref(), Some("MSSQLServer"));
        assert_eq!(decoded.version, SqlServerVersion::new(16, 0, 1000));
    }

    #[test]
    fn test_decode_out_of_order_offsets() {
        let mut buf = bytes::BytesMut::new();
        let header_size: u16 = 11;

        buf.put_u8(PreLoginOption::Encryption as u8);
        buf.put_u16(header_size);
        buf.put_u16(1);

        buf.put_u8(PreLoginOption::Version as u8);
        buf.put_u16(header_size + 1);
        buf.put_u16(6);

        buf.put_u8(PreLoginOption::Terminator as u8);

        buf.put_u8(0x01);
        buf.put_slice(&[0x0F, 0x00, 0x07, 0xD0]);
        buf.put_u16_le(3);

        let decoded = PreLogin::decode(&buf).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::On);
        assert_eq!(decoded.version.major, 15);
        assert_eq!(decoded.version.build, 2000);
        assert_eq!(decoded.version.sub_build, 3);
    }

    #[test]
    fn test_decode_ignores_out_of_bounds_option() {
        let mut buf = bytes::BytesMut::new();
        buf.put_u8(PreLoginOption::Encryption as u8);
        buf.put_u16(11);
        buf.put_u16(1);
        buf.put_u8(PreLoginOption::ThreadId as u8);
        buf.put_u16(200);
        buf.put_u16(4);
        buf.put_u8(PreLoginOption::Terminator as u8);
        buf.put_u8(0x02);

        let decoded = PreLogin::decode(&buf).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::NotSupported);
        assert_eq!(decoded.thread_id, None);
    }

    #[test]
    fn test_decode_skips_unknown_option() {
        let mut buf = bytes::BytesMut::new();
        buf.put_u8(0x42);
        buf.put_u16(11);
        buf.put_u16(1);
        buf.put_u8(PreLoginOption::Mars as u8);
        buf.put_u16(12);
        buf.put_u16(1);
        buf.put_u8(PreLoginOption::Terminator as u8);
        buf.put_u8(0xEE);
        buf.put_u8(0x01);

        let decoded = PreLogin::decode(&buf).unwrap();
        assert!(decoded.mars);
    }

    #[test]
    fn test_decode_iteration_cap_without_terminator() {
        // Entries only, no terminator: the walk stops at the cap.
        let mut buf = bytes::BytesMut::new();
        for _ in 0..MAX_PRELOGIN_OPTIONS + 4 {
            buf.put_u8(0x42);
            buf.put_u16(0);
            buf.put_u16(0);
        }
        assert_eq!(PreLogin::decode(&buf).unwrap(), PreLogin::default());
    }

    #[test]
    fn test_empty_instance_is_kept() {
        let original = PreLogin::new().with_instance("");
        let encoded = original.encode();
        let decoded = PreLogin::decode(&encoded).unwrap();
        assert_eq!(decoded.instance.as_deref(), Some(""));
        assert_eq!(decoded, original);

        let decoded = PreLogin::decode(&PreLogin::new().encode()).unwrap();
        assert_eq!(decoded.instance, None);
    }

    #[test]
    fn test_decode_truncated_directory() {
        assert_eq!(
            PreLogin::decode(&[0x00, 0x00]).unwrap_err(),
            ProtocolError::UnexpectedEof
        );
        assert_eq!(PreLogin::decode(&[]).unwrap_err(), ProtocolError::UnexpectedEof);
    }

    proptest! {
        #[test]
        fn prop_prelogin_roundtrip(
            major: u8,
            minor: u8,
            build: u16,
            encryption in 0u8..4,
            instance in proptest::option::of("[A-Za-z0-9_]{0,16}"),
            thread_id: Option<u32>,
            mars: bool,
        ) {
            let mut original = PreLogin::new()
                .with_version(SqlServerVersion::new(major, minor, build))
                .with_encryption(EncryptionLevel::from_u8(encryption))
                .with_mars(mars);
            original.instance = instance;
            original.thread_id = thread_id;

            let decoded = PreLogin::decode(&original.encode()).unwrap();
            prop_assert_eq!(decoded, original);
        }
    }
}
