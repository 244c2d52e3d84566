//! RPC (Remote Procedure Call) request decoding and encoding.
//!
//! RPC packets (type 0x03) carry a procedure-call-shaped request: an option
//! word and an ordered list of typed parameters. All integers in this
//! layout are big-endian.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+
//! | total length   (u32) |
//! | reserved       (u16) |
//! | param count    (u16) |
//! | reserved       (u16) |
//! | option flags   (u32) |
//! +----------------------+
//! | parameter *          |  name_len:1 name:N status:1 user_type:4 tag:1 value
//! +----------------------+
//! ```
//!
//! Value encodings by tag: VARCHAR and NVARCHAR use a u16 byte length
//! (`0xFFFF` = NULL) followed by UTF-8 or UTF-16LE bytes; TINYINT and BIT
//! are one byte; SMALLINT, INT and BIGINT are 2, 4 and 8 byte signed
//! integers; FLOAT is an 8-byte IEEE-754 double.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf16_bytes, write_utf16_string};
use crate::error::ProtocolError;
use crate::types::TypeId;

/// Length marker for a NULL character value.
pub const NULL_LENGTH: u16 = 0xFFFF;

const FIXED_HEADER_LEN: usize = 14;

/// Parameter status flag: passed by reference (OUTPUT).
pub const PARAM_BY_REF: u8 = 0x01;

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    /// SQL NULL.
    Null,
    /// Character data (VARCHAR or NVARCHAR).
    String(String),
    /// TINYINT.
    TinyInt(u8),
    /// BIT.
    Bit(bool),
    /// SMALLINT.
    SmallInt(i16),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// FLOAT.
    Float(f64),
}

impl RpcValue {
    /// Borrow the string payload, if this is character data.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One RPC parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcParam {
    /// Parameter name, empty for positional parameters.
    pub name: String,
    /// Status flags (see [`PARAM_BY_REF`]); not interpreted by the server.
    pub status: u8,
    /// Wire type tag.
    pub type_id: TypeId,
    /// Decoded value.
    pub value: RpcValue,
}

impl RpcParam {
    /// Create a parameter, picking the natural type tag for the value.
    ///
    /// NULL is sent as a VARCHAR null.
    pub fn new(name: impl Into<String>, value: RpcValue) -> Self {
        let type_id = match value {
            RpcValue::Null | RpcValue::String(_) => TypeId::BigVarChar,
            RpcValue::TinyInt(_) => TypeId::Int1,
            RpcValue::Bit(_) => TypeId::Bit,
            RpcValue::SmallInt(_) => TypeId::Int2,
            RpcValue::Int(_) => TypeId::Int4,
            RpcValue::BigInt(_) => TypeId::Int8,
            RpcValue::Float(_) => TypeId::Float8,
        };
        Self {
            name: name.into(),
            status: 0,
            type_id,
            value,
        }
    }

    /// Create a VARCHAR parameter.
    pub fn varchar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, RpcValue::String(value.into()))
    }

    /// Create an NVARCHAR parameter.
    pub fn nvarchar(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut param = Self::varchar(name, value);
        param.type_id = TypeId::NVarChar;
        param
    }

    /// Create an INT parameter.
    pub fn int(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, RpcValue::Int(value))
    }

    /// Create a BIGINT parameter.
    pub fn bigint(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, RpcValue::BigInt(value))
    }

    fn decode(src: &mut &[u8]) -> Result<Self, ProtocolError> {
        let name_len = take_u8(src)? as usize;
        let name_bytes = take(src, name_len)?;
        let name = core::str::from_utf8(name_bytes)
            .map_err(|_| ProtocolError::InvalidString("rpc parameter name"))?
            .to_string();
        let status = take_u8(src)?;
        take(src, 4)?; // user type
        let tag = take_u8(src)?;
        let type_id = TypeId::from_u8(tag).ok_or(ProtocolError::UnsupportedParameterType(tag))?;

        let value = match type_id {
            TypeId::BigVarChar | TypeId::NVarChar => {
                let len = u16::from_be_bytes(fixed(src)?);
                if len == NULL_LENGTH {
                    RpcValue::Null
                } else {
                    let bytes = take(src, len as usize)?;
                    let text = if type_id.is_unicode() {
                        decode_utf16_bytes(bytes, "nvarchar parameter")?
                    } else {
                        core::str::from_utf8(bytes)
                            .map_err(|_| ProtocolError::InvalidString("varchar parameter"))?
                            .to_string()
                    };
                    RpcValue::String(text)
                }
            }
            TypeId::Int1 => RpcValue::TinyInt(take_u8(src)?),
            TypeId::Bit => RpcValue::Bit(take_u8(src)? != 0),
            TypeId::Int2 => RpcValue::SmallInt(i16::from_be_bytes(fixed(src)?)),
            TypeId::Int4 => RpcValue::Int(i32::from_be_bytes(fixed(src)?)),
            TypeId::Int8 => RpcValue::BigInt(i64::from_be_bytes(fixed(src)?)),
            TypeId::Float8 => RpcValue::Float(f64::from_be_bytes(fixed(src)?)),
        };

        Ok(Self {
            name,
            status,
            type_id,
            value,
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let name = self.name.as_bytes();
        buf.put_u8(fit_length("rpc parameter name", name.len(), u8::MAX as usize)? as u8);
        buf.put_slice(name);
        buf.put_u8(self.status);
        buf.put_u32(0);
        buf.put_u8(self.type_id as u8);

        match (&self.value, self.type_id) {
            (RpcValue::String(s), TypeId::NVarChar) => {
                let mut text = BytesMut::with_capacity(s.len() * 2);
                write_utf16_string(&mut text, s);
                put_character_value(buf, "nvarchar parameter", &text)?;
            }
            (RpcValue::String(s), _) => {
                put_character_value(buf, "varchar parameter", s.as_bytes())?;
            }
            (RpcValue::Null, _) => buf.put_u16(NULL_LENGTH),
            (RpcValue::TinyInt(v), _) => buf.put_u8(*v),
            (RpcValue::Bit(v), _) => buf.put_u8(u8::from(*v)),
            (RpcValue::SmallInt(v), _) => buf.put_i16(*v),
            (RpcValue::Int(v), _) => buf.put_i32(*v),
            (RpcValue::BigInt(v), _) => buf.put_i64(*v),
            (RpcValue::Float(v), _) => buf.put_f64(*v),
        }
        Ok(())
    }
}

/// Length-prefixed character data. `0xFFFF` is the NULL marker, so the
/// longest value is one byte shorter.
fn put_character_value(
    buf: &mut BytesMut,
    what: &'static str,
    bytes: &[u8],
) -> Result<(), ProtocolError> {
    let len = fit_length(what, bytes.len(), NULL_LENGTH as usize - 1)?;
    buf.put_u16(len as u16);
    buf.put_slice(bytes);
    Ok(())
}

fn fit_length(what: &'static str, length: usize, max: usize) -> Result<usize, ProtocolError> {
    if length > max {
        return Err(ProtocolError::ValueTooLong { what, length, max });
    }
    Ok(length)
}

/// A decoded RPC request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcRequest {
    /// Procedure name supplied out of band, if any.
    pub procedure: Option<String>,
    /// Option flags (low 16 bits of the wire field).
    pub options: u16,
    /// Parameters in wire order.
    pub params: Vec<RpcParam>,
}

impl RpcRequest {
    /// Create a request whose first parameter names the procedure.
    #[must_use]
    pub fn call(procedure: &str) -> Self {
        Self {
            procedure: None,
            options: 0,
            params: vec![RpcParam::varchar("", procedure)],
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, param: RpcParam) -> Self {
        self.params.push(param);
        self
    }

    /// Resolve the target procedure and the arguments that go with it.
    ///
    /// An out-of-band name wins; otherwise the first parameter's string value
    /// is the name and the remaining parameters are the arguments.
    #[must_use]
    pub fn target(&self) -> Option<(&str, &[RpcParam])> {
        if let Some(ref name) = self.procedure {
            return Some((name.as_str(), &self.params));
        }
        let (first, rest) = self.params.split_first()?;
        first.value.as_str().map(|name| (name, rest))
    }

    /// Decode an RPC payload.
    ///
    /// An unknown type tag fails with [`ProtocolError::UnsupportedParameterType`].
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < FIXED_HEADER_LEN {
            return Err(ProtocolError::IncompletePacket {
                expected: FIXED_HEADER_LEN,
                actual: payload.len(),
            });
        }
        let mut src = payload;
        let total_len = src.get_u32() as usize;
        if total_len > payload.len() {
            return Err(ProtocolError::IncompletePacket {
                expected: total_len,
                actual: payload.len(),
            });
        }
        src.advance(2);
        let count = src.get_u16();
        src.advance(2);
        let options = src.get_u32() as u16;

        let mut params = Vec::with_capacity(count as usize);
        for _ in 0..count {
            params.push(RpcParam::decode(&mut src)?);
        }

        Ok(Self {
            procedure: None,
            options,
            params,
        })
    }

    /// Encode the request. The out-of-band name is not representable and is dropped.
    ///
    /// Fails with [`ProtocolError::ValueTooLong`] when a name or value does not
    /// fit its length field, rather than truncating it.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let count = fit_length("rpc parameter list", self.params.len(), u16::MAX as usize)?;
        let mut body = BytesMut::new();
        for param in &self.params {
            param.encode(&mut body)?;
        }
        let total = fit_length(
            "rpc request",
            FIXED_HEADER_LEN + body.len(),
            u32::MAX as usize,
        )?;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32(total as u32);
        buf.put_u16(0);
        buf.put_u16(count as u16);
        buf.put_u16(0);
        buf.put_u32(u32::from(self.options));
        buf.put_slice(&body);
        Ok(buf.freeze())
    }
}

fn take<'a>(src: &mut &'a [u8], n: usize) -> Result<&'a [u8], ProtocolError> {
    if src.len() < n {
        return Err(ProtocolError::UnexpectedEof);
    }
    let (head, tail) = src.split_at(n);
    *src = tail;
    Ok(head)
}

fn take_u8(src: &mut &[u8]) -> Result<u8, ProtocolError> {
    Ok(take(src, 1)?[0])
}

fn fixed<const N: usize>(src: &mut &[u8]) -> Result<[u8; N], ProtocolError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(src, N)?);
    Ok(out)
}
