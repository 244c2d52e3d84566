//! TDS data type tags understood by this server.
//!
//! RPC parameters may carry any of these tags; result columns are always
//! described as [`TypeId::BigVarChar`].

/// TDS data type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// 8-bit unsigned integer (TINYINT).
    Int1 = 0x30,
    /// Bit (boolean).
    Bit = 0x32,
    /// 16-bit signed integer (SMALLINT).
    Int2 = 0x34,
    /// 32-bit signed integer (INT).
    Int4 = 0x38,
    /// 64-bit floating point (FLOAT).
    Float8 = 0x3E,
    /// 64-bit signed integer (BIGINT).
    Int8 = 0x7F,
    /// Large variable-length character (VARCHAR).
    BigVarChar = 0xA7,
    /// Variable-length Unicode character (NVARCHAR).
    NVarChar = 0xE7,
}

impl TypeId {
    /// Create a type ID from a raw byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x30 => Some(Self::Int1),
            0x32 => Some(Self::Bit),
            0x34 => Some(Self::Int2),
            0x38 => Some(Self::Int4),
            0x3E => Some(Self::Float8),
            0x7F => Some(Self::Int8),
            0xA7 => Some(Self::BigVarChar),
            0xE7 => Some(Self::NVarChar),
            _ => None,
        }
    }

    /// Get the fixed size of this type in bytes, if applicable.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Int1 | Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 => Some(4),
            Self::Int8 | Self::Float8 => Some(8),
            Self::BigVarChar | Self::NVarChar => None,
        }
    }

    /// Check if this is a Unicode type.
    #[must_use]
    pub const fn is_unicode(&self) -> bool {
        matches!(self, Self::NVarChar)
    }
}

/// COLMETADATA flag bit: column is nullable.
pub const COLUMN_NULLABLE: u16 = 0x0001;

/// COLMETADATA flag bits: column is read-write (`updateable = 1`).
pub const COLUMN_UPDATEABLE: u16 = 0x0004;
