//! Declared SQL types and value coercion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::SqlValue;

/// `i64::MIN` as f64 (exact).
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
/// `i64::MAX + 1` as f64 (exact).
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Base type of a declared variable or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// `TINYINT` (0..=255).
    TinyInt,
    /// `SMALLINT`.
    SmallInt,
    /// `INT`.
    Int,
    /// `BIGINT`.
    BigInt,
    /// `BIT`.
    Bit,
    /// `DECIMAL(p, s)`.
    Decimal,
    /// `NUMERIC(p, s)`.
    Numeric,
    /// `FLOAT`.
    Float,
    /// `REAL`.
    Real,
    /// `CHAR(n)`.
    Char,
    /// `VARCHAR(n)`.
    VarChar,
    /// `NCHAR(n)`.
    NChar,
    /// `NVARCHAR(n)`.
    NVarChar,
}

impl TypeKind {
    /// Upper-case SQL name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::Bit => "BIT",
            Self::Decimal => "DECIMAL",
            Self::Numeric => "NUMERIC",
            Self::Float => "FLOAT",
            Self::Real => "REAL",
            Self::Char => "CHAR",
            Self::VarChar => "VARCHAR",
            Self::NChar => "NCHAR",
            Self::NVarChar => "NVARCHAR",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_uppercase().as_str() {
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "INT" | "INTEGER" => Self::Int,
            "BIGINT" => Self::BigInt,
            "BIT" => Self::Bit,
            "DECIMAL" | "DEC" => Self::Decimal,
            "NUMERIC" => Self::Numeric,
            "FLOAT" => Self::Float,
            "REAL" => Self::Real,
            "CHAR" | "CHARACTER" => Self::Char,
            "VARCHAR" => Self::VarChar,
            "NCHAR" => Self::NChar,
            "NVARCHAR" => Self::NVarChar,
            _ => return None,
        };
        Some(kind)
    }

    /// Integer range for the integer kinds.
    const fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Self::TinyInt => Some((0, 255)),
            Self::SmallInt => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Whether this is a character type.
    #[must_use]
    pub const fn is_character(self) -> bool {
        matches!(self, Self::Char | Self::VarChar | Self::NChar | Self::NVarChar)
    }

    /// Whether this is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.int_range().is_some()
    }
}

/// Declared length of a character type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Length {
    /// No length given; values are not truncated.
    #[default]
    Unspecified,
    /// `(MAX)`.
    Max,
    /// `(n)` characters.
    Chars(u32),
}

/// A declared SQL type: base kind plus length or precision/scale.
///
/// Parses from and renders to the T-SQL spelling (`VARCHAR(50)`,
/// `DECIMAL(10,2)`, `NVARCHAR(MAX)`), which is also its serde form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SqlType {
    /// Base type.
    pub kind: TypeKind,
    /// Length for character types.
    pub length: Length,
    /// Precision for DECIMAL/NUMERIC.
    pub precision: u8,
    /// Scale for DECIMAL/NUMERIC.
    pub scale: u8,
}

impl SqlType {
    /// Default DECIMAL precision.
    pub const DEFAULT_PRECISION: u8 = 18;

    /// Create a type with default arguments.
    #[must_use]
    pub const fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            length: Length::Unspecified,
            precision: Self::DEFAULT_PRECISION,
            scale: 0,
        }
    }

    /// Character type with a length.
    #[must_use]
    pub const fn with_length(mut self, length: Length) -> Self {
        self.length = length;
        self
    }

    /// Exact numeric with precision and scale.
    #[must_use]
    pub const fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// The type a value would have if it were declared from the value alone,
    /// as done for `sp_executesql` parameters.
    #[must_use]
    pub fn infer(value: &SqlValue) -> Self {
        match value {
            SqlValue::Int(_) => Self::new(TypeKind::BigInt),
            SqlValue::Float(_) => Self::new(TypeKind::Float),
            SqlValue::Bool(_) => Self::new(TypeKind::Bit),
            SqlValue::Null | SqlValue::Text(_) => {
                Self::new(TypeKind::NVarChar).with_length(Length::Max)
            }
        }
    }

    /// Parse a type spelling such as `VARCHAR(50)` or `decimal(10, 2)`.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let text = text.trim();
        let (name, args) = match text.find('(') {
            Some(open) => {
                let close = text
                    .rfind(')')
                    .filter(|&c| c > open)
                    .ok_or_else(|| TypeError::UnknownType(text.to_owned()))?;
                if !text[close + 1..].trim().is_empty() {
                    return Err(TypeError::UnknownType(text.to_owned()));
                }
                (text[..open].trim(), Some(text[open + 1..close].trim()))
            }
            None => (text, None),
        };

        let kind = TypeKind::from_name(name).ok_or_else(|| TypeError::UnknownType(text.to_owned()))?;
        let mut ty = Self::new(kind);
        let Some(args) = args else {
            return Ok(ty);
        };

        let invalid = || TypeError::InvalidArguments {
            type_name: kind.name(),
            arguments: args.to_owned(),
        };

        if kind.is_character() {
            ty.length = if args.eq_ignore_ascii_case("MAX") {
                Length::Max
            } else {
                Length::Chars(args.parse::<u32>().ok().filter(|&n| n > 0).ok_or_else(invalid)?)
            };
        } else if matches!(kind, TypeKind::Decimal | TypeKind::Numeric) {
            let mut parts = args.split(',').map(str::trim);
            let precision = parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .filter(|p| (1..=38).contains(p))
                .ok_or_else(invalid)?;
            let scale = match parts.next() {
                Some(s) => s.parse::<u8>().ok().filter(|&s| s <= precision).ok_or_else(invalid)?,
                None => 0,
            };
            if parts.next().is_some() {
                return Err(invalid());
            }
            ty = ty.with_precision(precision, scale);
        } else if kind == TypeKind::Float {
            // FLOAT(n) only selects storage size.
            args.parse::<u8>().map_err(|_| invalid())?;
        } else {
            return Err(invalid());
        }
        Ok(ty)
    }

    /// Convert a value to this type.
    ///
    /// NULL stays NULL. Integers are range-checked, fractional input is
    /// truncated toward zero, BIT maps non-zero to true, character types are
    /// truncated to their length, DECIMAL/NUMERIC round to the scale.
    pub fn coerce(&self, value: SqlValue) -> Result<SqlValue, TypeError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        let kind = self.kind;

        if let Some((min, max)) = kind.int_range() {
            let n = match &value {
                SqlValue::Int(v) => *v,
                SqlValue::Bool(b) => i64::from(*b),
                other => match other.as_str().and_then(|s| s.trim().parse::<i64>().ok()) {
                    Some(n) => n,
                    None => {
                        let f = other.as_number().ok_or_else(|| self.conversion(other))?.trunc();
                        if f < min as f64 || f > max as f64 {
                            return Err(self.out_of_range(other));
                        }
                        f as i64
                    }
                },
            };
            if n < min || n > max {
                return Err(self.out_of_range(&value));
            }
            return Ok(SqlValue::Int(n));
        }

        match kind {
            TypeKind::Bit => match &value {
                SqlValue::Bool(b) => Ok(SqlValue::Bool(*b)),
                SqlValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(SqlValue::Bool(true)),
                SqlValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => {
                    Ok(SqlValue::Bool(false))
                }
                other => other
                    .as_number()
                    .map(|n| SqlValue::Bool(n != 0.0))
                    .ok_or_else(|| self.conversion(other)),
            },
            TypeKind::Float | TypeKind::Real => {
                let f = value.as_number().ok_or_else(|| self.conversion(&value))?;
                let f = if kind == TypeKind::Real { f64::from(f as f32) } else { f };
                Ok(SqlValue::Float(f))
            }
            TypeKind::Decimal | TypeKind::Numeric => {
                let limit = 10f64.powi(i32::from(self.precision.saturating_sub(self.scale)));
                if let (0, SqlValue::Int(n)) = (self.scale, &value) {
                    if (*n as f64).abs() >= limit {
                        return Err(self.out_of_range(&value));
                    }
                    return Ok(SqlValue::Int(*n));
                }
                let f = value.as_number().ok_or_else(|| self.conversion(&value))?;
                let factor = 10f64.powi(i32::from(self.scale));
                let rounded = (f * factor).round() / factor;
                if rounded.abs() >= limit {
                    return Err(self.out_of_range(&value));
                }
                // Whole numbers beyond i64 stay floating point rather than saturate.
                if self.scale == 0 && rounded >= I64_LOWER && rounded < I64_UPPER {
                    Ok(SqlValue::Int(rounded as i64))
                } else {
                    Ok(SqlValue::Float(rounded))
                }
            }
            _ => {
                let text = value.to_text().unwrap_or_default();
                Ok(SqlValue::Text(match self.length {
                    Length::Chars(n) => text.chars().take(n as usize).collect(),
                    Length::Max | Length::Unspecified => text,
                }))
            }
        }
    }

    fn conversion(&self, value: &SqlValue) -> TypeError {
        TypeError::Conversion {
            value: value.to_string(),
            target: self.to_string(),
        }
    }

    fn out_of_range(&self, value: &SqlValue) -> TypeError {
        TypeError::OutOfRange {
            value: value.to_string(),
            target: self.kind.name(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        match self.kind {
            k if k.is_character() => match self.length {
                Length::Unspecified => Ok(()),
                Length::Max => f.write_str("(MAX)"),
                Length::Chars(n) => write!(f, "({n})"),
            },
            TypeKind::Decimal | TypeKind::Numeric => {
                write!(f, "({},{})", self.precision, self.scale)
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for SqlType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SqlType> for String {
    fn from(ty: SqlType) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for SqlType {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

/// Render a value as SQL text for the given declared type.
///
/// The value is first coerced to `ty`; if that fails it is rendered as is.
/// This is the only rendering used for variable and parameter substitution.
#[must_use]
pub fn format_value(value: &SqlValue, ty: &SqlType) -> String {
    match ty.coerce(value.clone()) {
        Ok(coerced) => coerced.to_sql_literal(),
        Err(_) => value.to_sql_literal(),
    }
}
