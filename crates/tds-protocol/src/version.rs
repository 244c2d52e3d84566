//! TDS protocol and SQL Server product version definitions.

use core::fmt;

/// TDS protocol version.
///
/// Advertised by the server inside the LOGINACK token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TdsVersion(u32);

impl TdsVersion {
    /// TDS 7.0 (SQL Server 7.0)
    pub const V7_0: Self = Self(0x70000000);

    /// TDS 7.1 (SQL Server 2000)
    pub const V7_1: Self = Self(0x71000000);

    /// TDS 7.2 (SQL Server 2005)
    pub const V7_2: Self = Self(0x72090002);

    /// TDS 7.3A (SQL Server 2008)
    pub const V7_3A: Self = Self(0x730A0003);

    /// TDS 7.3B (SQL Server 2008 R2)
    pub const V7_3B: Self = Self(0x730B0003);

    /// TDS 7.4 (SQL Server 2012+)
    pub const V7_4: Self = Self(0x74000004);

    /// Create a new TDS version from its raw wire value.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Get the raw version value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Parse a TDS version from a string such as `"7.4"` or `"7.3b"`.
    ///
    /// Returns None if the string cannot be parsed.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "7.0" => Some(Self::V7_0),
            "7.1" => Some(Self::V7_1),
            "7.2" => Some(Self::V7_2),
            "7.3" | "7.3a" => Some(Self::V7_3A),
            "7.3b" => Some(Self::V7_3B),
            "7.4" => Some(Self::V7_4),
            _ => None,
        }
    }

    /// Major version number (always 7 for the versions this server speaks).
    #[must_use]
    pub const fn major(self) -> u8 {
        ((self.0 >> 28) & 0x0F) as u8
    }

    /// Logical minor version (e.g. 3 for TDS 7.3).
    #[must_use]
    pub const fn minor(self) -> u8 {
        ((self.0 >> 24) & 0x0F) as u8
    }

    /// Revision suffix of the 7.3 variants.
    #[must_use]
    pub const fn revision_suffix(self) -> Option<char> {
        match self.0 {
            0x730A0003 => Some('A'),
            0x730B0003 => Some('B'),
            _ => None,
        }
    }
}

impl Default for TdsVersion {
    fn default() -> Self {
        Self::V7_4
    }
}

impl fmt::Display for TdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.revision_suffix() {
            Some(suffix) => write!(f, "TDS {}.{}{}", self.major(), self.minor(), suffix),
            None => write!(f, "TDS {}.{}", self.major(), self.minor()),
        }
    }
}

impl From<u32> for TdsVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// SQL Server product version.
///
/// Sent in the pre-login VERSION option and the LOGINACK token. Wire form is
/// `[major][minor][build_hi][build_lo]` big-endian followed, in pre-login only,
/// by a little-endian sub-build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SqlServerVersion {
    /// Major version (16 = SQL Server 2022).
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Build number.
    pub build: u16,
    /// Sub-build number.
    pub sub_build: u16,
}

impl SqlServerVersion {
    /// Create a version from its components.
    #[must_use]
    pub const fn new(major: u8, minor: u8, build: u16) -> Self {
        Self {
            major,
            minor,
            build,
            sub_build: 0,
        }
    }

    /// Rebuild a version from the 4-byte big-endian value and the sub-build.
    #[must_use]
    pub const fn from_raw(raw: u32, sub_build: u16) -> Self {
        Self {
            major: (raw >> 24) as u8,
            minor: (raw >> 16) as u8,
            build: raw as u16,
            sub_build,
        }
    }

    /// The 4-byte wire value without the sub-build.
    #[must_use]
    pub const fn raw(&self) -> u32 {
        ((self.major as u32) << 24) | ((self.minor as u32) << 16) | self.build as u32
    }

    /// Parse `"major.minor.build"`; missing components default to zero.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Ok(0), str::parse).ok()?;
        let build = parts.next().map_or(Ok(0), str::parse).ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, build))
    }
}

impl Default for SqlServerVersion {
    fn default() -> Self {
        Self::new(16, 0, 0)
    }
}

impl fmt::Display for SqlServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison() {
        assert!(TdsVersion::V7_4 > TdsVersion::V7_3B);
        assert!(TdsVersion::V7_3B > TdsVersion::V7_3A);
        assert!(TdsVersion::V7_3A > TdsVersion::V7_2);
    }

    #[test]
    fn test_parse() {
        assert_eq!(TdsVersion::parse("7.3"), Some(TdsVersion::V7_3A));
        assert_eq!(TdsVersion::parse("7.3B"), Some(TdsVersion::V7_3B));
        assert_eq!(TdsVersion::parse(" 7.4 "), Some(TdsVersion::V7_4));
        assert_eq!(TdsVersion::parse("8.0"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(TdsVersion::V7_0.to_string(), "TDS 7.0");
        assert_eq!(TdsVersion::V7_2.to_string(), "TDS 7.2");
        assert_eq!(TdsVersion::V7_3A.to_string(), "TDS 7.3A");
        assert_eq!(TdsVersion::V7_4.to_string(), "TDS 7.4");
    }

    #[test]
    fn test_server_version_raw() {
        let v = SqlServerVersion::new(16, 0, 4105);
        assert_eq!(v.raw(), 0x1000_1009);
        assert_eq!(SqlServerVersion::from_raw(v.raw(), 7).sub_build, 7);
        assert_eq!(SqlServerVersion::from_raw(v.raw(), 0), v);
    }

    #[test]
    fn test_server_version_parse() {
        assert_eq!(
            SqlServerVersion::parse("15.0.2000"),
            Some(SqlServerVersion::new(15, 0, 2000))
        );
        assert_eq!(
            SqlServerVersion::parse("16"),
            Some(SqlServerVersion::new(16, 0, 0))
        );
        assert_eq!(SqlServerVersion::parse("16.x"), None);
        assert_eq!(SqlServerVersion::parse("1.2.3.4"), None);
        assert_eq!(SqlServerVersion::default().to_string(), "16.0.0");
    }
}
