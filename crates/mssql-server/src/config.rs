//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use mssql_codec::DEFAULT_MAX_MESSAGE_SIZE;
use mssql_engine::{ExecutorConfig, MASTER_DATABASE};
use tds_protocol::{DEFAULT_PACKET_SIZE, EncryptionLevel, SqlServerVersion, TdsVersion};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:1433";

/// Configuration for the TDS server.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,

    /// Server name reported in ERROR and INFO tokens.
    pub server_name: String,

    /// Instance name advertised in the pre-login response.
    pub instance_name: String,

    /// TDS version acknowledged at login.
    pub tds_version: TdsVersion,

    /// Product version advertised in pre-login and LOGINACK.
    pub server_version: SqlServerVersion,

    /// Encryption level answered in pre-login. The server has no TLS stack,
    /// so anything but `Off` or `NotSupported` will make clients give up.
    pub encryption: EncryptionLevel,

    /// Database used when the client does not ask for one.
    pub default_database: String,

    /// Directory holding `<name>.db` files; `None` keeps databases in memory.
    pub data_dir: Option<PathBuf>,

    /// Largest packet the server writes.
    pub max_packet_size: usize,

    /// Largest request, summed over its packets, the server accepts.
    pub max_message_size: usize,

    /// Maximum concurrent connections (0 = unlimited).
    pub max_connections: usize,

    /// Maximum iterations of one WHILE loop.
    pub max_loop_iterations: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 1433)),
            server_name: "TdsLite".to_owned(),
            instance_name: "MSSQLServer".to_owned(),
            tds_version: TdsVersion::V7_4,
            server_version: SqlServerVersion::new(16, 0, 0),
            encryption: EncryptionLevel::Off,
            default_database: MASTER_DATABASE.to_owned(),
            data_dir: None,
            max_packet_size: DEFAULT_PACKET_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_connections: 0,
            max_loop_iterations: 10_000,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    /// Set the advertised product version.
    #[must_use]
    pub fn server_version(mut self, version: SqlServerVersion) -> Self {
        self.server_version = version;
        self
    }

    /// Set the pre-login encryption level.
    #[must_use]
    pub fn encryption(mut self, level: EncryptionLevel) -> Self {
        self.encryption = level;
        self
    }

    /// Set the default database.
    #[must_use]
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = database.into();
        self
    }

    /// Store databases as files in `dir`.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the maximum packet size. Values are clamped to 512..=32767.
    #[must_use]
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.clamp(512, 32767);
        self
    }

    /// Set the request size cap. Values below one packet are raised to 512.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size.max(512);
        self
    }

    /// Set the maximum number of concurrent connections.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the WHILE iteration limit.
    #[must_use]
    pub fn max_loop_iterations(mut self, limit: usize) -> Self {
        self.max_loop_iterations = limit;
        self
    }

    /// The executor configuration derived from this server configuration.
    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::new()
            .max_loop_iterations(self.max_loop_iterations)
            .version(format!(
                "{} {} (SQLite storage) - {}",
                self.server_name, self.server_version, self.tds_version
            ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR.parse().unwrap());
        assert_eq!(config.default_database, "master");
        assert_eq!(config.encryption, EncryptionLevel::Off);
        assert_eq!(config.max_packet_size, 4096);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.max_message_size, 4 * 1024 * 1024);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new()
            .listen_addr("0.0.0.0:14330".parse().unwrap())
            .server_name("test")
            .max_packet_size(100)
            .max_connections(8)
            .max_message_size(10)
            .max_loop_iterations(50)
            .data_dir("/tmp/tds");

        assert_eq!(config.listen_addr.port(), 14330);
        assert_eq!(config.max_packet_size, 512);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_message_size, 512);
        assert_eq!(config.executor_config().max_loop_iterations, 50);
        assert!(config.executor_config().version.starts_with("test 16.0.0"));
        assert_eq!(config.data_dir.unwrap(), PathBuf::from("/tmp/tds"));
    }
}
