//! Connection configuration.
//!
//! Everything the handshake and transport need: where to connect (TCP host
//! and port, or a Unix socket path), who to authenticate as, TLS policy and
//! client-side permissions such as LOCAL INFILE.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mywire_core::Error;
use mywire_core::error::ConfigError;

use crate::protocol::{MAX_PACKET_SIZE, capabilities, charset};

/// Conventional location of the server's Unix socket on Linux installs.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/mysqld/mysqld.sock";

/// SSL mode for MySQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Do not use SSL
    #[default]
    Disable,
    /// Use SSL if the server offers it, plaintext otherwise
    Preferred,
    /// Require SSL connection
    Required,
    /// Require SSL and verify server certificate
    VerifyCa,
    /// Require SSL and verify server certificate matches hostname
    VerifyIdentity,
}

impl SslMode {
    /// Check if SSL should be attempted.
    pub const fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Check if SSL is required.
    pub const fn is_required(self) -> bool {
        matches!(
            self,
            SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity
        )
    }
}

/// Certificates and verification options for the TLS upgrade.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM file with the CA certificate(s) that signed the server certificate
    pub ca_cert_path: Option<PathBuf>,
    /// PEM client certificate for mutual TLS
    pub client_cert_path: Option<PathBuf>,
    /// PEM private key matching `client_cert_path`
    pub client_key_path: Option<PathBuf>,
    /// Accept any server certificate
    pub danger_skip_verify: bool,
    /// Name used for SNI and certificate checks instead of the host
    pub server_name: Option<String>,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CA certificate file.
    pub fn ca_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.ca_cert_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the client certificate file.
    pub fn client_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.client_cert_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the client private key file.
    pub fn client_key(mut self, path: impl AsRef<Path>) -> Self {
        self.client_key_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skip server certificate verification.
    ///
    /// # Security Warning
    /// This makes the connection open to man-in-the-middle attacks. Only use
    /// it against servers with self-signed certificates you otherwise trust.
    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.danger_skip_verify = skip;
        self
    }

    /// Override the server name used for SNI and verification.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// MySQL connection configuration.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 3306)
    pub port: u16,
    /// Unix socket path; when set it is used instead of host/port
    pub socket: Option<PathBuf>,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Default schema selected at login
    pub database: Option<String>,
    /// Character set id sent in the login packet (default: utf8_general_ci)
    pub charset: u8,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read deadline for every blocking read
    pub read_timeout: Option<Duration>,
    /// Write deadline for every blocking write
    pub write_timeout: Option<Duration>,
    /// SSL mode
    pub ssl_mode: SslMode,
    /// TLS certificates and verification options
    pub tls_config: TlsConfig,
    /// Honor LOAD DATA LOCAL INFILE requests (disabled by default for security)
    pub local_infile: bool,
    /// Max packet size announced to the server; longer reassembled
    /// server packets are rejected
    pub max_packet_size: u32,
}

impl Default for MySqlConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            socket: None,
            user: "root".to_string(),
            password: None,
            database: None,
            charset: charset::UTF8_GENERAL_CI,
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            write_timeout: None,
            ssl_mode: SslMode::default(),
            tls_config: TlsConfig::default(),
            local_infile: false,
            max_packet_size: MAX_PACKET_SIZE as u32,
        }
    }
}

impl MySqlConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hostname.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect through a Unix socket instead of TCP.
    pub fn socket(mut self, path: impl AsRef<Path>) -> Self {
        self.socket = Some(path.as_ref().to_path_buf());
        self
    }

    /// Connect through [`DEFAULT_SOCKET_PATH`].
    pub fn use_default_socket(self) -> Self {
        self.socket(DEFAULT_SOCKET_PATH)
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the SSL mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the TLS options.
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls_config = tls;
        self
    }

    /// Enable or disable local infile handling.
    ///
    /// # Security Warning
    /// A server that can send a LOCAL INFILE request can read any file this
    /// process can read. Only enable it for servers you trust.
    pub fn local_infile(mut self, enabled: bool) -> Self {
        self.local_infile = enabled;
        self
    }

    /// Set the max packet size announced at login and enforced on reads.
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Get the socket address string for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name used for SNI and certificate verification.
    pub fn tls_server_name(&self) -> &str {
        self.tls_config
            .server_name
            .as_deref()
            .unwrap_or(self.host.as_str())
    }

    /// Capability flags sent in the login packet.
    ///
    /// The set is fixed (4.1 protocol, secure connection, local files) plus
    /// `CLIENT_CONNECT_WITH_DB` when a default schema is configured. The
    /// handshake adds `CLIENT_SSL` on TLS legs.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capabilities::CLIENT_PROTOCOL_41
            | capabilities::CLIENT_SECURE_CONNECTION
            | capabilities::CLIENT_LOCAL_FILES;

        if self.database.as_deref().is_some_and(|db| !db.is_empty()) {
            flags |= capabilities::CLIENT_CONNECT_WITH_DB;
        }

        flags
    }

    /// Check the configuration for settings that cannot work together.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<(), Error> {
        if self.user.len() > 255 {
            return Err(config_error("user name longer than 255 bytes"));
        }
        if self.socket.is_none() && self.host.is_empty() {
            return Err(config_error("either a host or a socket path is required"));
        }
        if self.max_packet_size == 0 {
            return Err(config_error("max_packet_size must be positive"));
        }
        if self.tls_config.client_cert_path.is_some() != self.tls_config.client_key_path.is_some()
        {
            return Err(config_error(
                "client certificate and client key must be set together",
            ));
        }
        if matches!(self.ssl_mode, SslMode::VerifyCa | SslMode::VerifyIdentity)
            && self.tls_config.danger_skip_verify
        {
            return Err(config_error(
                "certificate verification cannot be skipped in VerifyCa/VerifyIdentity mode",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        message: message.into(),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MySqlConfig::new()
            .host("db.example.com")
            .port(3307)
            .user("myuser")
            .password("secret")
            .database("testdb")
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(5))
            .ssl_mode(SslMode::Required)
            .local_infile(true);

        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 3307);
        assert_eq!(config.user, "myuser");
        assert_eq!(config.password, Some("secret".to_string()));
        assert_eq!(config.database, Some("testdb".to_string()));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.write_timeout, None);
        assert_eq!(config.ssl_mode, SslMode::Required);
        assert!(config.local_infile);
        assert_eq!(config.socket_addr(), "db.example.com:3307");
    }

    #[test]
    fn test_default_config() {
        let config = MySqlConfig::default();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.user, "root");
        assert_eq!(config.charset, 33);
        assert_eq!(config.max_packet_size, 0x00FF_FFFF);
        assert_eq!(config.ssl_mode, SslMode::Disable);
        assert!(config.socket.is_none());
        assert!(!config.local_infile);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_socket() {
        let config = MySqlConfig::new().use_default_socket();
        assert_eq!(
            config.socket.as_deref(),
            Some(Path::new("/var/run/mysqld/mysqld.sock"))
        );
    }

    #[test]
    fn test_ssl_mode_properties() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(!SslMode::Disable.is_required());

        assert!(SslMode::Preferred.should_try_ssl());
        assert!(!SslMode::Preferred.is_required());

        assert!(SslMode::Required.is_required());
        assert!(SslMode::VerifyCa.is_required());
        assert!(SslMode::VerifyIdentity.is_required());
    }

    #[test]
    fn test_capability_flags() {
        use crate::protocol::capabilities::*;

        let flags = MySqlConfig::new().capability_flags();
        assert_eq!(
            flags,
            CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_LOCAL_FILES
        );

        let flags = MySqlConfig::new().database("test").capability_flags();
        assert!(flags & CLIENT_CONNECT_WITH_DB != 0);
        assert!(flags & CLIENT_SSL == 0);
    }

    #[test]
    fn test_tls_server_name_override() {
        let config = MySqlConfig::new().host("10.0.0.5");
        assert_eq!(config.tls_server_name(), "10.0.0.5");

        let config = config.tls_config(TlsConfig::new().server_name("db.internal"));
        assert_eq!(config.tls_server_name(), "db.internal");
    }

    #[test]
    fn test_validate_rejects_inconsistent_tls() {
        let config = MySqlConfig::new()
            .tls_config(TlsConfig::new().client_cert("/path/to/client.pem"));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = MySqlConfig::new()
            .ssl_mode(SslMode::VerifyIdentity)
            .tls_config(TlsConfig::new().skip_verify(true));
        assert!(config.validate().is_err());

        let config = MySqlConfig::new()
            .ssl_mode(SslMode::Required)
            .tls_config(TlsConfig::new().skip_verify(true));
        assert!(config.validate().is_ok());
    }
}
