//! TLS upgrade for MySQL connections.
//!
//! MySQL negotiates TLS inside its own handshake rather than on connect:
//!
//! 1. Server greeting advertises `CLIENT_SSL`
//! 2. Client sends the 32-byte SSL request (seq 1), see
//!    [`build_ssl_request`](crate::protocol::build_ssl_request)
//! 3. Client runs the TLS handshake on the same socket
//! 4. Client sends the login packet (seq 2) over TLS
//! 5. Server sends the auth result over TLS
//!
//! # Feature Flag
//!
//! TLS support requires the `tls` feature:
//!
//! ```toml
//! [dependencies]
//! mywire = { version = "0.2", features = ["tls"] }
//! ```
//!
//! Without it, any SSL mode that ends up negotiating TLS fails with a
//! `ConnectionErrorKind::Ssl` error.

use crate::config::SslMode;
#[cfg(feature = "tls")]
use crate::config::TlsConfig;
use crate::protocol::{capabilities, ssl_error};
use mywire_core::Error;

#[cfg(feature = "tls")]
use std::io::{Read, Write};
#[cfg(feature = "tls")]
use std::sync::Arc;

/// Check if the server supports SSL/TLS.
pub const fn server_supports_ssl(server_caps: u32) -> bool {
    server_caps & capabilities::CLIENT_SSL != 0
}

/// Decide whether to upgrade, given the configured mode and server capabilities.
///
/// - `Ok(true)`: send the SSL request and upgrade
/// - `Ok(false)`: continue in plaintext
/// - `Err(_)`: TLS is required but the server cannot do it
pub fn validate_ssl_mode(ssl_mode: SslMode, server_caps: u32) -> Result<bool, Error> {
    let server_supports = server_supports_ssl(server_caps);

    match ssl_mode {
        SslMode::Disable => Ok(false),
        SslMode::Preferred => Ok(server_supports),
        SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity => {
            if server_supports {
                Ok(true)
            } else {
                Err(ssl_error(format!(
                    "SSL mode {:?} requires TLS but the server does not support it",
                    ssl_mode
                )))
            }
        }
    }
}

/// TLS wrapper around a connected stream, using rustls.
///
/// Implements `Read` and `Write` so the packet codec runs over it
/// unchanged.
#[cfg(feature = "tls")]
pub struct TlsStream<S: Read + Write> {
    conn: rustls::ClientConnection,
    stream: S,
}

#[cfg(feature = "tls")]
impl<S: Read + Write> std::fmt::Debug for TlsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("protocol_version", &self.conn.protocol_version())
            .field("is_handshaking", &self.conn.is_handshaking())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "tls")]
impl<S: Read + Write> TlsStream<S> {
    /// Wrap `stream` and run the TLS handshake to completion.
    ///
    /// `server_name` is used for SNI and certificate verification unless
    /// `tls_config.server_name` overrides it.
    #[allow(clippy::result_large_err)]
    pub fn new(
        mut stream: S,
        tls_config: &TlsConfig,
        server_name: &str,
        ssl_mode: SslMode,
    ) -> Result<Self, Error> {
        let config = build_client_config(tls_config, ssl_mode)?;

        let sni_name = tls_config.server_name.as_deref().unwrap_or(server_name);
        let server_name = sni_name
            .to_string()
            .try_into()
            .map_err(|e| ssl_error(format!("Invalid server name '{}': {}", sni_name, e)))?;

        let mut conn = rustls::ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| ssl_error(format!("Failed to create TLS connection: {}", e)))?;

        while conn.is_handshaking() {
            while conn.wants_write() {
                conn.write_tls(&mut stream)
                    .map_err(|e| ssl_error(format!("TLS handshake write error: {}", e)))?;
            }

            if conn.wants_read() {
                let n = conn
                    .read_tls(&mut stream)
                    .map_err(|e| ssl_error(format!("TLS handshake read error: {}", e)))?;
                if n == 0 {
                    return Err(ssl_error("Server closed the connection during TLS handshake"));
                }

                conn.process_new_packets()
                    .map_err(|e| ssl_error(format!("TLS handshake error: {}", e)))?;
            }
        }

        tracing::debug!(
            protocol = ?conn.protocol_version(),
            cipher = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS handshake complete"
        );

        Ok(TlsStream { conn, stream })
    }

    /// Get the negotiated protocol version.
    pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.conn.protocol_version()
    }

    /// Check if the connection is using TLS 1.3.
    pub fn is_tls13(&self) -> bool {
        self.conn.protocol_version() == Some(rustls::ProtocolVersion::TLSv1_3)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Send close_notify, best effort.
    pub fn send_close_notify(&mut self) {
        self.conn.send_close_notify();
        while self.conn.wants_write() {
            if self.conn.write_tls(&mut self.stream).is_err() {
                break;
            }
        }
    }
}

#[cfg(feature = "tls")]
impl<S: Read + Write> Read for TlsStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            if self.conn.wants_read() {
                let n = self.conn.read_tls(&mut self.stream)?;
                if n == 0 {
                    return Ok(0);
                }

                self.conn
                    .process_new_packets()
                    .map_err(|e| std::io::Error::other(format!("TLS error: {}", e)))?;
            } else {
                return Ok(0);
            }
        }
    }
}

#[cfg(feature = "tls")]
impl<S: Read + Write> Write for TlsStream<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.conn.writer().write(buf)?;

        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.stream)?;
        }

        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.conn.writer().flush()?;
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.stream)?;
        }
        self.stream.flush()
    }
}

/// Build a rustls ClientConfig for the SSL mode.
///
/// `Preferred` and `Required` only skip verification when asked to;
/// the verify modes always check the chain against the configured CA or
/// the webpki roots.
#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn build_client_config(
    tls_config: &TlsConfig,
    ssl_mode: SslMode,
) -> Result<rustls::ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    match ssl_mode {
        SslMode::Disable => Err(ssl_error("TLS requested with SslMode::Disable")),
        SslMode::Preferred | SslMode::Required if tls_config.danger_skip_verify => {
            tracing::warn!("TLS certificate verification disabled");
            build_no_verify_config(&provider, tls_config)
        }
        _ => match &tls_config.ca_cert_path {
            Some(ca_path) => build_custom_ca_config(&provider, tls_config, ca_path),
            None => build_webpki_config(&provider, tls_config),
        },
    }
}

#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn versioned_builder(
    provider: &Arc<rustls::crypto::CryptoProvider>,
) -> Result<rustls::ConfigBuilder<rustls::ClientConfig, rustls::WantsVerifier>, Error> {
    rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|e| ssl_error(format!("Failed to set TLS versions: {}", e)))
}

/// Build a ClientConfig that accepts any server certificate.
#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn build_no_verify_config(
    provider: &Arc<rustls::crypto::CryptoProvider>,
    tls_config: &TlsConfig,
) -> Result<rustls::ClientConfig, Error> {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error as RustlsError, SignatureScheme};

    #[derive(Debug)]
    struct NoVerifier(Vec<SignatureScheme>);

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, RustlsError> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, RustlsError> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, RustlsError> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.clone()
        }
    }

    let schemes = provider
        .signature_verification_algorithms
        .supported_schemes();

    let builder = versioned_builder(provider)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier(schemes)));

    add_client_auth(builder, tls_config)
}

/// Build a ClientConfig using the webpki-roots CA bundle.
#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn build_webpki_config(
    provider: &Arc<rustls::crypto::CryptoProvider>,
    tls_config: &TlsConfig,
) -> Result<rustls::ClientConfig, Error> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let builder = versioned_builder(provider)?.with_root_certificates(root_store);
    add_client_auth(builder, tls_config)
}

/// Build a ClientConfig trusting the CA certificates in `ca_path`.
#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn build_custom_ca_config(
    provider: &Arc<rustls::crypto::CryptoProvider>,
    tls_config: &TlsConfig,
    ca_path: &std::path::Path,
) -> Result<rustls::ClientConfig, Error> {
    let certs = load_certs(ca_path, "CA certificate")?;

    let mut root_store = rustls::RootCertStore::empty();
    for cert in certs {
        root_store
            .add(cert)
            .map_err(|e| ssl_error(format!("Failed to add CA certificate: {}", e)))?;
    }

    let builder = versioned_builder(provider)?.with_root_certificates(root_store);
    add_client_auth(builder, tls_config)
}

#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn load_certs(
    path: &std::path::Path,
    what: &str,
) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, Error> {
    use std::fs::File;
    use std::io::BufReader;

    let file = File::open(path)
        .map_err(|e| ssl_error(format!("Failed to open {} '{}': {}", what, path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ssl_error(format!("Failed to parse {}: {}", what, e)))?;

    if certs.is_empty() {
        return Err(ssl_error(format!(
            "No certificates found in {} file '{}'",
            what,
            path.display()
        )));
    }

    Ok(certs)
}

/// Add client authentication if configured.
#[cfg(feature = "tls")]
#[allow(clippy::result_large_err)]
fn add_client_auth(
    builder: rustls::ConfigBuilder<rustls::ClientConfig, rustls::client::WantsClientCert>,
    tls_config: &TlsConfig,
) -> Result<rustls::ClientConfig, Error> {
    use std::fs::File;
    use std::io::BufReader;

    let (Some(cert_path), Some(key_path)) =
        (&tls_config.client_cert_path, &tls_config.client_key_path)
    else {
        return Ok(builder.with_no_client_auth());
    };

    let certs = load_certs(cert_path, "client certificate")?;

    let key_file = File::open(key_path).map_err(|e| {
        ssl_error(format!(
            "Failed to open client key '{}': {}",
            key_path.display(),
            e
        ))
    })?;
    let mut key_reader = BufReader::new(key_file);

    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ssl_error(format!("Failed to parse client key: {}", e)))?
        .ok_or_else(|| ssl_error(format!("No private key found in '{}'", key_path.display())))?;

    builder
        .with_client_auth_cert(certs, key)
        .map_err(|e| ssl_error(format!("Failed to configure client auth: {}", e)))
}

/// Error returned for any TLS upgrade when the `tls` feature is disabled.
#[cfg(not(feature = "tls"))]
pub(crate) fn tls_unavailable() -> Error {
    ssl_error(
        "TLS support requires the 'tls' feature. \
         Add `mywire = { features = [\"tls\"] }` to your Cargo.toml.",
    )
}
