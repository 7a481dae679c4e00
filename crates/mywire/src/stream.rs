//! Byte transports a connection runs over.
//!
//! [`Transport`] is what the protocol engine needs from a socket: blocking
//! `Read` + `Write`, plus an in-place TLS upgrade. [`MySqlStream`] is the
//! real implementation over TCP or a Unix-domain socket; tests drive the
//! engine with scripted in-memory transports.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use mywire_core::Error;
use mywire_core::error::{ConnectionError, ConnectionErrorKind};

use crate::config::MySqlConfig;
#[cfg(not(feature = "tls"))]
use crate::tls::tls_unavailable;
#[cfg(feature = "tls")]
use crate::tls::TlsStream;

/// A blocking byte stream the protocol engine can drive.
pub trait Transport: Read + Write {
    /// Replace the plaintext stream with a TLS session on the same socket.
    ///
    /// Called right after the SSL request has been written.
    #[allow(clippy::result_large_err)]
    fn upgrade_to_tls(&mut self, config: &MySqlConfig) -> Result<(), Error> {
        let _ = config;
        Err(crate::protocol::ssl_error(
            "This transport does not support TLS",
        ))
    }

    /// Whether [`upgrade_to_tls`](Self::upgrade_to_tls) can succeed at all.
    ///
    /// `SslMode::Preferred` stays in plaintext when this is false.
    fn supports_tls(&self) -> bool {
        false
    }

    /// Close the underlying socket. Errors are ignored.
    fn shutdown(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn upgrade_to_tls(&mut self, config: &MySqlConfig) -> Result<(), Error> {
        (**self).upgrade_to_tls(config)
    }

    fn supports_tls(&self) -> bool {
        (**self).supports_tls()
    }

    fn shutdown(&mut self) {
        (**self).shutdown();
    }
}

/// An unencrypted socket.
#[derive(Debug)]
pub enum PlainStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl PlainStream {
    fn shutdown(&self) {
        match self {
            PlainStream::Tcp(s) => s.shutdown(Shutdown::Both).ok(),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.shutdown(Shutdown::Both).ok(),
        };
    }
}

impl Read for PlainStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PlainStream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for PlainStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            PlainStream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            PlainStream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.flush(),
        }
    }
}

/// The socket owned by a [`MySqlConnection`](crate::MySqlConnection).
#[derive(Debug)]
pub enum MySqlStream {
    Plain(PlainStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<PlainStream>>),
    Closed,
}

impl MySqlStream {
    /// Open the socket described by `config`.
    ///
    /// A configured socket path wins over host/port. Read and write
    /// deadlines come from the configuration.
    #[allow(clippy::result_large_err)]
    pub fn connect(config: &MySqlConfig) -> Result<Self, Error> {
        if let Some(path) = &config.socket {
            return Self::connect_unix(config, path);
        }

        let target = config.socket_addr();
        let addrs = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| {
                connect_error(
                    ConnectionErrorKind::Connect,
                    format!("Failed to resolve {}: {}", target, e),
                    e,
                )
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    stream.set_read_timeout(config.read_timeout).ok();
                    stream.set_write_timeout(config.write_timeout).ok();
                    tracing::debug!(addr = %addr, "TCP connection established");
                    return Ok(MySqlStream::Plain(PlainStream::Tcp(stream)));
                }
                Err(e) => {
                    tracing::trace!(addr = %addr, error = %e, "TCP connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => {
                let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
                    ConnectionErrorKind::Refused
                } else {
                    ConnectionErrorKind::Connect
                };
                connect_error(kind, format!("Failed to connect to {}: {}", target, e), e)
            }
            None => Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("No addresses found for {}", target),
                source: None,
            }),
        })
    }

    #[cfg(unix)]
    #[allow(clippy::result_large_err)]
    fn connect_unix(config: &MySqlConfig, path: &std::path::Path) -> Result<Self, Error> {
        let stream = UnixStream::connect(path).map_err(|e| {
            let kind = if matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) {
                ConnectionErrorKind::Refused
            } else {
                ConnectionErrorKind::Connect
            };
            connect_error(
                kind,
                format!("Failed to connect to {}: {}", path.display(), e),
                e,
            )
        })?;
        stream.set_read_timeout(config.read_timeout).ok();
        stream.set_write_timeout(config.write_timeout).ok();
        tracing::debug!(path = %path.display(), "Unix socket connection established");
        Ok(MySqlStream::Plain(PlainStream::Unix(stream)))
    }

    #[cfg(not(unix))]
    #[allow(clippy::result_large_err)]
    fn connect_unix(_config: &MySqlConfig, path: &std::path::Path) -> Result<Self, Error> {
        Err(Error::Config(mywire_core::ConfigError {
            message: format!(
                "Unix socket {} is not supported on this platform",
                path.display()
            ),
            source: None,
        }))
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

fn connect_error(kind: ConnectionErrorKind, message: String, source: io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message,
        source: Some(Box::new(source)),
    })
}

impl Read for MySqlStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MySqlStream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            MySqlStream::Tls(s) => s.read(buf),
            MySqlStream::Closed => Err(closed_error()),
        }
    }
}

impl Write for MySqlStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MySqlStream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            MySqlStream::Tls(s) => s.write(buf),
            MySqlStream::Closed => Err(closed_error()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MySqlStream::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            MySqlStream::Tls(s) => s.flush(),
            MySqlStream::Closed => Err(closed_error()),
        }
    }
}

impl Transport for MySqlStream {
    #[cfg(feature = "tls")]
    fn upgrade_to_tls(&mut self, config: &MySqlConfig) -> Result<(), Error> {
        let plain = match std::mem::replace(self, MySqlStream::Closed) {
            MySqlStream::Plain(s) => s,
            other => {
                *self = other;
                return Err(crate::protocol::ssl_error(
                    "TLS upgrade requires a plaintext stream",
                ));
            }
        };

        let tls = TlsStream::new(
            plain,
            &config.tls_config,
            config.tls_server_name(),
            config.ssl_mode,
        )?;
        *self = MySqlStream::Tls(Box::new(tls));
        Ok(())
    }

    #[cfg(not(feature = "tls"))]
    fn upgrade_to_tls(&mut self, _config: &MySqlConfig) -> Result<(), Error> {
        Err(tls_unavailable())
    }

    fn supports_tls(&self) -> bool {
        cfg!(feature = "tls")
    }

    fn shutdown(&mut self) {
        match std::mem::replace(self, MySqlStream::Closed) {
            MySqlStream::Plain(s) => s.shutdown(),
            #[cfg(feature = "tls")]
            MySqlStream::Tls(mut s) => {
                s.send_close_notify();
                s.get_ref().shutdown();
            }
            MySqlStream::Closed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn test_closed_stream_errors() {
        let mut stream = MySqlStream::Closed;
        let mut buf = [0u8; 4];
        assert_eq!(
            stream.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert!(stream.write(b"x").is_err());
        assert_eq!(stream.supports_tls(), cfg!(feature = "tls"));
    }

    #[test]
    fn test_connect_tcp_and_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = MySqlConfig::new()
            .host("127.0.0.1")
            .port(port)
            .read_timeout(Duration::from_secs(1));
        let mut stream = MySqlStream::connect(&config).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        stream.write_all(b"ping").unwrap();
        stream.flush().unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        stream.shutdown();
        assert!(matches!(stream, MySqlStream::Closed));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let config = MySqlConfig::new()
            .host("127.0.0.1")
            .port(port)
            .connect_timeout(Duration::from_secs(1));
        match MySqlStream::connect(&config) {
            Err(Error::Connection(c)) => assert!(matches!(
                c.kind,
                ConnectionErrorKind::Refused | ConnectionErrorKind::Connect
            )),
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_connect_missing_unix_socket() {
        let config = MySqlConfig::new().socket("/nonexistent/mywire/mysqld.sock");
        match MySqlStream::connect(&config) {
            Err(Error::Connection(c)) => assert_eq!(c.kind, ConnectionErrorKind::Refused),
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn test_upgrade_without_tls_feature() {
        let mut stream = MySqlStream::Closed;
        let err = stream.upgrade_to_tls(&MySqlConfig::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ref c) if c.kind == ConnectionErrorKind::Ssl
        ));
    }
}
