//! Synchronous MySQL client wire protocol engine.
//!
//! This crate speaks the MySQL client/server protocol over a blocking
//! socket. It provides:
//!
//! - Packet framing with sequence numbers and multi-frame reassembly
//! - Handshake with `mysql_native_password` and optional TLS upgrade
//! - Text (COM_QUERY) and binary (prepared statement) query protocols
//! - Streamed LOAD DATA LOCAL INFILE uploads, off by default
//! - Conversion between wire values and [`Value`]
//!
//! # MySQL Protocol Overview
//!
//! MySQL uses a packet-based protocol with:
//! - 3-byte payload length + 1-byte sequence number header
//! - Payloads of 16MB or more split across frames
//! - Request/response pairing via sequence numbers
//!
//! # Example
//!
//! ```rust,no_run
//! use mywire::{MySqlConfig, MySqlConnection, Value};
//!
//! # fn main() -> Result<(), mywire::Error> {
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("mydb");
//!
//! let mut conn = MySqlConnection::connect(config)?;
//!
//! let stmt = conn.prepare("INSERT INTO t VALUES (?, ?)")?;
//! let result = conn.execute_statement(&stmt, &[Value::Int(42), Value::from("hello")])?;
//! println!("inserted {} rows", result.rows_affected);
//! conn.close_statement(stmt)?;
//!
//! for row in conn.query("SELECT id, name FROM t")? {
//!     let row = row?;
//!     let id: i64 = row.get_named("id")?;
//!     println!("{}", id);
//! }
//!
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
mod infile;
pub mod protocol;
pub mod result;
pub mod statement;
pub mod stream;
pub mod tls;
pub mod types;

pub use config::{DEFAULT_SOCKET_PATH, MySqlConfig, SslMode, TlsConfig};
pub use connection::{ConnectionState, MySqlConnection, ServerInfo};
pub use result::{ResultSet, RowFormat, WriteResult};
pub use statement::Statement;
pub use stream::{MySqlStream, PlainStream, Transport};
pub use types::{ColumnDef, FieldType};

pub use mywire_core::{
    ColumnInfo, ConnectionErrorKind, DateTime, Error, QueryErrorKind, Result, Row, Value,
};
