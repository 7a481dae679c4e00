//! MySQL wire protocol implementation.
//!
//! MySQL packets have a 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! Maximum packet payload is 2^24 - 1 (16MB - 1). Larger payloads
//! are split into multiple frames, see [`packet`].

pub mod handshake;
pub mod packet;
pub mod prepared;
pub mod reader;
pub mod writer;

pub use handshake::{Greeting, build_login_packet, build_ssl_request, parse_greeting};
pub use packet::{Packet, read_packet, read_packet_limited, write_packet};
pub use prepared::{
    StmtPrepareOk, build_long_data_packets, build_stmt_close_packet, build_stmt_execute_packet,
    parse_stmt_prepare_ok,
};
pub use reader::PacketReader;
pub use writer::PacketWriter;

use mywire_core::Error;
use mywire_core::error::{
    ConnectionError, ConnectionErrorKind, ProtocolError, QueryError, QueryErrorKind,
};

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Largest chunk sent in one frame for file uploads and long parameter data.
pub const MAX_DATA_CHUNK: usize = 1 << 19;

/// MySQL capability flags (client and server).
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_NO_SCHEMA: u32 = 1 << 4;
    pub const CLIENT_COMPRESS: u32 = 1 << 5;
    pub const CLIENT_ODBC: u32 = 1 << 6;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_IGNORE_SPACE: u32 = 1 << 8;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_INTERACTIVE: u32 = 1 << 10;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_IGNORE_SIGPIPE: u32 = 1 << 12;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_RESERVED: u32 = 1 << 14;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
}

/// MySQL command codes (COM_xxx) issued by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Quit connection
    Quit = 0x01,
    /// Text protocol query
    Query = 0x03,
    /// Ping server
    Ping = 0x0e,
    /// Prepare statement
    StmtPrepare = 0x16,
    /// Execute prepared statement
    StmtExecute = 0x17,
    /// Send long data for prepared statement
    StmtSendLongData = 0x18,
    /// Close prepared statement
    StmtClose = 0x19,
}

/// MySQL server status flags.
#[allow(dead_code)]
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_STATUS_NO_GOOD_INDEX_USED: u16 = 0x0010;
    pub const SERVER_STATUS_NO_INDEX_USED: u16 = 0x0020;
    pub const SERVER_STATUS_CURSOR_EXISTS: u16 = 0x0040;
    pub const SERVER_STATUS_LAST_ROW_SENT: u16 = 0x0080;
    pub const SERVER_STATUS_DB_DROPPED: u16 = 0x0100;
    pub const SERVER_STATUS_NO_BACKSLASH_ESCAPES: u16 = 0x0200;
    pub const SERVER_STATUS_METADATA_CHANGED: u16 = 0x0400;
    pub const SERVER_QUERY_WAS_SLOW: u16 = 0x0800;
    pub const SERVER_PS_OUT_PARAMS: u16 = 0x1000;
}

/// MySQL character set codes.
pub mod charset {
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const BINARY: u8 = 63;

    /// Charset sent in the login packet unless configured otherwise.
    pub const DEFAULT_CHARSET: u8 = UTF8_GENERAL_CI;
}

/// A MySQL packet header.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Total header size in bytes.
    pub const SIZE: usize = 4;

    /// Parse a packet header from 4 bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        let payload_length =
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);
        Self {
            payload_length,
            sequence_id: bytes[3],
        }
    }

    /// Encode the header to 4 bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.payload_length & 0xFF) as u8,
            ((self.payload_length >> 8) & 0xFF) as u8,
            ((self.payload_length >> 16) & 0xFF) as u8,
            self.sequence_id,
        ]
    }
}

/// First response to a command, classified by its leading byte.
#[derive(Debug, Clone)]
pub enum Response {
    /// 0x00: the command completed without a result set
    Ok(OkPacket),
    /// 0xFF: the server rejected the command
    Error(ErrPacket),
    /// 0xFB: the server wants the named client-side file
    LocalInfile(String),
    /// Anything else: a result set with this many columns follows
    ColumnCount(u64),
}

impl Response {
    /// Classify a response payload.
    #[allow(clippy::result_large_err)]
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        match reader.peek() {
            Some(0x00) => reader
                .parse_ok_packet()
                .map(Response::Ok)
                .ok_or_else(|| protocol_error("Malformed OK packet")),
            Some(0xFF) => reader
                .parse_err_packet()
                .map(Response::Error)
                .ok_or_else(|| protocol_error("Malformed ERR packet")),
            Some(0xFB) => {
                reader.skip(1);
                Ok(Response::LocalInfile(reader.read_rest_string()))
            }
            Some(_) => reader
                .read_lenenc_int()
                .map(Response::ColumnCount)
                .ok_or_else(|| protocol_error("Malformed column count")),
            None => Err(protocol_error("Empty response packet")),
        }
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    /// Number of affected rows
    pub affected_rows: u64,
    /// Last insert ID
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Number of warnings
    pub warnings: u16,
    /// Info string (if any)
    pub info: String,
}

/// Parsed Error packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// Error code
    pub error_code: u16,
    /// SQL state (5 characters)
    pub sql_state: String,
    /// Error message
    pub error_message: String,
}

impl ErrPacket {
    /// Coarse classification of the server error code.
    pub fn kind(&self) -> QueryErrorKind {
        match self.error_code {
            1062 | 1451 | 1452 | 1048 | 1216 | 1217 | 1557 | 3819 => QueryErrorKind::Constraint,
            1064 | 1149 => QueryErrorKind::Syntax,
            1049 | 1051 | 1054 | 1146 => QueryErrorKind::NotFound,
            1044 | 1045 | 1142 | 1143 | 1227 => QueryErrorKind::Permission,
            1264 | 1265 | 1406 => QueryErrorKind::DataTruncation,
            1205 | 1213 => QueryErrorKind::Deadlock,
            _ => QueryErrorKind::Database,
        }
    }

    /// Convert into the error surfaced to callers.
    pub fn into_query_error(self, sql: Option<&str>) -> QueryError {
        QueryError {
            kind: self.kind(),
            code: Some(self.error_code),
            sqlstate: (!self.sql_state.is_empty()).then_some(self.sql_state),
            message: self.error_message,
            sql: sql.map(str::to_string),
        }
    }
}

/// Parsed EOF packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    /// Number of warnings
    pub warnings: u16,
    /// Server status flags
    pub status_flags: u16,
}

/// Check whether a payload is an EOF marker rather than a data row.
///
/// A row may legitimately start with 0xFE (a lenenc integer prefix), so only
/// short payloads count as EOF.
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFE) && payload.len() <= 8
}

// Helper functions for creating errors

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

pub(crate) fn protocol_error_with_data(msg: impl Into<String>, data: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: Some(data.to_vec()),
        source: None,
    })
}

pub(crate) fn auth_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Authentication,
        message: msg.into(),
        source: None,
    })
}

pub(crate) fn ssl_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Ssl,
        message: msg.into(),
        source: None,
    })
}

pub(crate) fn disconnected_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: msg.into(),
        source: None,
    })
}
