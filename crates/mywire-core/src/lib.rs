//! Core types for mywire.
//!
//! This crate holds the pieces shared by the protocol engine and its users:
//!
//! - `Error` taxonomy separating transport, protocol, server and codec failures
//! - `Value` closed union of wire-representable values, with `DateTime`
//! - `Row` and `ColumnInfo` for materialized result rows

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, PolicyError, ProtocolError,
    QueryError, QueryErrorKind, Result, TypeError,
};
pub use row::{ColumnInfo, Row};
pub use value::{DateTime, Value};
