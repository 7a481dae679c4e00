//! MySQL prepared statement (binary protocol) payloads.
//!
//! This module builds the payloads for COM_STMT_PREPARE, COM_STMT_EXECUTE,
//! COM_STMT_SEND_LONG_DATA and COM_STMT_CLOSE, and parses the prepare
//! response header.
//!
//! # Protocol Flow
//!
//! 1. **Prepare**: Client sends COM_STMT_PREPARE with SQL
//!    - Server returns statement ID, param count, column count
//!    - Server sends param column definitions (if any), then EOF
//!    - Server sends result column definitions (if any), then EOF
//!
//! 2. **Execute**: Client streams oversized string/blob arguments with
//!    COM_STMT_SEND_LONG_DATA (no response), then sends COM_STMT_EXECUTE
//!    with statement ID + binary params
//!    - Server returns result set (binary protocol) or OK packet
//!
//! 3. **Close**: Client sends COM_STMT_CLOSE with statement ID
//!    - No server response

#![allow(clippy::cast_possible_truncation)]

use mywire_core::{Error, Value};

use super::{Command, MAX_DATA_CHUNK, PacketReader, PacketWriter, protocol_error};
use crate::types::{encode_binary_value, param_null_bitmap, param_type};

/// Response header from COM_STMT_PREPARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtPrepareOk {
    /// Unique statement identifier (used in execute/close)
    pub statement_id: u32,
    /// Number of columns in result set (0 for non-SELECT)
    pub num_columns: u16,
    /// Number of parameters (placeholders) in the SQL
    pub num_params: u16,
    /// Number of warnings generated during prepare
    pub warnings: u16,
}

/// Parse a COM_STMT_PREPARE_OK header.
///
/// Layout: 0x00, statement_id u32, num_columns u16, num_params u16,
/// reserved u8, warnings u16.
#[allow(clippy::result_large_err)]
pub fn parse_stmt_prepare_ok(data: &[u8]) -> Result<StmtPrepareOk, Error> {
    let mut reader = PacketReader::new(data);

    if reader.read_u8() != Some(0x00) {
        return Err(protocol_error("Prepare response does not start with 0x00"));
    }

    let statement_id = reader
        .read_u32_le()
        .ok_or_else(|| protocol_error("Missing statement ID"))?;
    let num_columns = reader
        .read_u16_le()
        .ok_or_else(|| protocol_error("Missing column count"))?;
    let num_params = reader
        .read_u16_le()
        .ok_or_else(|| protocol_error("Missing parameter count"))?;

    // Reserved filler, then warnings (absent from some old servers)
    reader.skip(1);
    let warnings = reader.read_u16_le().unwrap_or(0);

    Ok(StmtPrepareOk {
        statement_id,
        num_columns,
        num_params,
        warnings,
    })
}

/// Whether a parameter is sent through COM_STMT_SEND_LONG_DATA.
pub fn is_long_data(value: &Value) -> bool {
    match value {
        Value::Text(s) => s.len() > MAX_DATA_CHUNK,
        Value::Bytes(b) => b.len() > MAX_DATA_CHUNK,
        _ => false,
    }
}

/// Build COM_STMT_SEND_LONG_DATA payloads for every oversized parameter.
///
/// Each payload carries at most `MAX_DATA_CHUNK` bytes of one parameter.
/// The server never answers these, so each is its own exchange at seq 0.
pub fn build_long_data_packets(statement_id: u32, params: &[Value]) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();

    for (index, param) in params.iter().enumerate() {
        if !is_long_data(param) {
            continue;
        }
        let data: &[u8] = match param {
            Value::Text(s) => s.as_bytes(),
            Value::Bytes(b) => b,
            _ => continue,
        };

        for chunk in data.chunks(MAX_DATA_CHUNK) {
            let mut writer = PacketWriter::with_capacity(7 + chunk.len());
            writer.write_u8(Command::StmtSendLongData as u8);
            writer.write_u32_le(statement_id);
            writer.write_u16_le(index as u16);
            writer.write_bytes(chunk);
            packets.push(writer.into_bytes());
        }
    }

    packets
}

/// Build a COM_STMT_EXECUTE payload.
///
/// # Binary Protocol Parameter Encoding
///
/// - Command byte (0x17)
/// - Statement ID (4 bytes, little-endian)
/// - Flags (1 byte): 0x00 = no cursor
/// - Iteration count (4 bytes, always 1)
/// - NULL bitmap ((n + 7) / 8 bytes, if n > 0)
/// - New params bound flag (1 byte, always 1)
/// - Parameter types (2 bytes each, high byte 0x80 for unsigned)
/// - Parameter values, skipping NULLs and long data already streamed
#[allow(clippy::result_large_err)]
pub fn build_stmt_execute_packet(statement_id: u32, params: &[Value]) -> Result<Vec<u8>, Error> {
    let mut writer = PacketWriter::with_capacity(64 + params.len() * 16);

    writer.write_u8(Command::StmtExecute as u8);
    writer.write_u32_le(statement_id);
    // CURSOR_TYPE_NO_CURSOR
    writer.write_u8(0x00);
    writer.write_u32_le(1);

    if !params.is_empty() {
        writer.write_bytes(&param_null_bitmap(params));
        writer.write_u8(1);

        for param in params {
            let (field_type, unsigned) = param_type(param);
            writer.write_u8(field_type as u8);
            writer.write_u8(if unsigned { 0x80 } else { 0x00 });
        }

        for param in params {
            if !param.is_null() && !is_long_data(param) {
                encode_binary_value(&mut writer, param)?;
            }
        }
    }

    Ok(writer.into_bytes())
}

/// Build a COM_STMT_CLOSE payload.
pub fn build_stmt_close_packet(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(5);
    writer.write_u8(Command::StmtClose as u8);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}
