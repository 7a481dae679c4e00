//! MySQL type system and value codec.
//!
//! This module provides:
//! - MySQL field type codes and column flags
//! - Column definition parsing
//! - Decoding of text and binary result values into [`Value`]
//! - Encoding of [`Value`] parameters for `COM_STMT_EXECUTE`
//!
//! # MySQL Type System
//!
//! MySQL uses field type codes in result sets and binary protocol.
//! The encoding differs between text protocol (all strings) and
//! binary protocol (type-specific binary encoding). The type code and
//! the column's UNSIGNED flag together decide the decoded variant.

#![allow(clippy::cast_possible_truncation)]

use mywire_core::error::TypeError;
use mywire_core::{DateTime, Error, Value};

use crate::protocol::{PacketReader, PacketWriter, charset, protocol_error};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// MySQL field type codes.
///
/// These are the `MYSQL_TYPE_*` constants from the MySQL C API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    /// DECIMAL (MYSQL_TYPE_DECIMAL)
    Decimal = 0x00,
    /// TINYINT (MYSQL_TYPE_TINY)
    Tiny = 0x01,
    /// SMALLINT (MYSQL_TYPE_SHORT)
    Short = 0x02,
    /// INT (MYSQL_TYPE_LONG)
    Long = 0x03,
    /// FLOAT (MYSQL_TYPE_FLOAT)
    Float = 0x04,
    /// DOUBLE (MYSQL_TYPE_DOUBLE)
    Double = 0x05,
    /// NULL (MYSQL_TYPE_NULL)
    Null = 0x06,
    /// TIMESTAMP (MYSQL_TYPE_TIMESTAMP)
    Timestamp = 0x07,
    /// BIGINT (MYSQL_TYPE_LONGLONG)
    LongLong = 0x08,
    /// MEDIUMINT (MYSQL_TYPE_INT24)
    Int24 = 0x09,
    /// DATE (MYSQL_TYPE_DATE)
    Date = 0x0A,
    /// TIME (MYSQL_TYPE_TIME)
    Time = 0x0B,
    /// DATETIME (MYSQL_TYPE_DATETIME)
    DateTime = 0x0C,
    /// YEAR (MYSQL_TYPE_YEAR)
    Year = 0x0D,
    /// NEWDATE (MYSQL_TYPE_NEWDATE) - internal use
    NewDate = 0x0E,
    /// VARCHAR (MYSQL_TYPE_VARCHAR)
    VarChar = 0x0F,
    /// BIT (MYSQL_TYPE_BIT)
    Bit = 0x10,
    /// JSON (MYSQL_TYPE_JSON) - MySQL 5.7.8+
    Json = 0xF5,
    /// NEWDECIMAL (MYSQL_TYPE_NEWDECIMAL)
    NewDecimal = 0xF6,
    /// ENUM (MYSQL_TYPE_ENUM)
    Enum = 0xF7,
    /// SET (MYSQL_TYPE_SET)
    Set = 0xF8,
    /// TINYBLOB (MYSQL_TYPE_TINY_BLOB)
    TinyBlob = 0xF9,
    /// MEDIUMBLOB (MYSQL_TYPE_MEDIUM_BLOB)
    MediumBlob = 0xFA,
    /// LONGBLOB (MYSQL_TYPE_LONG_BLOB)
    LongBlob = 0xFB,
    /// BLOB (MYSQL_TYPE_BLOB)
    Blob = 0xFC,
    /// VARCHAR (MYSQL_TYPE_VAR_STRING)
    VarString = 0xFD,
    /// CHAR (MYSQL_TYPE_STRING)
    String = 0xFE,
    /// GEOMETRY (MYSQL_TYPE_GEOMETRY)
    Geometry = 0xFF,
}

impl FieldType {
    /// Parse a field type from a byte.
    ///
    /// Returns `None` for codes the server never sends to clients.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let field_type = match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            _ => return None,
        };
        Some(field_type)
    }

    /// Check if this is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Tiny
                | FieldType::Short
                | FieldType::Long
                | FieldType::LongLong
                | FieldType::Int24
                | FieldType::Year
        )
    }


    /// Types whose binary encoding is a length-encoded byte string.
    #[must_use]
    pub const fn is_length_encoded(self) -> bool {
        matches!(
            self,
            FieldType::Decimal
                | FieldType::NewDecimal
                | FieldType::VarChar
                | FieldType::Bit
                | FieldType::Json
                | FieldType::Enum
                | FieldType::Set
                | FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::VarString
                | FieldType::String
                | FieldType::Geometry
        )
    }

    /// Get the type name as a string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Decimal => "DECIMAL",
            FieldType::Tiny => "TINYINT",
            FieldType::Short => "SMALLINT",
            FieldType::Long => "INT",
            FieldType::Float => "FLOAT",
            FieldType::Double => "DOUBLE",
            FieldType::Null => "NULL",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::LongLong => "BIGINT",
            FieldType::Int24 => "MEDIUMINT",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
            FieldType::Year => "YEAR",
            FieldType::NewDate => "DATE",
            FieldType::VarChar => "VARCHAR",
            FieldType::Bit => "BIT",
            FieldType::Json => "JSON",
            FieldType::NewDecimal => "DECIMAL",
            FieldType::Enum => "ENUM",
            FieldType::Set => "SET",
            FieldType::TinyBlob => "TINYBLOB",
            FieldType::MediumBlob => "MEDIUMBLOB",
            FieldType::LongBlob => "LONGBLOB",
            FieldType::Blob => "BLOB",
            FieldType::VarString => "VARCHAR",
            FieldType::String => "CHAR",
            FieldType::Geometry => "GEOMETRY",
        }
    }
}

/// Column flags in result set metadata.
#[allow(dead_code)]
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
    pub const NO_DEFAULT_VALUE: u16 = 4096;
    pub const ON_UPDATE_NOW: u16 = 8192;
    pub const NUM: u16 = 32768;
}

/// Column definition from a result set or prepare response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Catalog name (always "def")
    pub catalog: String,
    /// Schema (database) name
    pub schema: String,
    /// Table name (or alias)
    pub table: String,
    /// Original table name
    pub org_table: String,
    /// Column name (or alias)
    pub name: String,
    /// Original column name
    pub org_name: String,
    /// Character set number
    pub charset: u16,
    /// Column length
    pub column_length: u32,
    /// Raw wire type code
    pub column_type: u8,
    /// Column flags
    pub flags: u16,
    /// Number of decimals
    pub decimals: u8,
}

impl ColumnDef {
    /// Parse a column definition packet (protocol 4.1).
    #[allow(clippy::result_large_err)]
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        let mut field = |what: &str| {
            reader
                .read_lenenc_string()
                .ok_or_else(|| protocol_error(format!("Missing {} in column definition", what)))
        };

        let catalog = field("catalog")?;
        let schema = field("schema")?;
        let table = field("table")?;
        let org_table = field("org_table")?;
        let name = field("name")?;
        let org_name = field("org_name")?;

        // Length of the fixed-size fields that follow (always 0x0c)
        reader
            .read_lenenc_int()
            .ok_or_else(|| protocol_error("Missing fixed-length marker in column definition"))?;

        let charset = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing charset in column definition"))?;
        let column_length = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("Missing length in column definition"))?;
        let column_type = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing type in column definition"))?;
        let flags = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing flags in column definition"))?;
        let decimals = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing decimals in column definition"))?;

        Ok(Self {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }

    /// Decoded type code, if it is one clients can receive.
    #[must_use]
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::from_u8(self.column_type)
    }

    /// Check if the column is NOT NULL.
    #[must_use]
    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    /// Check if the column is a primary key.
    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.flags & column_flags::PRIMARY_KEY != 0
    }

    /// Check if the column is unsigned.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Check if the column is auto-increment.
    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        self.flags & column_flags::AUTO_INCREMENT != 0
    }

    /// Check if the column uses the binary character set.
    #[must_use]
    pub const fn is_binary_charset(&self) -> bool {
        self.charset == charset::BINARY as u16
    }

    fn type_error(&self, expected: &'static str, actual: String) -> Error {
        Error::Type(TypeError {
            expected,
            actual,
            column: Some(self.name.clone()),
            rust_type: None,
        })
    }

    fn unknown_type_error(&self) -> Error {
        self.type_error(
            "a known column type",
            format!("type code 0x{:02x}", self.column_type),
        )
    }
}

// ============================================================================
// Text protocol
// ============================================================================

/// Decode a text protocol value.
///
/// In text protocol, all values are transmitted as strings; the column type
/// decides how the string is parsed. NULLs never reach this function.
#[allow(clippy::result_large_err)]
pub fn decode_text_value(column: &ColumnDef, data: &[u8]) -> Result<Value, Error> {
    let Some(field_type) = column.field_type() else {
        return Ok(string_value(column, data));
    };

    if field_type.is_integer() || matches!(field_type, FieldType::Float | FieldType::Double) {
        let text = std::str::from_utf8(data)
            .map_err(|_| column.type_error(field_type.name(), format!("{:?}", data)))?;
        return parse_text_number(column, field_type, text.trim());
    }

    match field_type {
        FieldType::Decimal | FieldType::NewDecimal => {
            Ok(Value::Decimal(String::from_utf8_lossy(data).into_owned()))
        }
        FieldType::Date | FieldType::NewDate | FieldType::DateTime | FieldType::Timestamp => {
            let text = String::from_utf8_lossy(data);
            parse_datetime(&text)
                .map(Value::DateTime)
                .ok_or_else(|| column.type_error(field_type.name(), format!("'{}'", text)))
        }
        FieldType::Time => {
            let text = String::from_utf8_lossy(data);
            parse_time(&text)
                .map(Value::Duration)
                .ok_or_else(|| column.type_error("TIME", format!("'{}'", text)))
        }
        _ => Ok(string_value(column, data)),
    }
}

#[allow(clippy::result_large_err)]
fn parse_text_number(column: &ColumnDef, field_type: FieldType, text: &str) -> Result<Value, Error> {
    let unsigned = column.is_unsigned();
    let parsed = match (field_type, unsigned) {
        (FieldType::Tiny, false) => text.parse().ok().map(Value::TinyInt),
        (FieldType::Tiny, true) => text.parse().ok().map(Value::UTinyInt),
        (FieldType::Short | FieldType::Year, false) => text.parse().ok().map(Value::SmallInt),
        (FieldType::Short | FieldType::Year, true) => text.parse().ok().map(Value::USmallInt),
        (FieldType::Long | FieldType::Int24, false) => text.parse().ok().map(Value::Int),
        (FieldType::Long | FieldType::Int24, true) => text.parse().ok().map(Value::UInt),
        (FieldType::LongLong, false) => text.parse().ok().map(Value::BigInt),
        (FieldType::LongLong, true) => text.parse().ok().map(Value::UBigInt),
        (FieldType::Float, _) => text.parse().ok().map(Value::Float),
        (FieldType::Double, _) => text.parse().ok().map(Value::Double),
        _ => None,
    };
    parsed.ok_or_else(|| column.type_error(field_type.name(), format!("'{}'", text)))
}

/// Strings: bytes for the binary charset, text otherwise (bytes again when
/// the server sent invalid UTF-8).
fn string_value(column: &ColumnDef, data: &[u8]) -> Value {
    if column.is_binary_charset() {
        return Value::Bytes(data.to_vec());
    }
    match std::str::from_utf8(data) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Bytes(data.to_vec()),
    }
}

/// Parse `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
///
/// The all-zero date parses to [`DateTime::ZERO`].
pub fn parse_datetime(text: &str) -> Option<DateTime> {
    let (date, time) = match text.split_once([' ', 'T']) {
        Some((d, t)) => (d, Some(t)),
        None => (text, None),
    };

    let mut parts = date.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;

    let mut value = DateTime::date(year, month, day);
    if let Some(time) = time {
        let (whole, nanos) = split_fraction(time)?;
        let mut parts = whole.splitn(3, ':');
        value.hour = parts.next()?.parse().ok()?;
        value.minute = parts.next()?.parse().ok()?;
        value.second = parts.next()?.parse().ok()?;
        value.nanosecond = nanos;
    }
    Some(value)
}

/// Parse `[-]H:MM:SS[.ffffff]` into signed nanoseconds; hours may exceed 24.
pub fn parse_time(text: &str) -> Option<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, nanos) = split_fraction(body)?;

    let mut parts = whole.splitn(3, ':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;

    let total = hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(NANOS_PER_SEC)?
        .checked_add(i64::from(nanos))?;
    Some(if negative { -total } else { total })
}

/// Split off a `.ffffff` suffix, returning the fraction in nanoseconds.
fn split_fraction(text: &str) -> Option<(&str, u32)> {
    let Some((whole, frac)) = text.split_once('.') else {
        return Some((text, 0));
    };
    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: u32 = frac.parse().ok()?;
    Some((whole, digits * 10u32.pow(9 - frac.len() as u32)))
}

// ============================================================================
// Binary protocol
// ============================================================================

/// Decode one non-NULL binary protocol value, advancing `reader` past it.
#[allow(clippy::result_large_err)]
pub fn decode_binary_value(column: &ColumnDef, reader: &mut PacketReader<'_>) -> Result<Value, Error> {
    let field_type = column.field_type().ok_or_else(|| column.unknown_type_error())?;
    let unsigned = column.is_unsigned();
    let truncated = || protocol_error(format!("Truncated value for column '{}'", column.name));

    let value = match field_type {
        FieldType::Tiny => {
            let b = reader.read_u8().ok_or_else(truncated)?;
            if unsigned {
                Value::UTinyInt(b)
            } else {
                Value::TinyInt(b as i8)
            }
        }
        FieldType::Short | FieldType::Year => {
            let v = reader.read_u16_le().ok_or_else(truncated)?;
            if unsigned {
                Value::USmallInt(v)
            } else {
                Value::SmallInt(v as i16)
            }
        }
        FieldType::Long => {
            let v = reader.read_u32_le().ok_or_else(truncated)?;
            if unsigned {
                Value::UInt(v)
            } else {
                Value::Int(v as i32)
            }
        }
        FieldType::Int24 => {
            // Sent as 4 bytes; only the low 24 bits are significant.
            let v = reader.read_u32_le().ok_or_else(truncated)? & 0x00FF_FFFF;
            if unsigned {
                Value::UInt(v)
            } else {
                Value::Int(((v << 8) as i32) >> 8)
            }
        }
        FieldType::LongLong => {
            let v = reader.read_u64_le().ok_or_else(truncated)?;
            if unsigned {
                Value::UBigInt(v)
            } else {
                Value::BigInt(v as i64)
            }
        }
        FieldType::Float => {
            let bits = reader.read_u32_le().ok_or_else(truncated)?;
            Value::Float(f32::from_bits(bits))
        }
        FieldType::Double => {
            let bits = reader.read_u64_le().ok_or_else(truncated)?;
            Value::Double(f64::from_bits(bits))
        }
        FieldType::Date | FieldType::NewDate | FieldType::DateTime | FieldType::Timestamp => {
            Value::DateTime(decode_binary_datetime(column, reader)?)
        }
        FieldType::Time => Value::Duration(decode_binary_time(column, reader)?),
        FieldType::Decimal | FieldType::NewDecimal => {
            let data = reader.read_lenenc_slice().ok_or_else(truncated)?;
            Value::Decimal(String::from_utf8_lossy(data).into_owned())
        }
        t if t.is_length_encoded() => {
            let data = reader.read_lenenc_slice().ok_or_else(truncated)?;
            string_value(column, data)
        }
        _ => return Err(column.unknown_type_error()),
    };

    Ok(value)
}

#[allow(clippy::result_large_err)]
fn decode_binary_datetime(column: &ColumnDef, reader: &mut PacketReader<'_>) -> Result<DateTime, Error> {
    let truncated = || protocol_error(format!("Truncated date for column '{}'", column.name));
    let len = reader.read_u8().ok_or_else(truncated)?;
    if !matches!(len, 0 | 4 | 7 | 11) {
        return Err(column.type_error("date length 0, 4, 7 or 11", len.to_string()));
    }

    let mut value = DateTime::ZERO;
    if len >= 4 {
        value.year = reader.read_u16_le().ok_or_else(truncated)?;
        value.month = reader.read_u8().ok_or_else(truncated)?;
        value.day = reader.read_u8().ok_or_else(truncated)?;
    }
    if len >= 7 {
        value.hour = reader.read_u8().ok_or_else(truncated)?;
        value.minute = reader.read_u8().ok_or_else(truncated)?;
        value.second = reader.read_u8().ok_or_else(truncated)?;
    }
    if len == 11 {
        let micros = reader.read_u32_le().ok_or_else(truncated)?;
        value.nanosecond = micros.saturating_mul(1000);
    }
    Ok(value)
}

#[allow(clippy::result_large_err)]
fn decode_binary_time(column: &ColumnDef, reader: &mut PacketReader<'_>) -> Result<i64, Error> {
    let truncated = || protocol_error(format!("Truncated time for column '{}'", column.name));
    let len = reader.read_u8().ok_or_else(truncated)?;
    if len == 0 {
        return Ok(0);
    }
    if !matches!(len, 8 | 12) {
        return Err(column.type_error("time length 0, 8 or 12", len.to_string()));
    }

    let negative = reader.read_u8().ok_or_else(truncated)? != 0;
    let days = i64::from(reader.read_u32_le().ok_or_else(truncated)?);
    let hours = i64::from(reader.read_u8().ok_or_else(truncated)?);
    let minutes = i64::from(reader.read_u8().ok_or_else(truncated)?);
    let seconds = i64::from(reader.read_u8().ok_or_else(truncated)?);
    let micros = if len == 12 {
        i64::from(reader.read_u32_le().ok_or_else(truncated)?)
    } else {
        0
    };

    let total = days
        .checked_mul(24)
        .and_then(|h| h.checked_add(hours))
        .and_then(|h| h.checked_mul(60))
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_mul(NANOS_PER_SEC))
        .and_then(|ns| ns.checked_add(micros * 1000))
        .ok_or_else(|| {
            column.type_error(
                "TIME within range",
                format!("{} days {:02}:{:02}:{:02}", days, hours, minutes, seconds),
            )
        })?;
    Ok(if negative { -total } else { total })
}

/// Wire type code and unsigned flag announced for a parameter.
#[must_use]
pub fn param_type(value: &Value) -> (FieldType, bool) {
    match value {
        Value::Null => (FieldType::Null, false),
        Value::Bool(_) | Value::TinyInt(_) => (FieldType::Tiny, false),
        Value::UTinyInt(_) => (FieldType::Tiny, true),
        Value::SmallInt(_) => (FieldType::Short, false),
        Value::USmallInt(_) => (FieldType::Short, true),
        Value::Int(_) => (FieldType::Long, false),
        Value::UInt(_) => (FieldType::Long, true),
        Value::BigInt(_) => (FieldType::LongLong, false),
        Value::UBigInt(_) => (FieldType::LongLong, true),
        Value::Float(_) => (FieldType::Float, false),
        Value::Double(_) => (FieldType::Double, false),
        Value::Decimal(_) => (FieldType::NewDecimal, false),
        Value::Text(_) => (FieldType::String, false),
        Value::Bytes(_) => (FieldType::Blob, false),
        Value::DateTime(_) => (FieldType::DateTime, false),
        Value::Duration(_) => (FieldType::Time, false),
    }
}

/// Append the binary encoding of a non-NULL parameter.
///
/// Sub-second parts of dates and durations are not sent.
#[allow(clippy::result_large_err)]
pub fn encode_binary_value(writer: &mut PacketWriter, value: &Value) -> Result<(), Error> {
    match value {
        Value::Null => {}
        Value::Bool(b) => writer.write_u8(u8::from(*b)),
        Value::TinyInt(v) => writer.write_u8(*v as u8),
        Value::UTinyInt(v) => writer.write_u8(*v),
        Value::SmallInt(v) => writer.write_u16_le(*v as u16),
        Value::USmallInt(v) => writer.write_u16_le(*v),
        Value::Int(v) => writer.write_u32_le(*v as u32),
        Value::UInt(v) => writer.write_u32_le(*v),
        Value::BigInt(v) => writer.write_u64_le(*v as u64),
        Value::UBigInt(v) => writer.write_u64_le(*v),
        Value::Float(v) => writer.write_u32_le(v.to_bits()),
        Value::Double(v) => writer.write_u64_le(v.to_bits()),
        Value::Decimal(s) | Value::Text(s) => writer.write_lenenc_string(s),
        Value::Bytes(b) => writer.write_lenenc_bytes(b),
        Value::DateTime(dt) => {
            if !dt.is_valid() {
                return Err(Error::Type(TypeError {
                    expected: "DATETIME within calendar range",
                    actual: dt.to_string(),
                    column: None,
                    rust_type: None,
                }));
            }
            if dt.is_zero() {
                writer.write_u8(0);
            } else {
                writer.write_u8(7);
                writer.write_u16_le(dt.year);
                writer.write_u8(dt.month);
                writer.write_u8(dt.day);
                writer.write_u8(dt.hour);
                writer.write_u8(dt.minute);
                writer.write_u8(dt.second);
            }
        }
        Value::Duration(nanos) => {
            let secs = (nanos / NANOS_PER_SEC).unsigned_abs();
            let days = u32::try_from(secs / 86_400).map_err(|_| {
                Error::Type(TypeError {
                    expected: "TIME within range",
                    actual: format!("{} ns", nanos),
                    column: None,
                    rust_type: None,
                })
            })?;
            let rem = secs % 86_400;
            writer.write_u8(8);
            writer.write_u8(u8::from(*nanos < 0));
            writer.write_u32_le(days);
            writer.write_u8((rem / 3600) as u8);
            writer.write_u8((rem / 60 % 60) as u8);
            writer.write_u8((rem % 60) as u8);
        }
    }
    Ok(())
}

// ============================================================================
// NULL bitmaps
// ============================================================================

/// Bytes needed for a NULL bitmap covering `count` entries after `offset`
/// reserved bits.
#[must_use]
pub const fn null_bitmap_len(count: usize, offset: usize) -> usize {
    (count + offset).div_ceil(8)
}

/// Test entry `index` of a NULL bitmap with `offset` reserved leading bits.
#[must_use]
pub fn is_null_in_bitmap(bitmap: &[u8], index: usize, offset: usize) -> bool {
    let bit = index + offset;
    bitmap
        .get(bit / 8)
        .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
}

/// NULL bitmap for execute parameters (no reserved bits).
#[must_use]
pub fn param_null_bitmap(params: &[Value]) -> Vec<u8> {
    let mut bitmap = vec![0u8; null_bitmap_len(params.len(), 0)];
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    bitmap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, field_type: FieldType, flags: u16, charset: u16) -> ColumnDef {
        ColumnDef {
            catalog: "def".to_string(),
            schema: "test".to_string(),
            table: "t".to_string(),
            org_table: "t".to_string(),
            name: name.to_string(),
            org_name: name.to_string(),
            charset,
            column_length: 11,
            column_type: field_type as u8,
            flags,
            decimals: 0,
        }
    }

    fn col(field_type: FieldType) -> ColumnDef {
        column("c", field_type, 0, 33)
    }

    fn unsigned(field_type: FieldType) -> ColumnDef {
        column("c", field_type, column_flags::UNSIGNED, 63)
    }

    fn roundtrip(value: Value) -> Value {
        let (field_type, is_unsigned) = param_type(&value);
        let mut writer = PacketWriter::new();
        encode_binary_value(&mut writer, &value).unwrap();
        let charset = if matches!(value, Value::Bytes(_)) { 63 } else { 33 };
        let flags = if is_unsigned { column_flags::UNSIGNED } else { 0 };
        let def = column("c", field_type, flags, charset);
        let bytes = writer.into_bytes();
        let mut reader = PacketReader::new(&bytes);
        let decoded = decode_binary_value(&def, &mut reader).unwrap();
        assert!(reader.is_empty(), "trailing bytes after {:?}", decoded);
        decoded
    }

    #[test]
    fn test_field_type_from_u8() {
        assert_eq!(FieldType::from_u8(0x01), Some(FieldType::Tiny));
        assert_eq!(FieldType::from_u8(0x03), Some(FieldType::Long));
        assert_eq!(FieldType::from_u8(0x08), Some(FieldType::LongLong));
        assert_eq!(FieldType::from_u8(0xFC), Some(FieldType::Blob));
        assert_eq!(FieldType::from_u8(0xF5), Some(FieldType::Json));
        assert_eq!(FieldType::from_u8(0x42), None);
    }

    #[test]
    fn test_field_type_categories() {
        assert!(FieldType::Int24.is_integer());
        assert!(FieldType::Year.is_integer());
        assert!(FieldType::Geometry.is_length_encoded());
        assert!(!FieldType::Long.is_length_encoded());
        assert_eq!(FieldType::LongLong.name(), "BIGINT");
    }

    #[test]
    fn test_parse_column_def() {
        let mut w = PacketWriter::new();
        for s in ["def", "shop", "u", "users", "id", "id"] {
            w.write_lenenc_string(s);
        }
        w.write_u8(0x0c);
        w.write_u16_le(63);
        w.write_u32_le(10);
        w.write_u8(FieldType::Long as u8);
        w.write_u16_le(column_flags::NOT_NULL | column_flags::PRIMARY_KEY | column_flags::UNSIGNED);
        w.write_u8(0);
        w.write_zeros(2);

        let def = ColumnDef::parse(w.as_bytes()).unwrap();
        assert_eq!(def.schema, "shop");
        assert_eq!(def.table, "u");
        assert_eq!(def.org_table, "users");
        assert_eq!(def.name, "id");
        assert_eq!(def.field_type(), Some(FieldType::Long));
        assert_eq!(def.column_length, 10);
        assert!(def.is_not_null());
        assert!(def.is_primary_key());
        assert!(def.is_unsigned());
        assert!(!def.is_auto_increment());
        assert!(def.is_binary_charset());

        assert!(matches!(
            ColumnDef::parse(&w.as_bytes()[..20]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_text_integers() {
        assert_eq!(decode_text_value(&col(FieldType::Long), b"42").unwrap(), Value::Int(42));
        assert_eq!(
            decode_text_value(&col(FieldType::LongLong), b"-100").unwrap(),
            Value::BigInt(-100)
        );
        assert_eq!(
            decode_text_value(&unsigned(FieldType::Tiny), b"255").unwrap(),
            Value::UTinyInt(255)
        );
        assert_eq!(
            decode_text_value(&unsigned(FieldType::LongLong), b"18446744073709551615").unwrap(),
            Value::UBigInt(u64::MAX)
        );
        assert_eq!(
            decode_text_value(&col(FieldType::Int24), b"-8388608").unwrap(),
            Value::Int(-8_388_608)
        );
        assert_eq!(
            decode_text_value(&unsigned(FieldType::Year), b"2024").unwrap(),
            Value::USmallInt(2024)
        );
    }

    #[test]
    fn test_decode_text_bad_number_is_type_error() {
        match decode_text_value(&col(FieldType::Long), b"abc") {
            Err(Error::Type(te)) => {
                assert_eq!(te.expected, "INT");
                assert_eq!(te.column.as_deref(), Some("c"));
            }
            other => panic!("expected type error, got {:?}", other),
        }
        assert!(decode_text_value(&col(FieldType::Tiny), b"300").is_err());
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_decode_text_float_and_decimal() {
        match decode_text_value(&col(FieldType::Double), b"3.14").unwrap() {
            Value::Double(f) => assert!((f - 3.14).abs() < 1e-9),
            other => panic!("expected double, got {:?}", other),
        }
        assert_eq!(
            decode_text_value(&col(FieldType::NewDecimal), b"12.50").unwrap(),
            Value::Decimal("12.50".to_string())
        );
    }

    #[test]
    fn test_decode_text_strings() {
        assert_eq!(
            decode_text_value(&col(FieldType::VarString), b"hello").unwrap(),
            Value::Text("hello".to_string())
        );
        assert_eq!(
            decode_text_value(&column("b", FieldType::Blob, column_flags::BINARY, 63), b"\x00\xff")
                .unwrap(),
            Value::Bytes(vec![0x00, 0xFF])
        );
        // Invalid UTF-8 in a text column falls back to bytes
        assert_eq!(
            decode_text_value(&col(FieldType::String), b"\xff").unwrap(),
            Value::Bytes(vec![0xFF])
        );
    }

    #[test]
    fn test_decode_text_temporal() {
        assert_eq!(
            decode_text_value(&col(FieldType::DateTime), b"2024-02-29 13:45:07.250000").unwrap(),
            Value::DateTime(DateTime::new(2024, 2, 29, 13, 45, 7).with_nanosecond(250_000_000))
        );
        assert_eq!(
            decode_text_value(&col(FieldType::Date), b"2024-02-29").unwrap(),
            Value::DateTime(DateTime::date(2024, 2, 29))
        );
        assert_eq!(
            decode_text_value(&col(FieldType::Timestamp), b"0000-00-00 00:00:00").unwrap(),
            Value::DateTime(DateTime::ZERO)
        );
        assert_eq!(
            decode_text_value(&col(FieldType::Time), b"-838:59:59").unwrap(),
            Value::Duration(-((838 * 3600 + 59 * 60 + 59) * NANOS_PER_SEC))
        );
        assert!(decode_text_value(&col(FieldType::DateTime), b"yesterday").is_err());
    }

    #[test]
    fn test_parse_time_fraction() {
        assert_eq!(parse_time("00:00:01.5"), Some(1_500_000_000));
        assert_eq!(parse_time("25:00:00"), Some(90_000 * NANOS_PER_SEC));
        assert_eq!(parse_time("1:2"), None);
        assert_eq!(parse_time("00:00:01.x"), None);
    }

    #[test]
    fn test_text_time_out_of_range() {
        assert_eq!(parse_time("9999999999999999:00:00"), None);
        assert!(matches!(
            decode_text_value(&col(FieldType::Time), b"9999999999999999:00:00"),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn test_zero_date_text_and_binary_agree() {
        let text = decode_text_value(&col(FieldType::DateTime), b"0000-00-00 00:00:00").unwrap();
        let mut reader = PacketReader::new(&[0]);
        let binary = decode_binary_value(&col(FieldType::DateTime), &mut reader).unwrap();
        assert_eq!(text, binary);
        assert_eq!(binary, Value::DateTime(DateTime::ZERO));
    }

    #[test]
    fn test_decode_binary_integers() {
        let mut r = PacketReader::new(&[0xFF]);
        assert_eq!(decode_binary_value(&col(FieldType::Tiny), &mut r).unwrap(), Value::TinyInt(-1));
        let mut r = PacketReader::new(&[0xFF]);
        assert_eq!(
            decode_binary_value(&unsigned(FieldType::Tiny), &mut r).unwrap(),
            Value::UTinyInt(255)
        );
        let mut r = PacketReader::new(&[0x2A, 0x00, 0x00, 0x00]);
        assert_eq!(decode_binary_value(&col(FieldType::Long), &mut r).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_decode_binary_int24_sign_extension() {
        let mut r = PacketReader::new(&[0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(decode_binary_value(&col(FieldType::Int24), &mut r).unwrap(), Value::Int(-1));
        let mut r = PacketReader::new(&[0x00, 0x00, 0x80, 0x00]);
        assert_eq!(
            decode_binary_value(&col(FieldType::Int24), &mut r).unwrap(),
            Value::Int(-8_388_608)
        );
        let mut r = PacketReader::new(&[0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(
            decode_binary_value(&unsigned(FieldType::Int24), &mut r).unwrap(),
            Value::UInt(16_777_215)
        );
    }

    #[test]
    fn test_decode_binary_datetime_lengths() {
        let mut r = PacketReader::new(&[4, 0xE8, 0x07, 2, 29]);
        assert_eq!(
            decode_binary_value(&col(FieldType::Date), &mut r).unwrap(),
            Value::DateTime(DateTime::date(2024, 2, 29))
        );

        let mut r = PacketReader::new(&[11, 0xE8, 0x07, 2, 29, 13, 45, 7, 0x20, 0xA1, 0x07, 0x00]);
        assert_eq!(
            decode_binary_value(&col(FieldType::DateTime), &mut r).unwrap(),
            Value::DateTime(DateTime::new(2024, 2, 29, 13, 45, 7).with_nanosecond(500_000_000))
        );

        let mut r = PacketReader::new(&[5, 0, 0, 0, 0, 0]);
        assert!(matches!(
            decode_binary_value(&col(FieldType::DateTime), &mut r),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn test_decode_binary_time() {
        // negative, 1 day, 02:03:04, 500000 us
        let mut r = PacketReader::new(&[12, 1, 1, 0, 0, 0, 2, 3, 4, 0x20, 0xA1, 0x07, 0x00]);
        let expected = -((((24 + 2) * 60 + 3) * 60 + 4) * NANOS_PER_SEC + 500_000_000);
        assert_eq!(
            decode_binary_value(&col(FieldType::Time), &mut r).unwrap(),
            Value::Duration(expected)
        );

        let mut r = PacketReader::new(&[0]);
        assert_eq!(
            decode_binary_value(&col(FieldType::Time), &mut r).unwrap(),
            Value::Duration(0)
        );
    }

    #[test]
    fn test_decode_binary_time_out_of_range() {
        let mut r = PacketReader::new(&[8, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0]);
        match decode_binary_value(&col(FieldType::Time), &mut r) {
            Err(Error::Type(e)) => assert_eq!(e.expected, "TIME within range"),
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_binary_unknown_type() {
        let mut def = col(FieldType::Long);
        def.column_type = 0x42;
        let mut r = PacketReader::new(&[0, 0, 0, 0]);
        assert!(matches!(decode_binary_value(&def, &mut r), Err(Error::Type(_))));

        let mut r = PacketReader::new(&[0, 0]);
        assert!(decode_binary_value(&col(FieldType::Null), &mut r).is_err());
    }

    #[test]
    fn test_decode_binary_truncated() {
        let mut r = PacketReader::new(&[0x01, 0x02]);
        assert!(matches!(
            decode_binary_value(&col(FieldType::LongLong), &mut r),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_binary_roundtrips() {
        let values = [
            Value::TinyInt(-5),
            Value::UTinyInt(200),
            Value::SmallInt(-1234),
            Value::USmallInt(65_000),
            Value::Int(42),
            Value::UInt(4_000_000_000),
            Value::BigInt(i64::MIN),
            Value::UBigInt(u64::MAX),
            Value::Float(1.5),
            Value::Double(-2.25),
            Value::Decimal("99.95".to_string()),
            Value::Text("hello".to_string()),
            Value::Bytes(vec![0, 1, 2, 0xFF]),
            Value::DateTime(DateTime::new(2023, 12, 31, 23, 59, 58)),
            Value::DateTime(DateTime::ZERO),
            Value::Duration(-(3 * 86_400 + 3661) * NANOS_PER_SEC),
        ];
        for value in values {
            assert_eq!(roundtrip(value.clone()), value);
        }
        assert_eq!(roundtrip(Value::Bool(true)), Value::TinyInt(1));
    }

    #[test]
    fn test_encode_drops_sub_second() {
        let dt = DateTime::new(2023, 1, 2, 3, 4, 5).with_nanosecond(999);
        assert_eq!(
            roundtrip(Value::DateTime(dt)),
            Value::DateTime(DateTime::new(2023, 1, 2, 3, 4, 5))
        );
        assert_eq!(
            roundtrip(Value::Duration(NANOS_PER_SEC + 1)),
            Value::Duration(NANOS_PER_SEC)
        );
    }

    #[test]
    fn test_encode_rejects_out_of_range_date() {
        let mut writer = PacketWriter::new();
        let bad = DateTime::new(2023, 13, 1, 0, 0, 0);
        assert!(matches!(
            encode_binary_value(&mut writer, &Value::DateTime(bad)),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn test_param_types() {
        assert_eq!(param_type(&Value::Null), (FieldType::Null, false));
        assert_eq!(param_type(&Value::Bool(true)), (FieldType::Tiny, false));
        assert_eq!(param_type(&Value::UInt(1)), (FieldType::Long, true));
        assert_eq!(param_type(&Value::Text(String::new())), (FieldType::String, false));
        assert_eq!(param_type(&Value::Bytes(vec![])), (FieldType::Blob, false));
        assert_eq!(
            param_type(&Value::Decimal("1".to_string())),
            (FieldType::NewDecimal, false)
        );
    }

    #[test]
    fn test_null_bitmaps() {
        assert_eq!(null_bitmap_len(0, 0), 0);
        assert_eq!(null_bitmap_len(1, 0), 1);
        assert_eq!(null_bitmap_len(6, 2), 1);
        assert_eq!(null_bitmap_len(7, 2), 2);

        let bitmap = param_null_bitmap(&[
            Value::Int(1),
            Value::Null,
            Value::Int(3),
            Value::Int(4),
            Value::Int(5),
            Value::Int(6),
            Value::Int(7),
            Value::Int(8),
            Value::Null,
        ]);
        assert_eq!(bitmap, vec![0b0000_0010, 0b0000_0001]);

        // Row bitmaps reserve two leading bits
        let row = [0b0000_1000u8];
        assert!(is_null_in_bitmap(&row, 1, 2));
        assert!(!is_null_in_bitmap(&row, 0, 2));
        assert!(!is_null_in_bitmap(&row, 20, 2));
    }
}
