//! Dynamic SQL values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, TypeError};

/// A MySQL value as carried on the wire.
///
/// The set of variants is closed: every variant has exactly one binary
/// parameter encoding and is produced by at least one column decoder.
/// Integers keep the width and signedness of the column they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value (sent as TINYINT)
    Bool(bool),

    /// 8-bit signed integer
    TinyInt(i8),

    /// 16-bit signed integer
    SmallInt(i16),

    /// 32-bit signed integer (also MEDIUMINT)
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 8-bit unsigned integer
    UTinyInt(u8),

    /// 16-bit unsigned integer
    USmallInt(u16),

    /// 32-bit unsigned integer (also MEDIUMINT UNSIGNED)
    UInt(u32),

    /// 64-bit unsigned integer
    UBigInt(u64),

    /// 32-bit floating point
    Float(f32),

    /// 64-bit floating point
    Double(f64),

    /// Exact decimal kept as its textual form
    Decimal(String),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// DATE, DATETIME or TIMESTAMP
    DateTime(DateTime),

    /// TIME, as signed nanoseconds
    Duration(i64),
}

/// A calendar date and wall-clock time without a time zone.
///
/// MySQL allows the all-zero value `0000-00-00 00:00:00`, which is
/// represented by [`DateTime::ZERO`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
}

impl DateTime {
    /// The zero date `0000-00-00 00:00:00`.
    pub const ZERO: DateTime = DateTime {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
        nanosecond: 0,
    };

    /// A date at midnight.
    pub const fn date(year: u16, month: u8, day: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
            nanosecond: 0,
        }
    }

    /// A date and time with whole seconds.
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            nanosecond: 0,
        }
    }

    /// Set the sub-second part.
    pub const fn with_nanosecond(mut self, nanosecond: u32) -> Self {
        self.nanosecond = nanosecond;
        self
    }

    /// Is this the all-zero sentinel date?
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Check that every field is inside its calendar range.
    ///
    /// The zero date is accepted as valid.
    pub fn is_valid(&self) -> bool {
        if self.is_zero() {
            return true;
        }
        self.year <= 9999
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
            && self.nanosecond < 1_000_000_000
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.nanosecond != 0 {
            write!(f, ".{:06}", self.nanosecond / 1000)?;
        }
        Ok(())
    }
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::UTinyInt(_) => "TINYINT UNSIGNED",
            Value::USmallInt(_) => "SMALLINT UNSIGNED",
            Value::UInt(_) => "INT UNSIGNED",
            Value::UBigInt(_) => "BIGINT UNSIGNED",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::DateTime(_) => "DATETIME",
            Value::Duration(_) => "TIME",
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => self.as_i64().map(|v| v != 0),
        }
    }

    /// Try to convert this value to an i64.
    ///
    /// Unsigned values above `i64::MAX` return `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::UTinyInt(v) => Some(i64::from(*v)),
            Value::USmallInt(v) => Some(i64::from(*v)),
            Value::UInt(v) => Some(i64::from(*v)),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Try to convert this value to a u64.
    ///
    /// Negative values return `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UBigInt(v) => Some(*v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(s) => s.parse().ok(),
            Value::UBigInt(v) => Some(*v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) | Value::Decimal(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to get this value as a date and time.
    pub fn as_datetime(&self) -> Option<DateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Try to get this value as a signed duration in nanoseconds.
    pub fn as_duration_nanos(&self) -> Option<i64> {
        match self {
            Value::Duration(ns) => Some(*ns),
            _ => None,
        }
    }
}

fn type_error(expected: &'static str, actual: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

// Conversion implementations

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UTinyInt(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::USmallInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v)
    }
}

/// Durations beyond `i64::MAX` nanoseconds saturate.
impl From<std::time::Duration> for Value {
    fn from(v: std::time::Duration) -> Self {
        Value::Duration(i64::try_from(v.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// TryFrom implementations for extracting values

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| type_error("bool", &value))
    }
}

impl TryFrom<Value> for i8 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::TinyInt(v) => Ok(v),
            Value::Bool(v) => Ok(if v { 1 } else { 0 }),
            other => Err(type_error("i8", &other)),
        }
    }
}

impl TryFrom<Value> for i16 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::TinyInt(v) => Ok(i16::from(v)),
            Value::SmallInt(v) => Ok(v),
            Value::UTinyInt(v) => Ok(i16::from(v)),
            Value::Bool(v) => Ok(if v { 1 } else { 0 }),
            other => Err(type_error("i16", &other)),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::TinyInt(v) => Ok(i32::from(v)),
            Value::SmallInt(v) => Ok(i32::from(v)),
            Value::Int(v) => Ok(v),
            Value::UTinyInt(v) => Ok(i32::from(v)),
            Value::USmallInt(v) => Ok(i32::from(v)),
            Value::Bool(v) => Ok(if v { 1 } else { 0 }),
            other => Err(type_error("i32", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| type_error("i64", &value))
    }
}

impl TryFrom<Value> for u64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_u64().ok_or_else(|| type_error("u64", &value))
    }
}

impl TryFrom<Value> for f32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Float(v) => Ok(v),
            Value::TinyInt(v) => Ok(f32::from(v)),
            Value::SmallInt(v) => Ok(f32::from(v)),
            Value::UTinyInt(v) => Ok(f32::from(v)),
            Value::USmallInt(v) => Ok(f32::from(v)),
            other => Err(type_error("f32", &other)),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Float(v) => Ok(f64::from(v)),
            Value::Double(v) => Ok(v),
            Value::TinyInt(v) => Ok(f64::from(v)),
            Value::SmallInt(v) => Ok(f64::from(v)),
            Value::Int(v) => Ok(f64::from(v)),
            Value::UTinyInt(v) => Ok(f64::from(v)),
            Value::USmallInt(v) => Ok(f64::from(v)),
            Value::UInt(v) => Ok(f64::from(v)),
            Value::Decimal(ref s) => s.parse().map_err(|_| type_error("f64", &value)),
            other => Err(type_error("f64", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(v) | Value::Decimal(v) => Ok(v),
            Value::Bytes(v) => String::from_utf8(v).map_err(|e| {
                Error::Type(TypeError {
                    expected: "String",
                    actual: format!("invalid UTF-8: {}", e),
                    column: None,
                    rust_type: Some("String"),
                })
            }),
            other => Err(type_error("String", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::Text(v) | Value::Decimal(v) => Ok(v.into_bytes()),
            other => Err(type_error("Vec<u8>", &other)),
        }
    }
}

impl TryFrom<Value> for DateTime {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .as_datetime()
            .ok_or_else(|| type_error("DateTime", &value))
    }
}

/// TryFrom for `Option<T>` - returns None for Null, tries to convert otherwise
impl<T> TryFrom<Value> for Option<T>
where
    T: TryFrom<Value, Error = Error>,
{
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(None),
            v => T::try_from(v).map(Some),
        }
    }
}
