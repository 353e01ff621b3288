//! Value and column types accepted by the batch writer.
//!
//! This module defines the six column types an engine table can declare, the
//! per-type "no value" sentinels, and conversions from Apache Arrow arrays so
//! that Arrow data can be staged without going through per-row calls.

use std::fmt;

use arrow_array::{Array, BinaryArray, Float32Array, Float64Array, Int16Array, Int32Array};
use arrow_array::{Int64Array, Int8Array, LargeBinaryArray, LargeStringArray, StringArray};
use arrow_array::{TimestampMicrosecondArray, TimestampMillisecondArray};
use arrow_array::{TimestampNanosecondArray, TimestampSecondArray};
use arrow_array::{UInt16Array, UInt32Array, UInt8Array};
use arrow_schema::{DataType, TimeUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WriterError};

/// Column type declared by an engine table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Double,
    Int64,
    Blob,
    String,
    Symbol,
    Timestamp,
}

impl ColumnType {
    /// Returns true if a value of type `actual` may be stored in a column of
    /// this type. String and Symbol are interchangeable.
    pub fn accepts(self, actual: ColumnType) -> bool {
        self == actual || (self.is_text() && actual.is_text())
    }

    /// Returns true for the two text-carrying types.
    pub fn is_text(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Symbol)
    }

    /// Returns the sentinel standing in for "no value" in this column type.
    pub fn null_value(self) -> Value {
        match self {
            ColumnType::Double => Value::Double(f64::NAN),
            ColumnType::Int64 => Value::Int64(i64::MIN),
            ColumnType::Blob => Value::Blob(Vec::new()),
            ColumnType::String => Value::String(String::new()),
            ColumnType::Symbol => Value::Symbol(String::new()),
            ColumnType::Timestamp => Value::Timestamp(Timestamp::NULL),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Double => "double",
            ColumnType::Int64 => "int64",
            ColumnType::Blob => "blob",
            ColumnType::String => "string",
            ColumnType::Symbol => "symbol",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a column type to the Arrow data type used on the read path.
pub fn column_type_to_arrow(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Double => DataType::Float64,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::Blob => DataType::Binary,
        ColumnType::String | ColumnType::Symbol => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Nanosecond, None),
    }
}

/// Point in time as nanoseconds since the Unix epoch.
///
/// `i64::MIN` is reserved as the "no value" sentinel and is never produced
/// by calendar conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Sentinel for an absent timestamp.
    pub const NULL: Timestamp = Timestamp(i64::MIN);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == i64::MIN
    }

    /// Converts a calendar time. Returns `None` outside the representable
    /// range or when the result would collide with the sentinel.
    pub fn from_datetime(dt: DateTime<Utc>) -> Option<Self> {
        match dt.timestamp_nanos_opt() {
            Some(i64::MIN) | None => None,
            Some(nanos) => Some(Self(nanos)),
        }
    }

    /// Converts back to a calendar time; the sentinel has none.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if self.is_null() {
            None
        } else {
            Some(DateTime::from_timestamp_nanos(self.0))
        }
    }

    /// Returns the timestamp one nanosecond later, saturating.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt).unwrap_or(Self::NULL)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)),
            None => f.write_str("null"),
        }
    }
}

/// Half-open time interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub begin: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(begin: Timestamp, end: Timestamp) -> Self {
        Self {
            begin: begin.as_nanos(),
            end: end.as_nanos(),
        }
    }

    pub fn begin(&self) -> Timestamp {
        Timestamp(self.begin)
    }

    pub fn end(&self) -> Timestamp {
        Timestamp(self.end)
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.begin <= ts.0 && ts.0 < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// A single cell passed to a row-wise append.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value; the column's sentinel is stored.
    Null,
    Double(f64),
    Int64(i64),
    Blob(Vec<u8>),
    String(String),
    Symbol(String),
    Timestamp(Timestamp),
}

impl Value {
    /// Returns the value's type, or `None` for `Null`.
    pub fn value_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Double(_) => Some(ColumnType::Double),
            Value::Int64(_) => Some(ColumnType::Int64),
            Value::Blob(_) => Some(ColumnType::Blob),
            Value::String(_) => Some(ColumnType::String),
            Value::Symbol(_) => Some(ColumnType::Symbol),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A complete column supplied in one call, replacing whatever was staged.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Double(Vec<f64>),
    Int64(Vec<i64>),
    Blob(Vec<Vec<u8>>),
    String(Vec<String>),
    Symbol(Vec<String>),
    Timestamp(Vec<Timestamp>),
}

impl ColumnValues {
    /// Returns the number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Double(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Blob(v) => v.len(),
            ColumnValues::String(v) | ColumnValues::Symbol(v) => v.len(),
            ColumnValues::Timestamp(v) => v.len(),
        }
    }

    /// Returns true if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ColumnType {
        match self {
            ColumnValues::Double(_) => ColumnType::Double,
            ColumnValues::Int64(_) => ColumnType::Int64,
            ColumnValues::Blob(_) => ColumnType::Blob,
            ColumnValues::String(_) => ColumnType::String,
            ColumnValues::Symbol(_) => ColumnType::Symbol,
            ColumnValues::Timestamp(_) => ColumnType::Timestamp,
        }
    }

    /// Converts an Arrow array into column values.
    ///
    /// Arrow nulls become the per-type sentinel. Narrower integer and float
    /// types are widened; timestamps of any unit are rescaled to nanoseconds.
    pub fn try_from_arrow(array: &dyn Array) -> Result<Self> {
        macro_rules! downcast {
            ($ty:ty) => {
                array.as_any().downcast_ref::<$ty>().ok_or_else(|| {
                    WriterError::conversion(format!(
                        "Array does not match its data type {:?}",
                        array.data_type()
                    ))
                })?
            };
        }

        let values = match array.data_type() {
            DataType::Float64 => ColumnValues::Double(
                downcast!(Float64Array).iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
            ),
            DataType::Float32 => ColumnValues::Double(
                downcast!(Float32Array)
                    .iter()
                    .map(|v| v.map_or(f64::NAN, f64::from))
                    .collect(),
            ),
            DataType::Int64 => ColumnValues::Int64(
                downcast!(Int64Array).iter().map(|v| v.unwrap_or(i64::MIN)).collect(),
            ),
            DataType::Int32 => ColumnValues::Int64(widen_ints(downcast!(Int32Array).iter())),
            DataType::Int16 => ColumnValues::Int64(widen_ints(downcast!(Int16Array).iter())),
            DataType::Int8 => ColumnValues::Int64(widen_ints(downcast!(Int8Array).iter())),
            DataType::UInt32 => ColumnValues::Int64(widen_ints(downcast!(UInt32Array).iter())),
            DataType::UInt16 => ColumnValues::Int64(widen_ints(downcast!(UInt16Array).iter())),
            DataType::UInt8 => ColumnValues::Int64(widen_ints(downcast!(UInt8Array).iter())),
            DataType::Utf8 => ColumnValues::String(
                downcast!(StringArray)
                    .iter()
                    .map(|v| v.unwrap_or_default().to_string())
                    .collect(),
            ),
            DataType::LargeUtf8 => ColumnValues::String(
                downcast!(LargeStringArray)
                    .iter()
                    .map(|v| v.unwrap_or_default().to_string())
                    .collect(),
            ),
            DataType::Binary => ColumnValues::Blob(
                downcast!(BinaryArray)
                    .iter()
                    .map(|v| v.unwrap_or_default().to_vec())
                    .collect(),
            ),
            DataType::LargeBinary => ColumnValues::Blob(
                downcast!(LargeBinaryArray)
                    .iter()
                    .map(|v| v.unwrap_or_default().to_vec())
                    .collect(),
            ),
            DataType::Timestamp(TimeUnit::Nanosecond, _) => ColumnValues::Timestamp(
                downcast!(TimestampNanosecondArray)
                    .iter()
                    .map(|v| v.map_or(Timestamp::NULL, Timestamp::from_nanos))
                    .collect(),
            ),
            DataType::Timestamp(TimeUnit::Microsecond, _) => ColumnValues::Timestamp(
                rescale_timestamps(downcast!(TimestampMicrosecondArray).iter(), 1_000)?,
            ),
            DataType::Timestamp(TimeUnit::Millisecond, _) => ColumnValues::Timestamp(
                rescale_timestamps(downcast!(TimestampMillisecondArray).iter(), 1_000_000)?,
            ),
            DataType::Timestamp(TimeUnit::Second, _) => ColumnValues::Timestamp(
                rescale_timestamps(downcast!(TimestampSecondArray).iter(), 1_000_000_000)?,
            ),
            other => {
                return Err(WriterError::conversion(format!(
                    "Unsupported Arrow type {:?}",
                    other
                )))
            }
        };
        Ok(values)
    }
}

fn widen_ints<T: Into<i64>>(iter: impl Iterator<Item = Option<T>>) -> Vec<i64> {
    iter.map(|v| v.map_or(i64::MIN, Into::into)).collect()
}

fn rescale_timestamps(
    iter: impl Iterator<Item = Option<i64>>,
    factor: i64,
) -> Result<Vec<Timestamp>> {
    iter.map(|v| match v {
        None => Ok(Timestamp::NULL),
        Some(raw) => raw
            .checked_mul(factor)
            .map(Timestamp::from_nanos)
            .ok_or_else(|| {
                WriterError::conversion(format!("Timestamp {} overflows nanosecond range", raw))
            }),
    })
    .collect()
}
