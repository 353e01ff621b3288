//! Descriptors handed to the engine on push.
//!
//! A push sends one [`TableDescriptor`] per table, each listing its populated
//! columns in column-major form. Every slice and array inside a descriptor
//! borrows a block owned by the session's pin tracker, so a descriptor cannot
//! outlive the push call that produced it.

use std::fmt;
use std::str::FromStr;

use arrow_array::{Array, BinaryArray, StringArray};
use serde::{Deserialize, Serialize};

use crate::error::WriterError;
use crate::pinned::Block;
use crate::types::{ColumnType, ColumnValues, TimeRange, Timestamp, Value};

/// How the engine applies a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    /// Durable, all-or-nothing insert.
    #[default]
    Transactional,
    /// Erase the given ranges, then insert.
    Truncate,
    /// In-place insert tuned for frequent small increments; concurrent
    /// writers to the same range may overwrite each other.
    Fast,
    /// Hand the batch to server-side buffering and return before it is durable.
    Async,
}

impl PushMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PushMode::Transactional => "transactional",
            PushMode::Truncate => "truncate",
            PushMode::Fast => "fast",
            PushMode::Async => "async",
        }
    }
}

impl fmt::Display for PushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushMode {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transactional" => Ok(PushMode::Transactional),
            "truncate" => Ok(PushMode::Truncate),
            "fast" => Ok(PushMode::Fast),
            "async" => Ok(PushMode::Async),
            other => Err(WriterError::invalid_argument(format!(
                "Unknown push mode '{}'",
                other
            ))),
        }
    }
}

/// Typed view over one pinned column data block.
#[derive(Debug, Clone, Copy)]
pub enum ColumnBlock<'a> {
    Double(&'a [f64]),
    Int64(&'a [i64]),
    Timestamp(&'a [i64]),
    /// String and Symbol columns.
    String(&'a StringArray),
    Blob(&'a BinaryArray),
}

impl<'a> ColumnBlock<'a> {
    /// Views a pinned block as data for a column of `column_type`.
    pub(crate) fn from_block(block: &'a Block, column_type: ColumnType) -> Option<Self> {
        Some(match (column_type, block) {
            (ColumnType::Double, Block::Float64(b)) => ColumnBlock::Double(b),
            (ColumnType::Int64, Block::Int64(b)) => ColumnBlock::Int64(b),
            (ColumnType::Timestamp, Block::Int64(b)) => ColumnBlock::Timestamp(b),
            (ColumnType::String | ColumnType::Symbol, Block::Utf8(a)) => ColumnBlock::String(a),
            (ColumnType::Blob, Block::Binary(a)) => ColumnBlock::Blob(a),
            _ => return None,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBlock::Double(v) => v.len(),
            ColumnBlock::Int64(v) | ColumnBlock::Timestamp(v) => v.len(),
            ColumnBlock::String(a) => a.len(),
            ColumnBlock::Blob(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type of the data carried, with Symbol reported as String.
    pub fn block_type(&self) -> ColumnType {
        match self {
            ColumnBlock::Double(_) => ColumnType::Double,
            ColumnBlock::Int64(_) => ColumnType::Int64,
            ColumnBlock::Timestamp(_) => ColumnType::Timestamp,
            ColumnBlock::String(_) => ColumnType::String,
            ColumnBlock::Blob(_) => ColumnType::Blob,
        }
    }

    /// Decodes row `row`, turning sentinels back into `Value::Null`.
    ///
    /// # Panics
    /// If `row` is out of bounds.
    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnBlock::Double(v) if v[row].is_nan() => Value::Null,
            ColumnBlock::Double(v) => Value::Double(v[row]),
            ColumnBlock::Int64(v) if v[row] == i64::MIN => Value::Null,
            ColumnBlock::Int64(v) => Value::Int64(v[row]),
            ColumnBlock::Timestamp(v) if v[row] == i64::MIN => Value::Null,
            ColumnBlock::Timestamp(v) => Value::Timestamp(Timestamp::from_nanos(v[row])),
            ColumnBlock::String(a) if a.value(row).is_empty() => Value::Null,
            ColumnBlock::String(a) => Value::String(a.value(row).to_string()),
            ColumnBlock::Blob(a) if a.value(row).is_empty() => Value::Null,
            ColumnBlock::Blob(a) => Value::Blob(a.value(row).to_vec()),
        }
    }

    /// Copies the raw block, sentinels included.
    pub fn to_values(&self) -> ColumnValues {
        match self {
            ColumnBlock::Double(v) => ColumnValues::Double(v.to_vec()),
            ColumnBlock::Int64(v) => ColumnValues::Int64(v.to_vec()),
            ColumnBlock::Timestamp(v) => {
                ColumnValues::Timestamp(v.iter().copied().map(Timestamp::from_nanos).collect())
            }
            ColumnBlock::String(a) => {
                ColumnValues::String(a.iter().map(|s| s.unwrap_or_default().to_string()).collect())
            }
            ColumnBlock::Blob(a) => {
                ColumnValues::Blob(a.iter().map(|b| b.unwrap_or_default().to_vec()).collect())
            }
        }
    }
}

/// One populated column of a table descriptor.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor<'a> {
    pub name: &'a str,
    /// Type declared by the table schema.
    pub column_type: ColumnType,
    pub data: ColumnBlock<'a>,
}

/// Deduplication requested for one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DedupKey<'a> {
    /// Insert every row.
    #[default]
    Disabled,
    /// Drop rows identical to an existing row in every column.
    FullRow,
    /// Drop rows matching an existing row on timestamp and these columns.
    Columns(Vec<&'a str>),
}

/// Flattened, column-major content of one table for one push.
#[derive(Debug, Clone)]
pub struct TableDescriptor<'a> {
    pub name: &'a str,
    pub row_count: usize,
    /// Nanosecond timestamps, one per row.
    pub timestamps: &'a [i64],
    /// Populated columns only; unpopulated columns are absent.
    pub columns: Vec<ColumnDescriptor<'a>>,
    /// Ranges to erase before inserting; set only for truncate pushes.
    pub truncate_ranges: Option<&'a [TimeRange]>,
    pub dedup: DedupKey<'a>,
}

impl TableDescriptor<'_> {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor<'_>> {
        self.columns.iter().find(|c| c.name == name)
    }
}
