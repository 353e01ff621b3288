//! Per-column staging buffers.
//!
//! Each column of a staged table is held by a [`ColumnHandler`]: one typed
//! growable store per column type. The batch builder only talks to the trait.

use std::fmt;

use arrow_array::{BinaryArray, StringArray};
use arrow_buffer::ScalarBuffer;

use crate::pinned::Block;
use crate::types::{ColumnType, ColumnValues, Timestamp, Value};

/// A value of type `actual` offered to a column declared as `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: ColumnType,
    pub actual: ColumnType,
}

/// Strategy owning one column's staged data.
///
/// A value of the wrong type is refused and leaves the handler unchanged.
pub trait ColumnHandler: fmt::Debug + Send {
    fn column_type(&self) -> ColumnType;

    /// Number of staged values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the column was appended to or bulk-set since the last reset.
    fn is_populated(&self) -> bool;

    /// Appends one value; `Value::Null` appends the column's sentinel.
    fn append(&mut self, value: Value) -> Result<(), Mismatch>;

    /// Replaces the staged values wholesale.
    fn bulk_set(&mut self, values: ColumnValues) -> Result<(), Mismatch>;

    /// Moves the staged values into one contiguous block, leaving the
    /// handler empty but still populated until reset.
    fn flatten(&mut self) -> Block;

    /// Clears staged values and the populated flag.
    fn reset(&mut self);
}

/// Element type of a typed column store.
trait Cell: Sized + fmt::Debug + Send + 'static {
    fn null() -> Self;
    fn from_value(value: Value) -> Option<Self>;
    fn from_values(values: ColumnValues) -> Option<Vec<Self>>;
    fn into_block(values: Vec<Self>) -> Block;
}

impl Cell for f64 {
    fn null() -> Self {
        f64::NAN
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    fn from_values(values: ColumnValues) -> Option<Vec<Self>> {
        match values {
            ColumnValues::Double(v) => Some(v),
            _ => None,
        }
    }

    fn into_block(values: Vec<Self>) -> Block {
        Block::Float64(ScalarBuffer::from(values))
    }
}

impl Cell for i64 {
    fn null() -> Self {
        i64::MIN
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    fn from_values(values: ColumnValues) -> Option<Vec<Self>> {
        match values {
            ColumnValues::Int64(v) => Some(v),
            _ => None,
        }
    }

    fn into_block(values: Vec<Self>) -> Block {
        Block::Int64(ScalarBuffer::from(values))
    }
}

impl Cell for Timestamp {
    fn null() -> Self {
        Timestamp::NULL
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    fn from_values(values: ColumnValues) -> Option<Vec<Self>> {
        match values {
            ColumnValues::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    fn into_block(values: Vec<Self>) -> Block {
        Block::Int64(ScalarBuffer::from(timestamps_to_nanos(values)))
    }
}

impl Cell for String {
    fn null() -> Self {
        String::new()
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(v) | Value::Symbol(v) => Some(v),
            _ => None,
        }
    }

    fn from_values(values: ColumnValues) -> Option<Vec<Self>> {
        match values {
            ColumnValues::String(v) | ColumnValues::Symbol(v) => Some(v),
            _ => None,
        }
    }

    fn into_block(values: Vec<Self>) -> Block {
        Block::Utf8(StringArray::from_iter_values(values.iter()))
    }
}

impl Cell for Vec<u8> {
    fn null() -> Self {
        Vec::new()
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }

    fn from_values(values: ColumnValues) -> Option<Vec<Self>> {
        match values {
            ColumnValues::Blob(v) => Some(v),
            _ => None,
        }
    }

    fn into_block(values: Vec<Self>) -> Block {
        Block::Binary(BinaryArray::from_iter_values(values.iter()))
    }
}

/// Converts a timestamp column to raw nanoseconds.
pub(crate) fn timestamps_to_nanos(values: Vec<Timestamp>) -> Vec<i64> {
    values.into_iter().map(Timestamp::as_nanos).collect()
}

/// Growable store for one column type.
#[derive(Debug)]
struct TypedColumn<T> {
    column_type: ColumnType,
    values: Vec<T>,
    populated: bool,
}

impl<T: Cell> TypedColumn<T> {
    fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            values: Vec::new(),
            populated: false,
        }
    }

    fn mismatch(&self, actual: ColumnType) -> Mismatch {
        Mismatch {
            expected: self.column_type,
            actual,
        }
    }
}

impl<T: Cell> ColumnHandler for TypedColumn<T> {
    fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn is_populated(&self) -> bool {
        self.populated
    }

    fn append(&mut self, value: Value) -> Result<(), Mismatch> {
        let cell = match value.value_type() {
            None => T::null(),
            Some(actual) => T::from_value(value).ok_or_else(|| self.mismatch(actual))?,
        };
        self.values.push(cell);
        self.populated = true;
        Ok(())
    }

    fn bulk_set(&mut self, values: ColumnValues) -> Result<(), Mismatch> {
        let actual = values.value_type();
        self.values = T::from_values(values).ok_or_else(|| self.mismatch(actual))?;
        self.populated = true;
        Ok(())
    }

    fn flatten(&mut self) -> Block {
        T::into_block(std::mem::take(&mut self.values))
    }

    fn reset(&mut self) {
        self.values.clear();
        self.populated = false;
    }
}

/// Creates the handler for a column of the given type.
pub fn new_handler(column_type: ColumnType) -> Box<dyn ColumnHandler> {
    match column_type {
        ColumnType::Double => Box::new(TypedColumn::<f64>::new(column_type)),
        ColumnType::Int64 => Box::new(TypedColumn::<i64>::new(column_type)),
        ColumnType::Timestamp => Box::new(TypedColumn::<Timestamp>::new(column_type)),
        ColumnType::String | ColumnType::Symbol => {
            Box::new(TypedColumn::<String>::new(column_type))
        }
        ColumnType::Blob => Box::new(TypedColumn::<Vec<u8>>::new(column_type)),
    }
}
