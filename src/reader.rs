//! Arrow readers for range fetches.
//!
//! `RowBatchBuilder` turns stored rows into Arrow record batches, one typed
//! builder per column; `VecRecordBatchReader` hands the finished batches out.

use std::sync::Arc;

use arrow_array::builder::{
    BinaryBuilder, Float64Builder, Int64Builder, StringBuilder, TimestampNanosecondBuilder,
};
use arrow_array::{ArrayRef, RecordBatch, TimestampNanosecondArray};
use arrow_schema::{ArrowError, SchemaRef};

use crate::schema::TableSchema;
use crate::types::{ColumnType, Value};

static NULL_CELL: Value = Value::Null;

/// Iterator-based RecordBatchReader for pre-loaded record batches.
pub struct VecRecordBatchReader {
    batches: std::vec::IntoIter<RecordBatch>,
    schema: SchemaRef,
}

impl VecRecordBatchReader {
    pub fn new(batches: Vec<RecordBatch>, schema: SchemaRef) -> Self {
        Self {
            batches: batches.into_iter(),
            schema,
        }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(Vec::new(), schema)
    }
}

impl arrow_array::RecordBatchReader for VecRecordBatchReader {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }
}

impl Iterator for VecRecordBatchReader {
    type Item = Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.next().map(Ok)
    }
}

/// Builds record batches of `$timestamp` plus a table's columns from rows.
#[derive(Debug, Clone)]
pub struct RowBatchBuilder {
    schema: SchemaRef,
    column_types: Vec<ColumnType>,
    batch_size: usize,
}

impl RowBatchBuilder {
    pub const DEFAULT_BATCH_SIZE: usize = 8192;

    pub fn new(schema: &TableSchema) -> Self {
        Self {
            schema: schema.to_arrow_schema(),
            column_types: schema.columns().iter().map(|c| c.column_type).collect(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Converts rows of `(timestamp_nanos, cells)` into a reader.
    ///
    /// `Value::Null` cells, and cells whose type does not match their column,
    /// become Arrow nulls.
    pub fn build<'r, I>(&self, rows: I) -> Result<VecRecordBatchReader, ArrowError>
    where
        I: IntoIterator<Item = (i64, &'r [Value])>,
    {
        let rows: Vec<(i64, &[Value])> = rows.into_iter().collect();
        let batches = rows
            .chunks(self.batch_size)
            .map(|chunk| self.build_batch(chunk))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VecRecordBatchReader::new(batches, self.schema()))
    }

    fn build_batch(&self, rows: &[(i64, &[Value])]) -> Result<RecordBatch, ArrowError> {
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.column_types.len() + 1);
        arrays.push(Arc::new(TimestampNanosecondArray::from(
            rows.iter().map(|(ts, _)| *ts).collect::<Vec<_>>(),
        )));

        for (idx, column_type) in self.column_types.iter().enumerate() {
            let cells = rows.iter().map(|(_, cells)| cells.get(idx).unwrap_or(&NULL_CELL));
            let array = match column_type {
                ColumnType::Double => Self::convert_double_column(cells, rows.len()),
                ColumnType::Int64 => Self::convert_int64_column(cells, rows.len()),
                ColumnType::Timestamp => Self::convert_timestamp_column(cells, rows.len()),
                ColumnType::String | ColumnType::Symbol => {
                    Self::convert_string_column(cells, rows.len())
                }
                ColumnType::Blob => Self::convert_binary_column(cells, rows.len()),
            };
            arrays.push(array);
        }

        RecordBatch::try_new(self.schema(), arrays)
    }

    fn convert_double_column<'v>(
        cells: impl Iterator<Item = &'v Value>,
        num_rows: usize,
    ) -> ArrayRef {
        let mut builder = Float64Builder::with_capacity(num_rows);
        for value in cells {
            match value {
                Value::Double(v) if !v.is_nan() => builder.append_value(*v),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    }

    fn convert_int64_column<'v>(
        cells: impl Iterator<Item = &'v Value>,
        num_rows: usize,
    ) -> ArrayRef {
        let mut builder = Int64Builder::with_capacity(num_rows);
        for value in cells {
            match value {
                Value::Int64(v) if *v != i64::MIN => builder.append_value(*v),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    }

    fn convert_timestamp_column<'v>(
        cells: impl Iterator<Item = &'v Value>,
        num_rows: usize,
    ) -> ArrayRef {
        let mut builder = TimestampNanosecondBuilder::with_capacity(num_rows);
        for value in cells {
            match value {
                Value::Timestamp(ts) if !ts.is_null() => builder.append_value(ts.as_nanos()),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    }

    fn convert_string_column<'v>(
        cells: impl Iterator<Item = &'v Value>,
        num_rows: usize,
    ) -> ArrayRef {
        let mut builder = StringBuilder::with_capacity(num_rows, num_rows * 8);
        for value in cells {
            match value {
                Value::String(s) | Value::Symbol(s) if !s.is_empty() => builder.append_value(s),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    }

    fn convert_binary_column<'v>(
        cells: impl Iterator<Item = &'v Value>,
        num_rows: usize,
    ) -> ArrayRef {
        let mut builder = BinaryBuilder::with_capacity(num_rows, num_rows * 8);
        for value in cells {
            match value {
                Value::Blob(b) if !b.is_empty() => builder.append_value(b),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    }
}
