//! Interfaces consumed from the storage engine.
//!
//! [`Engine`] is the write side used by sessions: schema listing plus the
//! push call. [`RangeReader`] is the read side (range fetches and
//! aggregates); the writer never calls it, but the crate's tests and tools
//! verify pushes through it.

use std::sync::Arc;

use arrow_array::RecordBatchReader;

use crate::descriptor::{PushMode, TableDescriptor};
use crate::error::WriterError;
use crate::schema::ColumnInfo;
use crate::types::{TimeRange, Timestamp, Value};

/// Failure reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("status {code}: {message}")]
    Status { code: i32, message: String },

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl From<EngineError> for WriterError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TableNotFound(table) => WriterError::schema_not_found(table),
            EngineError::Status { code, message } => WriterError::engine_rejected(code, message),
            EngineError::ConnectionLost(message) => WriterError::connection_lost(message),
        }
    }
}

/// Write-side engine interface.
pub trait Engine {
    /// Lists a table's columns in declaration order.
    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError>;

    /// Applies one batch. Borrowed data is only valid for the duration of
    /// the call; `Async` may return before the batch is durable.
    fn push(&self, mode: PushMode, tables: &[TableDescriptor<'_>]) -> Result<(), EngineError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        (**self).list_columns(table)
    }

    fn push(&self, mode: PushMode, tables: &[TableDescriptor<'_>]) -> Result<(), EngineError> {
        (**self).push(mode, tables)
    }
}

impl<E: Engine + ?Sized> Engine for Arc<E> {
    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        (**self).list_columns(table)
    }

    fn push(&self, mode: PushMode, tables: &[TableDescriptor<'_>]) -> Result<(), EngineError> {
        (**self).push(mode, tables)
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        (**self).list_columns(table)
    }

    fn push(&self, mode: PushMode, tables: &[TableDescriptor<'_>]) -> Result<(), EngineError> {
        (**self).push(mode, tables)
    }
}

/// Aggregate computed per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Count,
    First,
    Last,
    Min,
    Max,
    Sum,
}

/// One interval's aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub range: TimeRange,
    /// Non-null values seen in the interval.
    pub count: u64,
    /// Timestamp of the representative point (First, Last, Min, Max).
    pub point: Option<Timestamp>,
    /// Aggregated value; `None` for Count and for empty intervals.
    pub value: Option<Value>,
}

/// Read-side engine interface.
pub trait RangeReader {
    /// Fetches every row of `columns` whose timestamp falls in any of
    /// `ranges`, in timestamp order. The first column is the timestamp axis.
    fn read_ranges(
        &self,
        table: &str,
        columns: &[&str],
        ranges: &[TimeRange],
    ) -> Result<Box<dyn RecordBatchReader + Send>, EngineError>;

    /// Computes `aggregation` of `column` over each range, in one request.
    fn aggregate(
        &self,
        table: &str,
        column: &str,
        ranges: &[TimeRange],
        aggregation: Aggregation,
    ) -> Result<Vec<AggregateResult>, EngineError>;
}
