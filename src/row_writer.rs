//! Single-table row writer.
//!
//! [`RowWriter`] registers a fixed column list of one table up front and
//! accepts rows one at a time. It shares the batch session's assembly and push
//! path, and is meant for frequent small increments.

use crate::builder::TableBuffer;
use crate::engine::Engine;
use crate::error::{Result, WriterError};
use crate::options::PushOptions;
use crate::pinned::PinTracker;
use crate::push::{execute, PushStats};
use crate::schema::{resolve_table, TableSchema};
use crate::types::{TimeRange, Timestamp, Value};

#[derive(Debug)]
struct OpenRow {
    timestamp: Timestamp,
    cells: Vec<Value>,
}

/// Row-at-a-time writer over registered columns of one table.
#[derive(Debug)]
pub struct RowWriter<E: Engine> {
    engine: E,
    buffer: TableBuffer,
    pins: PinTracker,
    open: Option<OpenRow>,
}

impl<E: Engine> RowWriter<E> {
    /// Resolves `table` and registers `columns`, in the given order.
    ///
    /// # Errors
    /// `SchemaNotFound` for an unknown table, `ColumnNotFound` for an unknown
    /// column, `InvalidArgument` for an empty or repeating column list.
    pub fn new<S: AsRef<str>>(engine: E, table: &str, columns: &[S]) -> Result<Self> {
        if columns.is_empty() {
            return Err(WriterError::invalid_argument(format!(
                "No columns registered for table '{}'",
                table
            )));
        }
        let schema = resolve_table(&engine, table)?.project(columns)?;
        log::debug!("row writer on '{}' with {} columns", table, schema.len());
        Ok(Self {
            engine,
            buffer: TableBuffer::new(schema),
            pins: PinTracker::new(),
            open: None,
        })
    }

    /// Registered columns.
    pub fn schema(&self) -> &TableSchema {
        self.buffer.schema()
    }

    /// Rows staged, the open row included.
    pub fn row_count(&self) -> usize {
        self.buffer.row_count() + usize::from(self.open.is_some())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Opens a new row at `timestamp`, closing the previous one.
    pub fn start_row(&mut self, timestamp: Timestamp) -> Result<()> {
        self.commit()?;
        self.open = Some(OpenRow {
            timestamp,
            cells: vec![Value::Null; self.buffer.schema().len()],
        });
        Ok(())
    }

    /// Sets the cell of registered column `index` in the open row.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.buffer.check_value(index, &value)?;
        let row = self
            .open
            .as_mut()
            .ok_or_else(|| WriterError::invalid_argument("set called without an open row"))?;
        row.cells[index] = value;
        Ok(())
    }

    /// Appends a complete row, closing any open one first.
    pub fn append_row(&mut self, timestamp: Timestamp, values: Vec<Value>) -> Result<()> {
        self.commit()?;
        self.buffer.add(timestamp, values)
    }

    fn commit(&mut self) -> Result<()> {
        match self.open.take() {
            Some(row) => self.buffer.add(row.timestamp, row.cells),
            None => Ok(()),
        }
    }

    /// Durable transactional push.
    pub fn push(&mut self) -> Result<PushStats> {
        self.push_with(&PushOptions::transactional())
    }

    /// In-place push for small frequent increments.
    pub fn push_fast(&mut self) -> Result<PushStats> {
        self.push_with(&PushOptions::fast())
    }

    /// Hands the rows to engine-side buffering and returns.
    pub fn push_async(&mut self) -> Result<PushStats> {
        self.push_with(&PushOptions::asynchronous())
    }

    /// Erases `ranges` (or the staged span when empty), then inserts.
    pub fn push_truncate(&mut self, ranges: &[TimeRange]) -> Result<PushStats> {
        self.push_with(&PushOptions::truncate(ranges.iter().copied()))
    }

    /// Pushes with explicit options. Staged rows are cleared either way.
    pub fn push_with(&mut self, options: &PushOptions) -> Result<PushStats> {
        if let Err(err) = self.commit() {
            self.buffer.reset();
            return Err(err);
        }
        execute(
            &self.engine,
            std::slice::from_mut(&mut self.buffer),
            options,
            &mut self.pins,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PushMode;
    use crate::memory::MemoryEngine;
    use crate::schema::ColumnInfo;
    use crate::types::{ColumnType, ColumnValues};

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .create_table(
                "ticks",
                vec![
                    ColumnInfo::new("price", ColumnType::Double),
                    ColumnInfo::new("size", ColumnType::Int64),
                    ColumnInfo::new("venue", ColumnType::String),
                ],
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_registration_order_and_unset_cells() {
        let engine = engine();
        let mut writer = RowWriter::new(&engine, "ticks", &["size", "price"]).unwrap();
        assert_eq!(writer.schema().column(0).unwrap().name, "size");

        writer.start_row(Timestamp::from_secs(1)).unwrap();
        writer.set(1, 10.5).unwrap();
        writer.start_row(Timestamp::from_secs(2)).unwrap();
        writer.set(0, 7i64).unwrap();
        assert_eq!(writer.row_count(), 2);

        writer.push().unwrap();
        let recorded = engine.last_push().unwrap();
        let table = recorded.table("ticks").unwrap();
        assert_eq!(table.row_count, 2);
        assert_eq!(table.column("size"), Some(&ColumnValues::Int64(vec![i64::MIN, 7])));
        match table.column("price") {
            Some(ColumnValues::Double(v)) => {
                assert_eq!(v[0], 10.5);
                assert!(v[1].is_nan());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(table.column("venue").is_none());
        assert_eq!(writer.row_count(), 0);
    }

    #[test]
    fn test_set_without_open_row() {
        let engine = engine();
        let mut writer = RowWriter::new(&engine, "ticks", &["price"]).unwrap();
        assert!(writer.set(0, 1.0).unwrap_err().is_invalid_argument());
        assert!(writer.set(0, "x").unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_unknown_column_rejected() {
        let engine = engine();
        let err = RowWriter::new(&engine, "ticks", &["price", "bid"]).unwrap_err();
        assert!(err.is_column_not_found());
        let err = RowWriter::new(&engine, "ticks", &[] as &[&str]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_push_modes() {
        let engine = engine();
        let mut writer = RowWriter::new(&engine, "ticks", &["price"]).unwrap();

        writer
            .append_row(Timestamp::from_secs(1), vec![1.0.into()])
            .unwrap();
        assert_eq!(writer.push_fast().unwrap().mode, PushMode::Fast);

        writer
            .append_row(Timestamp::from_secs(2), vec![2.0.into()])
            .unwrap();
        assert_eq!(writer.push_async().unwrap().mode, PushMode::Async);
        assert_eq!(engine.pending_async(), 1);
        assert_eq!(engine.row_count("ticks"), Some(2));

        writer
            .append_row(Timestamp::from_secs(1), vec![5.0.into()])
            .unwrap();
        let range = TimeRange::new(Timestamp::from_secs(0), Timestamp::from_secs(10));
        writer.push_truncate(&[range]).unwrap();
        assert_eq!(engine.row_count("ticks"), Some(1));
    }
}
