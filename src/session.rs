//! Multi-table batch sessions.
//!
//! A [`BatchSession`] is opened over a fixed set of tables. Callers stage data
//! with [`add`](BatchSession::add) (row by row) or
//! [`set_column`](BatchSession::set_column) (whole columns), then
//! [`push`](BatchSession::push) sends every table in one engine call. Staged
//! data is cleared after each push, successful or not, so the session can be
//! reused for the next batch.

use std::collections::HashMap;

use adbc_core::error::Result as AdbcResult;
use adbc_core::options::{OptionStatement, OptionValue};
use adbc_core::Optionable;
use arrow_array::{Array, RecordBatch};

use crate::builder::TableBuffer;
use crate::engine::Engine;
use crate::error::{Result, WriterError};
use crate::options::PushOptions;
use crate::pinned::PinTracker;
use crate::push::{execute, PushStats};
use crate::schema::{resolve_table, TableSchema};
use crate::types::{ColumnType, ColumnValues, Timestamp, Value};

/// Staging area for one batch over a fixed set of tables.
///
/// Not meant for concurrent use; open one session per thread.
#[derive(Debug)]
pub struct BatchSession<E: Engine> {
    engine: E,
    tables: Vec<TableBuffer>,
    index: HashMap<String, usize>,
    options: PushOptions,
    pins: PinTracker,
}

impl<E: Engine> BatchSession<E> {
    /// Opens a session, resolving every table's schema through `engine`.
    ///
    /// # Errors
    /// `SchemaNotFound` for an unknown table, `InvalidArgument` for a table
    /// named twice. Nothing is retained on failure.
    pub fn open<S: AsRef<str>>(engine: E, tables: &[S], options: PushOptions) -> Result<Self> {
        let mut buffers = Vec::with_capacity(tables.len());
        let mut index = HashMap::with_capacity(tables.len());
        for name in tables {
            let name = name.as_ref();
            if index.insert(name.to_string(), buffers.len()).is_some() {
                return Err(WriterError::invalid_argument(format!(
                    "Table '{}' listed more than once",
                    name
                )));
            }
            buffers.push(TableBuffer::new(resolve_table(&engine, name)?));
        }
        log::debug!("opened batch session over {} tables", buffers.len());
        Ok(Self {
            engine,
            tables: buffers,
            index,
            options,
            pins: PinTracker::new(),
        })
    }

    fn table(&self, table: &str) -> Result<&TableBuffer> {
        self.index
            .get(table)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| WriterError::schema_not_found(table))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableBuffer> {
        match self.index.get(table) {
            Some(&i) => Ok(&mut self.tables[i]),
            None => Err(WriterError::schema_not_found(table)),
        }
    }

    /// Appends one row: a timestamp plus one value per column, in column
    /// order. A rejected row leaves every buffer untouched.
    pub fn add(&mut self, table: &str, timestamp: Timestamp, values: Vec<Value>) -> Result<()> {
        self.table_mut(table)?.add(timestamp, values)
    }

    /// Replaces a column's staged values.
    pub fn set_column(&mut self, table: &str, column: &str, values: ColumnValues) -> Result<()> {
        let buffer = self.table_mut(table)?;
        let index = buffer.schema().resolve_column(column)?;
        buffer.set_column(index, values)
    }

    /// Replaces a column's staged values from an Arrow array.
    pub fn set_column_arrow(&mut self, table: &str, column: &str, array: &dyn Array) -> Result<()> {
        let values = ColumnValues::try_from_arrow(array)?;
        self.set_column(table, column, values)
    }

    /// Replaces a table's timestamp axis.
    pub fn set_timestamps(&mut self, table: &str, timestamps: Vec<Timestamp>) -> Result<()> {
        self.table_mut(table)?.set_timestamps(timestamps);
        Ok(())
    }

    /// Stages a whole record batch: `timestamp_column` becomes the timestamp
    /// axis and every other field replaces the column of the same name.
    ///
    /// The batch is converted and checked in full before anything is staged.
    pub fn set_record_batch(
        &mut self,
        table: &str,
        batch: &RecordBatch,
        timestamp_column: &str,
    ) -> Result<()> {
        let buffer = self.table_mut(table)?;
        let schema = batch.schema();

        let mut timestamps = None;
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let values = ColumnValues::try_from_arrow(array.as_ref())?;
            if field.name() == timestamp_column {
                timestamps = Some(match values {
                    ColumnValues::Timestamp(v) => v,
                    ColumnValues::Int64(v) => v.into_iter().map(Timestamp::from_nanos).collect(),
                    other => {
                        return Err(WriterError::type_mismatch(
                            table,
                            timestamp_column,
                            ColumnType::Timestamp,
                            other.value_type(),
                        ))
                    }
                });
                continue;
            }
            let index = buffer.schema().resolve_column(field.name())?;
            buffer.check_column(index, &values)?;
            columns.push((index, values));
        }
        let timestamps =
            timestamps.ok_or_else(|| WriterError::column_not_found(table, timestamp_column))?;

        buffer.set_timestamps(timestamps);
        for (index, values) in columns {
            buffer.set_column(index, values)?;
        }
        Ok(())
    }

    /// Sends every staged table using the session's options.
    pub fn push(&mut self) -> Result<PushStats> {
        execute(&self.engine, &mut self.tables, &self.options, &mut self.pins)
    }

    /// Sends every staged table using `options` for this push only.
    pub fn push_with(&mut self, options: &PushOptions) -> Result<PushStats> {
        execute(&self.engine, &mut self.tables, options, &mut self.pins)
    }

    pub fn options(&self) -> &PushOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut PushOptions {
        &mut self.options
    }

    /// Timestamps staged for `table`.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.row_count())
    }

    /// Values staged in one column.
    pub fn column_len(&self, table: &str, column: &str) -> Result<usize> {
        let buffer = self.table(table)?;
        let index = buffer.schema().resolve_column(column)?;
        buffer
            .column_len(index)
            .ok_or_else(|| WriterError::internal(format!("no buffer for column '{}'", column)))
    }

    /// Allocations currently pinned; zero outside of a push.
    pub fn pinned_allocations(&self) -> usize {
        self.pins.len()
    }

    /// Allocations released over the session's lifetime.
    pub fn released_allocations(&self) -> u64 {
        self.pins.released_total()
    }

    /// Schemas of the session's tables, in the order they were opened.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> + '_ {
        self.tables.iter().map(TableBuffer::schema)
    }

    pub fn schema(&self, table: &str) -> Result<&TableSchema> {
        Ok(self.table(table)?.schema())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Discards staged data, releases pinned memory and drops the engine
    /// handle.
    pub fn close(mut self) {
        for table in &mut self.tables {
            table.reset();
        }
        let released = self.pins.release_all();
        log::debug!("closed batch session ({} allocations released)", released);
    }
}

impl<E: Engine> Optionable for BatchSession<E> {
    type Option = OptionStatement;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> AdbcResult<()> {
        self.options.set_option(key, value)
    }

    fn get_option_string(&self, key: Self::Option) -> AdbcResult<String> {
        self.options.get_option_string(key)
    }

    fn get_option_bytes(&self, key: Self::Option) -> AdbcResult<Vec<u8>> {
        self.options.get_option_bytes(key)
    }

    fn get_option_int(&self, key: Self::Option) -> AdbcResult<i64> {
        self.options.get_option_int(key)
    }

    fn get_option_double(&self, key: Self::Option) -> AdbcResult<f64> {
        self.options.get_option_double(key)
    }
}
