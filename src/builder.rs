//! Columnar batch assembly.
//!
//! Callers stage data into a [`TableBuffer`] per table. At push time, and only
//! then, each buffer is validated and flattened into pinned blocks
//! ([`stage_table`]); once every table is pinned, [`describe`] builds the
//! borrowed descriptors sent to the engine.
//!
//! The tracker is mutated only while staging; descriptors borrow it immutably.

use crate::column::{new_handler, timestamps_to_nanos, ColumnHandler};
use crate::descriptor::{ColumnBlock, ColumnDescriptor, DedupKey, PushMode, TableDescriptor};
use crate::error::{Result, WriterError};
use crate::options::{Deduplication, PushOptions};
use crate::pinned::{Block, PinId, PinTracker};
use crate::schema::TableSchema;
use crate::types::{ColumnType, ColumnValues, TimeRange, Timestamp, Value};

use arrow_buffer::ScalarBuffer;

/// Staged rows and columns of one table.
#[derive(Debug)]
pub struct TableBuffer {
    schema: TableSchema,
    timestamps: Vec<Timestamp>,
    timestamps_set: bool,
    columns: Vec<Box<dyn ColumnHandler>>,
}

impl TableBuffer {
    pub fn new(schema: TableSchema) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| new_handler(c.column_type))
            .collect();
        Self {
            schema,
            timestamps: Vec::new(),
            timestamps_set: false,
            columns,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Number of staged timestamps.
    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn column_len(&self, index: usize) -> Option<usize> {
        self.columns.get(index).map(|c| c.len())
    }

    /// True if anything was staged since the last reset.
    pub fn is_staged(&self) -> bool {
        self.timestamps_set
            || !self.timestamps.is_empty()
            || self.columns.iter().any(|c| c.is_populated())
    }

    /// Checks that `value` may be stored in column `index`.
    pub fn check_value(&self, index: usize, value: &Value) -> Result<()> {
        let column = self.schema.column(index).ok_or_else(|| {
            WriterError::invalid_argument(format!(
                "Column index {} out of range for table '{}' ({} columns)",
                index,
                self.name(),
                self.schema.len()
            ))
        })?;
        match value.value_type() {
            Some(actual) if !column.column_type.accepts(actual) => Err(WriterError::type_mismatch(
                self.name(),
                &column.name,
                column.column_type,
                actual,
            )),
            _ => Ok(()),
        }
    }

    /// Appends one row. The whole row is checked before any column changes.
    pub fn add(&mut self, timestamp: Timestamp, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(WriterError::invalid_argument(format!(
                "Table '{}' has {} columns, got {} values",
                self.name(),
                self.columns.len(),
                values.len()
            )));
        }
        for (index, value) in values.iter().enumerate() {
            self.check_value(index, value)?;
        }

        self.timestamps.push(timestamp);
        let table = self.schema.name();
        let cells = self.schema.columns().iter().zip(&mut self.columns).zip(values);
        for ((info, column), value) in cells {
            column
                .append(value)
                .map_err(|m| WriterError::type_mismatch(table, &info.name, m.expected, m.actual))?;
        }
        Ok(())
    }

    /// Checks that `values` may replace column `index`.
    pub fn check_column(&self, index: usize, values: &ColumnValues) -> Result<()> {
        let column = self.schema.column(index).ok_or_else(|| {
            WriterError::invalid_argument(format!(
                "Column index {} out of range for table '{}'",
                index,
                self.name()
            ))
        })?;
        let actual = values.value_type();
        if !column.column_type.accepts(actual) {
            return Err(WriterError::type_mismatch(
                self.name(),
                &column.name,
                column.column_type,
                actual,
            ));
        }
        Ok(())
    }

    /// Replaces one column's staged values.
    pub fn set_column(&mut self, index: usize, values: ColumnValues) -> Result<()> {
        self.check_column(index, &values)?;
        let info = &self.schema.columns()[index];
        self.columns[index]
            .bulk_set(values)
            .map_err(|m| {
                WriterError::type_mismatch(self.schema.name(), &info.name, m.expected, m.actual)
            })
    }

    /// Replaces the staged timestamp axis.
    pub fn set_timestamps(&mut self, timestamps: Vec<Timestamp>) {
        self.timestamps = timestamps;
        self.timestamps_set = true;
    }

    /// Clears everything staged.
    pub fn reset(&mut self) {
        self.timestamps.clear();
        self.timestamps_set = false;
        for column in &mut self.columns {
            column.reset();
        }
    }

    /// Determines the table's row count and checks every populated buffer
    /// against it.
    pub fn validate(&self) -> Result<usize> {
        let expected = if self.timestamps_set || !self.timestamps.is_empty() {
            self.timestamps.len()
        } else {
            self.columns
                .iter()
                .find(|c| c.is_populated())
                .map_or(0, |c| c.len())
        };

        if self.timestamps.len() != expected {
            return Err(WriterError::row_count_mismatch(
                self.name(),
                "timestamps",
                expected,
                self.timestamps.len(),
            ));
        }
        for (info, column) in self.schema.columns().iter().zip(&self.columns) {
            if column.is_populated() && column.len() != expected {
                return Err(WriterError::row_count_mismatch(
                    self.name(),
                    format!("column '{}'", info.name),
                    expected,
                    column.len(),
                ));
            }
        }
        Ok(expected)
    }

    /// Range covering every non-null staged timestamp, end exclusive.
    ///
    /// The end saturates at `i64::MAX`, so a staged timestamp of exactly
    /// `i64::MAX` falls outside the derived range. Pass explicit ranges to
    /// erase that point.
    fn staged_range(&self) -> Option<TimeRange> {
        let mut valid = self.timestamps.iter().filter(|t| !t.is_null());
        let first = *valid.next()?;
        let (min, max) = valid.fold((first, first), |(lo, hi), &t| (lo.min(t), hi.max(t)));
        Some(TimeRange::new(min, max.next()))
    }
}

/// A populated column whose blocks are pinned.
#[derive(Debug)]
pub(crate) struct PendingColumn {
    name: PinId,
    column_type: ColumnType,
    data: PinId,
}

#[derive(Debug)]
pub(crate) enum PendingDedup {
    Disabled,
    FullRow,
    Columns(Vec<PinId>),
}

/// A table whose blocks are pinned, waiting to be described.
#[derive(Debug)]
pub(crate) struct PendingTable {
    name: PinId,
    row_count: usize,
    timestamps: PinId,
    columns: Vec<PendingColumn>,
    truncate_ranges: Option<PinId>,
    dedup: PendingDedup,
}

impl PendingTable {
    pub(crate) fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Validates one table and moves its staged data into pinned blocks.
///
/// Returns `None` for a table with nothing staged, unless explicit truncate
/// ranges make it an erase-only request. On error, blocks pinned so far stay
/// registered with `pins` and are released with it.
pub(crate) fn stage_table(
    table: &mut TableBuffer,
    options: &PushOptions,
    pins: &mut PinTracker,
) -> Result<Option<PendingTable>> {
    let erase_only = options.mode == PushMode::Truncate && !options.truncate_ranges.is_empty();
    if !table.is_staged() && !erase_only {
        return Ok(None);
    }
    let row_count = table.validate()?;

    let dedup_keys = match options.deduplication {
        Deduplication::Standard => None,
        Deduplication::Unique => match options.dedup_columns_for(table.name()) {
            Some(columns) => {
                for column in columns {
                    table.schema.resolve_column(column)?;
                }
                Some(Some(columns))
            }
            None => Some(None),
        },
    };

    let truncate_range = match options.mode {
        PushMode::Truncate if options.truncate_ranges.is_empty() => table.staged_range(),
        _ => None,
    };

    let name = pins.pin_name(table.name());
    let nanos = timestamps_to_nanos(std::mem::take(&mut table.timestamps));
    let timestamps = pins.pin(Block::Int64(ScalarBuffer::from(nanos)));

    let mut columns = Vec::new();
    for (info, handler) in table.schema.columns().iter().zip(table.columns.iter_mut()) {
        if !handler.is_populated() {
            continue;
        }
        let name = pins.pin_name(&info.name);
        let data = pins.pin(handler.flatten());
        columns.push(PendingColumn {
            name,
            column_type: info.column_type,
            data,
        });
    }

    let truncate_ranges = match options.mode {
        PushMode::Truncate if !options.truncate_ranges.is_empty() => Some(pins.pin(
            Block::Ranges(options.truncate_ranges.clone().into_boxed_slice()),
        )),
        PushMode::Truncate => {
            truncate_range.map(|range| pins.pin(Block::Ranges(vec![range].into_boxed_slice())))
        }
        _ => None,
    };

    let dedup = match dedup_keys {
        None => PendingDedup::Disabled,
        Some(None) => PendingDedup::FullRow,
        Some(Some(keys)) => {
            PendingDedup::Columns(keys.iter().map(|k| pins.pin_name(k)).collect())
        }
    };

    Ok(Some(PendingTable {
        name,
        row_count,
        timestamps,
        columns,
        truncate_ranges,
        dedup,
    }))
}

fn lost_block(id: PinId, wanted: &str) -> WriterError {
    WriterError::internal(format!("pinned block {:?} is not a {}", id, wanted))
}

/// Builds engine descriptors borrowing the pinned blocks.
pub(crate) fn describe<'a>(
    pending: &[PendingTable],
    pins: &'a PinTracker,
) -> Result<Vec<TableDescriptor<'a>>> {
    let name_of = move |id: PinId| -> Result<&'a str> {
        pins.name(id).ok_or_else(|| lost_block(id, "name"))
    };

    pending
        .iter()
        .map(|table| {
            let timestamps: &'a [i64] = match pins.get(table.timestamps) {
                Some(Block::Int64(b)) => &b[..],
                _ => return Err(lost_block(table.timestamps, "timestamp axis")),
            };

            let columns = table
                .columns
                .iter()
                .map(|column| {
                    let data = pins
                        .get(column.data)
                        .and_then(|block| ColumnBlock::from_block(block, column.column_type))
                        .ok_or_else(|| lost_block(column.data, column.column_type.as_str()))?;
                    Ok(ColumnDescriptor {
                        name: name_of(column.name)?,
                        column_type: column.column_type,
                        data,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let truncate_ranges = table
                .truncate_ranges
                .map(|id| pins.ranges(id).ok_or_else(|| lost_block(id, "range list")))
                .transpose()?;

            let dedup = match &table.dedup {
                PendingDedup::Disabled => DedupKey::Disabled,
                PendingDedup::FullRow => DedupKey::FullRow,
                PendingDedup::Columns(ids) => DedupKey::Columns(
                    ids.iter().map(|&id| name_of(id)).collect::<Result<Vec<_>>>()?,
                ),
            };

            Ok(TableDescriptor {
                name: name_of(table.name)?,
                row_count: table.row_count,
                timestamps,
                columns,
                truncate_ranges,
                dedup,
            })
        })
        .collect()
}
