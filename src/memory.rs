//! In-process engine.
//!
//! `MemoryEngine` keeps tables as timestamp-ordered rows behind a mutex and
//! implements both [`Engine`] and [`RangeReader`]. It applies the four push
//! modes, honours deduplication requests, and can be scripted to fail, which
//! makes it the engine used by tests, demos and benches.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use arrow_array::RecordBatchReader;

use crate::descriptor::{DedupKey, PushMode, TableDescriptor};
use crate::engine::{AggregateResult, Aggregation, Engine, EngineError, RangeReader};
use crate::reader::RowBatchBuilder;
use crate::schema::{ColumnInfo, TableSchema, TIMESTAMP_COLUMN};
use crate::types::{ColumnType, ColumnValues, TimeRange, Timestamp, Value};

/// Status code for a column the table does not declare.
pub const STATUS_UNKNOWN_COLUMN: i32 = 2;
/// Status code for a column block whose type differs from the declaration.
pub const STATUS_TYPE_MISMATCH: i32 = 3;
/// Status code for a descriptor whose blocks disagree with its row count.
pub const STATUS_BAD_ROW_COUNT: i32 = 4;
/// Status code for an aggregate the column type cannot support.
pub const STATUS_UNSUPPORTED: i32 = 5;

/// Owned copy of one table descriptor as received by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTable {
    pub name: String,
    pub row_count: usize,
    pub timestamps: Vec<i64>,
    /// Populated columns with raw data, sentinels included.
    pub columns: Vec<(String, ColumnType, ColumnValues)>,
    pub truncate_ranges: Option<Vec<TimeRange>>,
    pub dedup: RecordedDedup,
}

impl RecordedTable {
    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, values)| values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedDedup {
    Disabled,
    FullRow,
    Columns(Vec<String>),
}

/// Owned copy of one push request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPush {
    pub mode: PushMode,
    pub tables: Vec<RecordedTable>,
}

impl RecordedPush {
    pub fn table(&self, name: &str) -> Option<&RecordedTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StoredRow {
    timestamp: i64,
    cells: Vec<Value>,
}

#[derive(Debug)]
struct StoredTable {
    schema: TableSchema,
    /// Sorted by timestamp; equal timestamps keep arrival order.
    rows: Vec<StoredRow>,
}

/// Rows of one table ready to be applied.
#[derive(Debug)]
struct Insert {
    table: String,
    rows: Vec<StoredRow>,
    truncate: Option<Vec<TimeRange>>,
    dedup: Dedup,
}

#[derive(Debug, Clone)]
enum Dedup {
    Disabled,
    FullRow,
    Columns(Vec<usize>),
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, StoredTable>,
    async_buffer: Vec<Insert>,
    scripted_failure: Option<(i32, String)>,
    disconnected: bool,
    push_count: usize,
    last_push: Option<RecordedPush>,
}

/// Engine holding all data in process memory.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates or replaces a table.
    pub fn create_table(&self, name: &str, columns: Vec<ColumnInfo>) -> crate::error::Result<()> {
        let schema = TableSchema::new(name, columns)?;
        log::debug!("created table '{}' ({} columns)", name, schema.len());
        self.lock().tables.insert(
            name.to_string(),
            StoredTable {
                schema,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Applies every buffered asynchronous push.
    pub fn flush(&self) {
        Self::flush_async(&mut self.lock());
    }

    /// Makes the next push fail with `code` without applying anything.
    pub fn fail_next_push(&self, code: i32, message: impl Into<String>) {
        self.lock().scripted_failure = Some((code, message.into()));
    }

    /// Drops the simulated connection; every later call fails.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Push calls received, failed ones included.
    pub fn push_count(&self) -> usize {
        self.lock().push_count
    }

    /// Copy of the most recent push request.
    pub fn last_push(&self) -> Option<RecordedPush> {
        self.lock().last_push.clone()
    }

    /// Stored rows of `table`, flushing asynchronous pushes first.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        let mut state = self.lock();
        Self::flush_async(&mut state);
        state.tables.get(table).map(|t| t.rows.len())
    }

    /// Asynchronous pushes not yet applied.
    pub fn pending_async(&self) -> usize {
        self.lock().async_buffer.len()
    }

    fn flush_async(state: &mut State) {
        let pending = std::mem::take(&mut state.async_buffer);
        if !pending.is_empty() {
            log::trace!("applying {} buffered asynchronous inserts", pending.len());
        }
        for insert in pending {
            Self::apply(state, insert);
        }
    }

    fn check_connected(state: &State) -> Result<(), EngineError> {
        if state.disconnected {
            Err(EngineError::ConnectionLost("engine disconnected".into()))
        } else {
            Ok(())
        }
    }

    /// Converts one descriptor into rows, validating it against the stored
    /// schema.
    fn decode(state: &State, desc: &TableDescriptor<'_>) -> Result<Insert, EngineError> {
        let stored = state
            .tables
            .get(desc.name)
            .ok_or_else(|| EngineError::TableNotFound(desc.name.to_string()))?;
        let schema = &stored.schema;

        if desc.timestamps.len() != desc.row_count {
            return Err(bad_row_count(desc.name, "timestamps", desc.timestamps.len(), desc.row_count));
        }
        let mut slots = Vec::with_capacity(desc.columns.len());
        for column in &desc.columns {
            let index = schema.index_of(column.name).ok_or_else(|| EngineError::Status {
                code: STATUS_UNKNOWN_COLUMN,
                message: format!("unknown column '{}' in table '{}'", column.name, desc.name),
            })?;
            let declared = schema.columns()[index].column_type;
            if !declared.accepts(column.data.block_type()) {
                return Err(EngineError::Status {
                    code: STATUS_TYPE_MISMATCH,
                    message: format!(
                        "column '{}' of table '{}' is {}, got {} data",
                        column.name,
                        desc.name,
                        declared,
                        column.data.block_type()
                    ),
                });
            }
            if column.data.len() != desc.row_count {
                return Err(bad_row_count(desc.name, column.name, column.data.len(), desc.row_count));
            }
            slots.push(index);
        }

        let rows = (0..desc.row_count)
            .map(|row| {
                let mut cells = vec![Value::Null; schema.len()];
                for (column, &index) in desc.columns.iter().zip(&slots) {
                    cells[index] = column.data.value(row);
                }
                StoredRow {
                    timestamp: desc.timestamps[row],
                    cells,
                }
            })
            .collect();

        let dedup = match &desc.dedup {
            DedupKey::Disabled => Dedup::Disabled,
            DedupKey::FullRow => Dedup::FullRow,
            DedupKey::Columns(names) => Dedup::Columns(
                names
                    .iter()
                    .map(|name| {
                        schema.index_of(name).ok_or_else(|| EngineError::Status {
                            code: STATUS_UNKNOWN_COLUMN,
                            message: format!("unknown key column '{}' in table '{}'", name, desc.name),
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(Insert {
            table: desc.name.to_string(),
            rows,
            truncate: desc.truncate_ranges.map(<[TimeRange]>::to_vec),
            dedup,
        })
    }

    fn apply(state: &mut State, insert: Insert) {
        let Some(table) = state.tables.get_mut(&insert.table) else {
            return;
        };
        if let Some(ranges) = &insert.truncate {
            let before = table.rows.len();
            table.rows.retain(|row| {
                !ranges
                    .iter()
                    .any(|r| r.contains(Timestamp::from_nanos(row.timestamp)))
            });
            log::trace!(
                "truncated {} rows from '{}'",
                before - table.rows.len(),
                insert.table
            );
        }
        for row in insert.rows {
            let duplicate = match &insert.dedup {
                Dedup::Disabled => false,
                Dedup::FullRow => table.rows.iter().any(|r| *r == row),
                Dedup::Columns(keys) => table.rows.iter().any(|r| {
                    r.timestamp == row.timestamp && keys.iter().all(|&k| r.cells[k] == row.cells[k])
                }),
            };
            if duplicate {
                continue;
            }
            let at = table.rows.partition_point(|r| r.timestamp <= row.timestamp);
            table.rows.insert(at, row);
        }
    }

    fn record(tables: &[TableDescriptor<'_>], mode: PushMode) -> RecordedPush {
        RecordedPush {
            mode,
            tables: tables
                .iter()
                .map(|t| RecordedTable {
                    name: t.name.to_string(),
                    row_count: t.row_count,
                    timestamps: t.timestamps.to_vec(),
                    columns: t
                        .columns
                        .iter()
                        .map(|c| (c.name.to_string(), c.column_type, c.data.to_values()))
                        .collect(),
                    truncate_ranges: t.truncate_ranges.map(<[TimeRange]>::to_vec),
                    dedup: match &t.dedup {
                        DedupKey::Disabled => RecordedDedup::Disabled,
                        DedupKey::FullRow => RecordedDedup::FullRow,
                        DedupKey::Columns(c) => {
                            RecordedDedup::Columns(c.iter().map(|s| s.to_string()).collect())
                        }
                    },
                })
                .collect(),
        }
    }

    /// Snapshot of `table`'s rows that fall in any of `ranges`.
    fn select(
        &self,
        table: &str,
        ranges: &[TimeRange],
    ) -> Result<(TableSchema, Vec<StoredRow>), EngineError> {
        let mut state = self.lock();
        Self::check_connected(&state)?;
        Self::flush_async(&mut state);
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        let rows = stored
            .rows
            .iter()
            .filter(|row| {
                ranges
                    .iter()
                    .any(|r| r.contains(Timestamp::from_nanos(row.timestamp)))
            })
            .cloned()
            .collect();
        Ok((stored.schema.clone(), rows))
    }
}

fn bad_row_count(table: &str, what: &str, actual: usize, expected: usize) -> EngineError {
    EngineError::Status {
        code: STATUS_BAD_ROW_COUNT,
        message: format!(
            "table '{}': {} has {} rows, descriptor declares {}",
            table, what, actual, expected
        ),
    }
}

impl Engine for MemoryEngine {
    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        let state = self.lock();
        Self::check_connected(&state)?;
        state
            .tables
            .get(table)
            .map(|t| t.schema.columns().to_vec())
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))
    }

    fn push(&self, mode: PushMode, tables: &[TableDescriptor<'_>]) -> Result<(), EngineError> {
        let mut state = self.lock();
        Self::check_connected(&state)?;
        state.push_count += 1;
        state.last_push = Some(Self::record(tables, mode));

        if let Some((code, message)) = state.scripted_failure.take() {
            return Err(EngineError::Status { code, message });
        }

        match mode {
            PushMode::Fast => {
                // Tables are applied one by one; a bad table leaves earlier
                // ones in place.
                for desc in tables {
                    let insert = Self::decode(&state, desc)?;
                    Self::apply(&mut state, insert);
                }
            }
            PushMode::Transactional | PushMode::Truncate | PushMode::Async => {
                let inserts = tables
                    .iter()
                    .map(|desc| Self::decode(&state, desc))
                    .collect::<Result<Vec<_>, _>>()?;
                if mode == PushMode::Async {
                    state.async_buffer.extend(inserts);
                } else {
                    for insert in inserts {
                        Self::apply(&mut state, insert);
                    }
                }
            }
        }
        Ok(())
    }
}

impl RangeReader for MemoryEngine {
    fn read_ranges(
        &self,
        table: &str,
        columns: &[&str],
        ranges: &[TimeRange],
    ) -> Result<Box<dyn RecordBatchReader + Send>, EngineError> {
        let (schema, rows) = self.select(table, ranges)?;
        let wanted: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|c| *c != TIMESTAMP_COLUMN)
            .collect();
        let projected = schema.project(&wanted).map_err(|e| EngineError::Status {
            code: STATUS_UNKNOWN_COLUMN,
            message: e.to_string(),
        })?;
        let indices: Vec<usize> = wanted
            .iter()
            .filter_map(|c| schema.index_of(c))
            .collect();

        let projected_rows: Vec<(i64, Vec<Value>)> = rows
            .into_iter()
            .map(|row| {
                let cells = indices.iter().map(|&i| row.cells[i].clone()).collect();
                (row.timestamp, cells)
            })
            .collect();

        let reader = RowBatchBuilder::new(&projected)
            .build(projected_rows.iter().map(|(ts, cells)| (*ts, cells.as_slice())))
            .map_err(|e| EngineError::Status {
                code: STATUS_UNSUPPORTED,
                message: e.to_string(),
            })?;
        Ok(Box::new(reader))
    }

    fn aggregate(
        &self,
        table: &str,
        column: &str,
        ranges: &[TimeRange],
        aggregation: Aggregation,
    ) -> Result<Vec<AggregateResult>, EngineError> {
        let (schema, rows) = self.select(table, ranges)?;
        let index = schema.index_of(column).ok_or_else(|| EngineError::Status {
            code: STATUS_UNKNOWN_COLUMN,
            message: format!("unknown column '{}' in table '{}'", column, table),
        })?;
        let column_type = schema.columns()[index].column_type;
        let numeric = matches!(
            column_type,
            ColumnType::Double | ColumnType::Int64 | ColumnType::Timestamp
        );
        let supported = match aggregation {
            Aggregation::Count | Aggregation::First | Aggregation::Last => true,
            Aggregation::Min | Aggregation::Max => numeric,
            Aggregation::Sum => matches!(column_type, ColumnType::Double | ColumnType::Int64),
        };
        if !supported {
            return Err(EngineError::Status {
                code: STATUS_UNSUPPORTED,
                message: format!("{:?} is not defined for {} column '{}'", aggregation, column_type, column),
            });
        }

        Ok(ranges
            .iter()
            .map(|range| {
                let points: Vec<(Timestamp, &Value)> = rows
                    .iter()
                    .filter(|row| range.contains(Timestamp::from_nanos(row.timestamp)))
                    .filter(|row| !row.cells[index].is_null())
                    .map(|row| (Timestamp::from_nanos(row.timestamp), &row.cells[index]))
                    .collect();
                aggregate_points(*range, &points, aggregation)
            })
            .collect())
    }
}

fn aggregate_points(
    range: TimeRange,
    points: &[(Timestamp, &Value)],
    aggregation: Aggregation,
) -> AggregateResult {
    let pick = |point: Option<&(Timestamp, &Value)>| match point {
        Some((ts, value)) => (Some(*ts), Some((*value).clone())),
        None => (None, None),
    };
    let (point, value) = match aggregation {
        Aggregation::Count => (None, None),
        Aggregation::First => pick(points.first()),
        Aggregation::Last => pick(points.last()),
        // First occurrence wins on ties.
        Aggregation::Min => pick(points.iter().fold(None, |best, p| match best {
            Some(b) if numeric_key(b.1) <= numeric_key(p.1) => Some(b),
            _ => Some(p),
        })),
        Aggregation::Max => pick(points.iter().fold(None, |best, p| match best {
            Some(b) if numeric_key(b.1) >= numeric_key(p.1) => Some(b),
            _ => Some(p),
        })),
        Aggregation::Sum => (None, sum(points)),
    };
    AggregateResult {
        range,
        count: points.len() as u64,
        point,
        value,
    }
}

fn numeric_key(value: &Value) -> f64 {
    match value {
        Value::Double(v) => *v,
        Value::Int64(v) => *v as f64,
        Value::Timestamp(ts) => ts.as_nanos() as f64,
        _ => f64::NAN,
    }
}

fn sum(points: &[(Timestamp, &Value)]) -> Option<Value> {
    let (_, first) = points.first()?;
    Some(match first {
        Value::Int64(_) => Value::Int64(points.iter().fold(0i64, |acc, (_, v)| match v {
            Value::Int64(x) => acc.saturating_add(*x),
            _ => acc,
        })),
        _ => Value::Double(points.iter().map(|(_, v)| numeric_key(v)).sum()),
    })
}
