//! Table schema resolution.
//!
//! A session asks the engine for each table's column list exactly once and
//! keeps the result for its whole lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineError};
use crate::error::{Result, WriterError};
use crate::types::{column_type_to_arrow, ColumnType};

/// Name of the implicit timestamp axis in read results.
pub const TIMESTAMP_COLUMN: &str = "$timestamp";

/// One column as declared by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    /// Symbol table backing a Symbol column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_table: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            symbol_table: None,
        }
    }

    pub fn symbol(name: impl Into<String>, symbol_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Symbol,
            symbol_table: Some(symbol_table.into()),
        }
    }
}

/// Resolved, immutable column layout of one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnInfo>,
    index: HashMap<String, usize>,
}

impl TableSchema {
    /// Builds a schema, rejecting duplicate column names.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Result<Self> {
        let name = name.into();
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.name.clone(), i).is_some() {
                return Err(WriterError::invalid_argument(format!(
                    "Table '{}' declares column '{}' twice",
                    name, column.name
                )));
            }
        }
        Ok(Self { name, columns, index })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnInfo> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Looks a column up by name, failing with `ColumnNotFound`.
    pub fn resolve_column(&self, column: &str) -> Result<usize> {
        self.index_of(column)
            .ok_or_else(|| WriterError::column_not_found(&self.name, column))
    }

    /// Returns a schema restricted to `columns`, in the given order.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Result<Self> {
        let projected = columns
            .iter()
            .map(|c| {
                self.resolve_column(c.as_ref())
                    .map(|i| self.columns[i].clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(self.name.clone(), projected)
    }

    /// Arrow schema of range reads: the timestamp axis followed by the columns.
    pub fn to_arrow_schema(&self) -> SchemaRef {
        let mut fields = Vec::with_capacity(self.columns.len() + 1);
        fields.push(Field::new(
            TIMESTAMP_COLUMN,
            DataType::Timestamp(TimeUnit::Nanosecond, None),
            false,
        ));
        fields.extend(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, column_type_to_arrow(c.column_type), true)),
        );
        Arc::new(Schema::new(fields))
    }
}

/// Fetches a table's column list from the engine.
///
/// # Errors
/// `SchemaNotFound` if the engine does not know the table; engine transport
/// failures are passed through.
pub fn resolve_table<E: Engine + ?Sized>(engine: &E, table: &str) -> Result<TableSchema> {
    let columns = engine.list_columns(table).map_err(|e| match e {
        EngineError::TableNotFound(_) => WriterError::schema_not_found(table),
        other => WriterError::from(other),
    })?;
    log::trace!("resolved table '{}' with {} columns", table, columns.len());
    TableSchema::new(table, columns)
}
