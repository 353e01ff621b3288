//! tsbatch: columnar batch ingestion for time-series storage engines.
//!
//! This crate stages time-series rows or whole columns in memory, flattens
//! them into a column-major, per-table representation, and submits every
//! table to the engine in one call under a chosen push mode.
//!
//! # Features
//!
//! - Row-wise (`add`) and column-wise (`set_column`, Arrow arrays and record
//!   batches) staging, freely mixed within a table
//! - Transactional, truncate-then-insert, fast and asynchronous push modes
//! - Optional deduplication, full-row or keyed on named columns
//! - Scoped pinning of every block handed to the engine, released on all paths
//! - Single-table [`RowWriter`] for frequent small increments
//! - In-process [`MemoryEngine`] implementing both engine interfaces
//!
//! # Quick Start
//!
//! ```
//! use tsbatch::{BatchSession, ColumnInfo, ColumnType, MemoryEngine, PushOptions, Timestamp, Value};
//!
//! # fn main() -> tsbatch::Result<()> {
//! let engine = MemoryEngine::new();
//! engine.create_table(
//!     "sensors",
//!     vec![
//!         ColumnInfo::new("temp", ColumnType::Double),
//!         ColumnInfo::new("count", ColumnType::Int64),
//!     ],
//! )?;
//!
//! let mut session = BatchSession::open(&engine, &["sensors"], PushOptions::new())?;
//! session.add("sensors", Timestamp::from_secs(1), vec![21.5.into(), 3i64.into()])?;
//! session.add("sensors", Timestamp::from_secs(2), vec![Value::Null, 4i64.into()])?;
//!
//! let stats = session.push()?;
//! assert_eq!(stats.rows, 2);
//! assert_eq!(engine.row_count("sensors"), Some(2));
//! # Ok(())
//! # }
//! ```
//!
//! # Module Structure
//!
//! - [`session`]: Multi-table batch sessions
//! - [`row_writer`]: Single-table row writer
//! - [`builder`]: Per-table staging and batch assembly
//! - [`column`]: Typed column handlers
//! - [`pinned`]: Address-stable allocation tracking
//! - [`descriptor`]: Borrowed push descriptors and push modes
//! - [`push`]: Push execution and statistics
//! - [`options`]: Push options
//! - [`schema`]: Table schemas and resolution
//! - [`engine`]: Engine and range-reader interfaces
//! - [`memory`]: In-process engine
//! - [`reader`]: Arrow readers for range fetches
//! - [`types`]: Column types, values and timestamps
//! - [`error`]: Error types

pub mod builder;
pub mod column;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod memory;
pub mod options;
pub mod pinned;
pub mod push;
pub mod reader;
pub mod row_writer;
pub mod schema;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use descriptor::{ColumnBlock, ColumnDescriptor, DedupKey, PushMode, TableDescriptor};
pub use engine::{AggregateResult, Aggregation, Engine, EngineError, RangeReader};
pub use error::{Result, WriterError};
pub use memory::MemoryEngine;
pub use options::{Deduplication, PushOptions};
pub use push::PushStats;
pub use row_writer::RowWriter;
pub use schema::{ColumnInfo, TableSchema, TIMESTAMP_COLUMN};
pub use session::BatchSession;
pub use types::{ColumnType, ColumnValues, TimeRange, Timestamp, Value};
