//! Error types for the batch writer.
//!
//! Every failure carries the table (and column, where one applies) it relates
//! to, and maps onto an ADBC status code for callers that speak ADBC.

use std::backtrace::Backtrace;
use std::fmt::{Display, Formatter};

use crate::types::ColumnType;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WriterError>;

/// Error type for batch writer operations.
///
/// Contains the failure classification plus a backtrace captured where the
/// error was raised.
#[derive(Debug)]
pub struct WriterError {
    kind: ErrorKind,
    backtrace: Backtrace,
}

impl WriterError {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates an error for a table the engine does not know.
    pub(crate) fn schema_not_found(table: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaNotFound {
            table: table.into(),
        })
    }

    /// Creates an error for a column name absent from a table's schema.
    pub(crate) fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(ErrorKind::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        })
    }

    /// Creates an error for a value whose type does not match the column.
    pub(crate) fn type_mismatch(
        table: impl Into<String>,
        column: impl Into<String>,
        expected: ColumnType,
        actual: ColumnType,
    ) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            table: table.into(),
            column: column.into(),
            expected,
            actual,
        })
    }

    /// Creates an error for a table whose buffers disagree on row count.
    pub(crate) fn row_count_mismatch(
        table: impl Into<String>,
        what: impl Into<String>,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::new(ErrorKind::RowCountMismatch {
            table: table.into(),
            what: what.into(),
            expected,
            actual,
        })
    }

    /// Creates an error from a non-success engine response.
    pub(crate) fn engine_rejected(code: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineRejected {
            code,
            message: message.into(),
        })
    }

    /// Creates an error for a lost engine connection.
    pub(crate) fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionLost(message.into()))
    }

    /// Creates an error for an input that cannot be converted to a column type.
    pub(crate) fn conversion(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion(msg.into()))
    }

    /// Creates an error for a broken internal invariant.
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(msg.into()))
    }

    /// Creates an error for a malformed call argument.
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument(msg.into()))
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the table this error relates to, if any.
    pub fn table(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::SchemaNotFound { table }
            | ErrorKind::ColumnNotFound { table, .. }
            | ErrorKind::TypeMismatch { table, .. }
            | ErrorKind::RowCountMismatch { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Returns the column this error relates to, if any.
    pub fn column(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::ColumnNotFound { column, .. } | ErrorKind::TypeMismatch { column, .. } => {
                Some(column)
            }
            _ => None,
        }
    }

    /// Returns the engine status code for engine rejections.
    pub fn engine_code(&self) -> Option<i32> {
        match &self.kind {
            ErrorKind::EngineRejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the table is unknown to the engine or the session.
    pub fn is_schema_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::SchemaNotFound { .. })
    }

    /// Returns true if a column name could not be resolved.
    pub fn is_column_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::ColumnNotFound { .. })
    }

    /// Returns true if a value did not match its column's declared type.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.kind, ErrorKind::TypeMismatch { .. })
    }

    /// Returns true if a table's buffers disagreed on row count at push time.
    pub fn is_row_count_mismatch(&self) -> bool {
        matches!(self.kind, ErrorKind::RowCountMismatch { .. })
    }

    /// Returns true if the engine refused the push.
    pub fn is_engine_rejected(&self) -> bool {
        matches!(self.kind, ErrorKind::EngineRejected { .. })
    }

    /// Returns true if the engine connection went away.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self.kind, ErrorKind::ConnectionLost(_))
    }

    /// Returns true if this is a conversion error.
    pub fn is_conversion(&self) -> bool {
        matches!(self.kind, ErrorKind::Conversion(_))
    }

    /// Returns true if a call argument was malformed.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidArgument(_))
    }

    /// Returns the corresponding ADBC status code.
    pub fn adbc_status(&self) -> adbc_core::error::Status {
        use adbc_core::error::Status;

        match &self.kind {
            ErrorKind::SchemaNotFound { .. } | ErrorKind::ColumnNotFound { .. } => {
                Status::NotFound
            }
            ErrorKind::TypeMismatch { .. } | ErrorKind::Conversion(_) => Status::InvalidArguments,
            ErrorKind::RowCountMismatch { .. } => Status::InvalidData,
            ErrorKind::InvalidArgument(_) => Status::InvalidArguments,
            ErrorKind::EngineRejected { .. } => Status::Internal,
            ErrorKind::ConnectionLost(_) => Status::IO,
            ErrorKind::Internal(_) => Status::Internal,
        }
    }
}

impl Display for WriterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("Schema not found: table '{table}' does not exist")]
    SchemaNotFound { table: String },

    #[error("Column not found: '{column}' in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Type mismatch: column '{column}' of table '{table}' expects {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: ColumnType,
        actual: ColumnType,
    },

    #[error("Row count mismatch in table '{table}': {what} has {actual} rows, expected {expected}")]
    RowCountMismatch {
        table: String,
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Engine rejected push (code {code}): {message}")]
    EngineRejected { code: i32, message: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Type conversion error: {0}")]
    Conversion(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Converts `WriterError` to ADBC `Error`.
impl From<WriterError> for adbc_core::error::Error {
    fn from(err: WriterError) -> Self {
        let status = err.adbc_status();
        let mut adbc = adbc_core::error::Error::with_message_and_status(err.to_string(), status);
        if let Some(code) = err.engine_code() {
            adbc.vendor_code = code;
        }
        adbc
    }
}
