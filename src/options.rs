//! Push configuration.
//!
//! Options can be built in code, loaded from the environment, deserialized
//! with serde, or set through the ADBC [`Optionable`] surface using the
//! `tsbatch.push.*` keys.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use adbc_core::error::{Error as AdbcError, Result as AdbcResult, Status};
use adbc_core::options::{OptionStatement, OptionValue};
use adbc_core::Optionable;
use serde::{Deserialize, Serialize};

use crate::descriptor::PushMode;
use crate::error::{Result, WriterError};
use crate::types::TimeRange;

/// Option key selecting the push mode.
pub const MODE_OPTION: &str = "tsbatch.push.mode";
/// Option key selecting the deduplication policy.
pub const DEDUP_OPTION: &str = "tsbatch.push.deduplicate";

/// Environment variable read by [`PushOptions::from_env`] for the mode.
pub const MODE_ENV: &str = "TSBATCH_PUSH_MODE";
/// Environment variable read by [`PushOptions::from_env`] for deduplication.
pub const DEDUP_ENV: &str = "TSBATCH_DEDUPLICATE";

/// Deduplication policy applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deduplication {
    /// Every pushed row is inserted.
    #[default]
    Standard,
    /// Rows duplicating an existing row are dropped.
    Unique,
}

impl Deduplication {
    pub fn as_str(self) -> &'static str {
        match self {
            Deduplication::Standard => "standard",
            Deduplication::Unique => "unique",
        }
    }
}

impl fmt::Display for Deduplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Deduplication {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "none" => Ok(Deduplication::Standard),
            "unique" | "drop" => Ok(Deduplication::Unique),
            other => Err(WriterError::invalid_argument(format!(
                "Unknown deduplication mode '{}'",
                other
            ))),
        }
    }
}

/// How one push is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushOptions {
    pub mode: PushMode,
    /// Ranges erased before insert when `mode` is `Truncate`. Left empty,
    /// each table's range is derived from its staged timestamps.
    pub truncate_ranges: Vec<TimeRange>,
    pub deduplication: Deduplication,
    /// Per-table key columns for `Unique`; tables not listed deduplicate on
    /// the full row.
    pub dedup_columns: BTreeMap<String, Vec<String>>,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactional() -> Self {
        Self::default().with_mode(PushMode::Transactional)
    }

    pub fn fast() -> Self {
        Self::default().with_mode(PushMode::Fast)
    }

    pub fn asynchronous() -> Self {
        Self::default().with_mode(PushMode::Async)
    }

    /// Truncate-then-insert over `ranges`.
    pub fn truncate(ranges: impl IntoIterator<Item = TimeRange>) -> Self {
        Self {
            mode: PushMode::Truncate,
            truncate_ranges: ranges.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: PushMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables full-row deduplication.
    pub fn unique(mut self) -> Self {
        self.deduplication = Deduplication::Unique;
        self
    }

    /// Enables deduplication keyed on `columns` for `table`.
    pub fn unique_on<S: Into<String>>(
        mut self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.deduplication = Deduplication::Unique;
        self.dedup_columns
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    /// Reads `TSBATCH_PUSH_MODE` and `TSBATCH_DEDUPLICATE`, keeping defaults
    /// for unset variables.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();
        if let Ok(mode) = std::env::var(MODE_ENV) {
            options.mode = mode.parse()?;
        }
        if let Ok(dedup) = std::env::var(DEDUP_ENV) {
            options.deduplication = dedup.parse()?;
        }
        Ok(options)
    }

    pub(crate) fn dedup_columns_for(&self, table: &str) -> Option<&[String]> {
        self.dedup_columns.get(table).map(Vec::as_slice)
    }
}

fn not_implemented(key: &str) -> AdbcError {
    AdbcError::with_message_and_status(
        format!("Option '{}' not supported", key),
        Status::NotImplemented,
    )
}

impl Optionable for PushOptions {
    type Option = OptionStatement;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> AdbcResult<()> {
        let value = match value {
            OptionValue::String(s) => s,
            _ => {
                return Err(AdbcError::with_message_and_status(
                    format!("Option '{}' expects a string value", key.as_ref()),
                    Status::InvalidArguments,
                ))
            }
        };
        match key.as_ref() {
            MODE_OPTION => self.mode = value.parse()?,
            DEDUP_OPTION => self.deduplication = value.parse()?,
            other => {
                return Err(AdbcError::with_message_and_status(
                    format!("Unknown option '{}'", other),
                    Status::NotFound,
                ))
            }
        }
        Ok(())
    }

    fn get_option_string(&self, key: Self::Option) -> AdbcResult<String> {
        match key.as_ref() {
            MODE_OPTION => Ok(self.mode.as_str().to_string()),
            DEDUP_OPTION => Ok(self.deduplication.as_str().to_string()),
            other => Err(AdbcError::with_message_and_status(
                format!("Unknown option '{}'", other),
                Status::NotFound,
            )),
        }
    }

    fn get_option_bytes(&self, key: Self::Option) -> AdbcResult<Vec<u8>> {
        Err(not_implemented(key.as_ref()))
    }

    fn get_option_int(&self, key: Self::Option) -> AdbcResult<i64> {
        Err(not_implemented(key.as_ref()))
    }

    fn get_option_double(&self, key: Self::Option) -> AdbcResult<f64> {
        Err(not_implemented(key.as_ref()))
    }
}
