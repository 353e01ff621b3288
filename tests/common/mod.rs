//! Common utilities for integration tests.

#![allow(dead_code)]

use std::sync::Once;

use tsbatch::{ColumnInfo, ColumnType, MemoryEngine, PushOptions, TimeRange, Timestamp};

static INIT: Once = Once::new();

/// Test configuration loaded from environment.
pub struct TestConfig {
    /// Rows generated by the larger tests.
    pub rows: usize,
    /// Options used where a test does not care about the push mode.
    pub options: PushOptions,
}

impl TestConfig {
    /// Loads test configuration from environment variables.
    ///
    /// Falls back to defaults if variables are not set.
    pub fn from_env() -> Self {
        init_logging();

        Self {
            rows: std::env::var("TSBATCH_TEST_ROWS")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or(1_000),
            options: PushOptions::from_env().expect("Invalid push options in environment"),
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Loads `.env` and installs the test logger once per process.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = dotenvy::dotenv();
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Engine with a `sensors` table covering every value type, plus `events`.
pub fn sensor_engine() -> MemoryEngine {
    init_logging();
    let engine = MemoryEngine::new();
    engine
        .create_table(
            "sensors",
            vec![
                ColumnInfo::new("d", ColumnType::Double),
                ColumnInfo::new("i", ColumnType::Int64),
                ColumnInfo::new("s", ColumnType::String),
                ColumnInfo::new("t", ColumnType::Timestamp),
                ColumnInfo::symbol("site", "sites"),
                ColumnInfo::new("raw", ColumnType::Blob),
            ],
        )
        .expect("Failed to create sensors table");
    engine
        .create_table(
            "events",
            vec![
                ColumnInfo::new("code", ColumnType::Int64),
                ColumnInfo::new("msg", ColumnType::String),
            ],
        )
        .expect("Failed to create events table");
    engine
}

/// Nanosecond timestamp `secs` seconds after the epoch.
pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_secs(secs)
}

/// Range covering every timestamp.
pub fn everything() -> TimeRange {
    TimeRange {
        begin: i64::MIN + 1,
        end: i64::MAX,
    }
}
