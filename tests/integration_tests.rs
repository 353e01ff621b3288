//! Integration tests for the batch writer.
//!
//! Every test runs against the in-process engine. Set `RUST_LOG=tsbatch=debug`
//! to see push summaries.

mod common;

use std::sync::Arc;

use arrow_array::{
    Array, BinaryArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampNanosecondArray,
};
use tsbatch::memory::RecordedDedup;
use tsbatch::{
    Aggregation, BatchSession, ColumnInfo, ColumnType, ColumnValues, MemoryEngine, PushMode,
    PushOptions, RangeReader, RowWriter, TimeRange, Timestamp, Value,
};

use common::{everything, sensor_engine, ts, TestConfig};

/// Reads `columns` of `table` over every timestamp as one batch.
fn read_all(engine: &MemoryEngine, table: &str, columns: &[&str]) -> RecordBatch {
    let reader = engine
        .read_ranges(table, columns, &[everything()])
        .expect("Failed to read ranges");
    let mut batches: Vec<RecordBatch> = reader.map(|b| b.expect("Bad batch")).collect();
    assert!(batches.len() <= 1, "Test data should fit in one batch");
    batches.pop().expect("No batch returned")
}

fn null_row() -> Vec<Value> {
    vec![Value::Null; 6]
}

/// Tests that rows added then pushed read back bit-exact.
#[test]
fn test_round_trip() {
    let config = TestConfig::from_env();
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["sensors"], PushOptions::new())
        .expect("Failed to open session");

    let n = config.rows as i64;
    for k in 0..n {
        session
            .add(
                "sensors",
                ts(k),
                vec![
                    Value::Double(k as f64 * 0.1),
                    Value::Int64(k * 1_000_003),
                    Value::String(format!("row-{}", k)),
                    Value::Timestamp(Timestamp::from_millis(k)),
                    Value::Symbol("paris".into()),
                    Value::Blob(vec![k as u8, 0xff]),
                ],
            )
            .expect("Failed to add row");
    }
    let stats = session.push().expect("Failed to push");
    assert_eq!(stats.rows, config.rows);
    assert_eq!(stats.tables, 1);

    let batch = read_all(&engine, "sensors", &["d", "i", "s", "t", "raw"]);
    assert_eq!(batch.num_rows(), config.rows);
    let time = batch.column(0).as_any().downcast_ref::<TimestampNanosecondArray>().unwrap();
    let d = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
    let i = batch.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
    let s = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
    let t = batch.column(4).as_any().downcast_ref::<TimestampNanosecondArray>().unwrap();
    let raw = batch.column(5).as_any().downcast_ref::<BinaryArray>().unwrap();
    for k in 0..config.rows {
        let kk = k as i64;
        assert_eq!(time.value(k), ts(kk).as_nanos());
        assert_eq!(d.value(k).to_bits(), (kk as f64 * 0.1).to_bits());
        assert_eq!(i.value(k), kk * 1_000_003);
        assert_eq!(s.value(k), format!("row-{}", k));
        assert_eq!(t.value(k), Timestamp::from_millis(kk).as_nanos());
        assert_eq!(raw.value(k), [k as u8, 0xff].as_slice());
    }
}

/// Tests the sentinel scenario: NaN and Int64 MIN travel as-is and read back
/// as nulls.
#[test]
fn test_sentinels_read_back_as_null() {
    let engine = MemoryEngine::new();
    engine
        .create_table(
            "pairs",
            vec![
                ColumnInfo::new("d", ColumnType::Double),
                ColumnInfo::new("i", ColumnType::Int64),
            ],
        )
        .unwrap();
    let mut session = BatchSession::open(&engine, &["pairs"], PushOptions::new()).unwrap();
    session.add("pairs", ts(0), vec![1.5.into(), 10i64.into()]).unwrap();
    session
        .add("pairs", ts(1), vec![f64::NAN.into(), i64::MIN.into()])
        .unwrap();
    session.push().unwrap();

    let recorded = engine.last_push().expect("Engine received nothing");
    assert_eq!(recorded.mode, PushMode::Transactional);
    let table = recorded.table("pairs").unwrap();
    assert_eq!(table.row_count, 2);
    match table.column("d") {
        Some(ColumnValues::Double(v)) => {
            assert_eq!(v[0], 1.5);
            assert!(v[1].is_nan());
        }
        other => panic!("Unexpected column d: {:?}", other),
    }
    assert_eq!(table.column("i"), Some(&ColumnValues::Int64(vec![10, i64::MIN])));

    let batch = read_all(&engine, "pairs", &["d", "i"]);
    let d = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
    let i = batch.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!((d.value(0), i.value(0)), (1.5, 10));
    assert!(d.is_null(1));
    assert!(i.is_null(1));
}

/// Tests truncate-then-insert: the interval ends up holding exactly the new rows.
#[test]
fn test_truncate_replaces_interval() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    for k in 0..10 {
        session
            .add("events", ts(k), vec![k.into(), "old".into()])
            .unwrap();
    }
    session.push().unwrap();

    session.add("events", ts(3), vec![100i64.into(), "new".into()]).unwrap();
    session.add("events", ts(4), vec![101i64.into(), "new".into()]).unwrap();
    let interval = TimeRange::new(ts(2), ts(6));
    session.push_with(&PushOptions::truncate([interval])).unwrap();

    let recorded = engine.last_push().unwrap();
    assert_eq!(recorded.mode, PushMode::Truncate);
    assert_eq!(
        recorded.table("events").unwrap().truncate_ranges,
        Some(vec![interval])
    );

    let batch = read_all(&engine, "events", &["code", "msg"]);
    assert_eq!(batch.num_rows(), 8);
    let reader = engine
        .read_ranges("events", &["code", "msg"], &[interval])
        .unwrap();
    let inside: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
    let code = inside[0].column(1).as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(code.values().to_vec(), vec![100, 101]);
}

/// Tests that truncate without explicit ranges erases the staged span only.
#[test]
fn test_truncate_derives_range_from_staged_rows() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    for k in 0..10 {
        session.add("events", ts(k), vec![k.into(), "old".into()]).unwrap();
    }
    session.push().unwrap();

    session.add("events", ts(5), vec![50i64.into(), "new".into()]).unwrap();
    session.add("events", ts(3), vec![30i64.into(), "new".into()]).unwrap();
    session
        .push_with(&PushOptions::new().with_mode(PushMode::Truncate))
        .unwrap();

    let recorded = engine.last_push().unwrap();
    assert_eq!(
        recorded.table("events").unwrap().truncate_ranges,
        Some(vec![TimeRange::new(ts(3), ts(5).next())])
    );
    // 0, 1, 2, 6..9 kept; 3, 4, 5 replaced by the two new rows.
    assert_eq!(engine.row_count("events"), Some(9));
}

/// Tests that truncating explicit ranges with nothing staged erases them.
#[test]
fn test_truncate_with_nothing_staged_erases_ranges() {
    let engine = sensor_engine();
    let mut session =
        BatchSession::open(&engine, &["events", "sensors"], PushOptions::new()).unwrap();
    for k in 0..5 {
        session.add("events", ts(k), vec![k.into(), "old".into()]).unwrap();
    }
    session.push().unwrap();
    assert_eq!(engine.row_count("events"), Some(5));

    let erase = TimeRange::new(ts(0), ts(10));
    let stats = session.push_with(&PushOptions::truncate([erase])).unwrap();
    assert_eq!(stats.tables, 2);
    assert_eq!(stats.rows, 0);
    assert_eq!(engine.row_count("events"), Some(0));

    let recorded = engine.last_push().unwrap();
    let events = recorded.table("events").unwrap();
    assert_eq!(events.row_count, 0);
    assert_eq!(events.truncate_ranges, Some(vec![erase]));

    // Without explicit ranges there is nothing to erase and no call is made.
    let calls = engine.push_count();
    let stats = session
        .push_with(&PushOptions::new().with_mode(PushMode::Truncate))
        .unwrap();
    assert!(stats.is_empty());
    assert_eq!(engine.push_count(), calls);
}

/// Tests that buffers and pins are empty after a successful push and the next
/// cycle behaves like a fresh session.
#[test]
fn test_reset_after_success() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    let first = session.push().unwrap();

    assert_eq!(session.row_count("events").unwrap(), 0);
    assert_eq!(session.column_len("events", "code").unwrap(), 0);
    assert_eq!(session.column_len("events", "msg").unwrap(), 0);
    assert_eq!(session.pinned_allocations(), 0);
    assert_eq!(session.released_allocations(), first.pinned_allocations as u64);

    session.add("events", ts(2), vec![2i64.into(), "b".into()]).unwrap();
    let second = session.push().unwrap();
    assert_eq!(second.rows, 1);
    assert_eq!(second.pinned_allocations, first.pinned_allocations);
    assert_eq!(engine.row_count("events"), Some(2));
}

/// Tests that an engine rejection still clears the session, and a retry
/// requires repopulating.
#[test]
fn test_reset_after_engine_rejection() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    engine.fail_next_push(17, "write conflict");

    let err = session.push().unwrap_err();
    assert!(err.is_engine_rejected());
    assert_eq!(err.engine_code(), Some(17));
    assert!(err.to_string().contains("write conflict"));
    assert_eq!(session.row_count("events").unwrap(), 0);
    assert_eq!(session.pinned_allocations(), 0);

    let stats = session.push().unwrap();
    assert!(stats.is_empty());
    assert_eq!(engine.row_count("events"), Some(0));
}

/// Tests that a lost connection surfaces as ConnectionLost.
#[test]
fn test_connection_lost() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    engine.disconnect();

    let err = session.push().unwrap_err();
    assert!(err.is_connection_lost());
    assert_eq!(err.adbc_status(), adbc_core::error::Status::IO);
    assert_eq!(session.row_count("events").unwrap(), 0);

    let err = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap_err();
    assert!(err.is_connection_lost());
}

/// Tests that mismatched bulk column lengths fail before any engine call.
#[test]
fn test_count_mismatch_makes_no_call() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    session
        .set_timestamps("events", vec![ts(1), ts(2), ts(3)])
        .unwrap();
    session
        .set_column("events", "code", ColumnValues::Int64(vec![1, 2, 3]))
        .unwrap();
    session
        .set_column("events", "msg", ColumnValues::String(vec!["a".into(), "b".into()]))
        .unwrap();

    let err = session.push().unwrap_err();
    assert!(err.is_row_count_mismatch());
    assert_eq!(err.table(), Some("events"));
    assert_eq!(engine.push_count(), 0);
    assert_eq!(session.pinned_allocations(), 0);
    assert_eq!(session.row_count("events").unwrap(), 0);
}

/// Tests that type mismatches are raised at the call, not at push time.
#[test]
fn test_type_mismatch_raised_early() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["sensors"], PushOptions::new()).unwrap();

    let mut row = null_row();
    row[1] = Value::Double(1.0);
    let err = session.add("sensors", ts(1), row).unwrap_err();
    assert!(err.is_type_mismatch());
    assert_eq!(err.column(), Some("i"));

    let err = session
        .set_column("sensors", "raw", ColumnValues::String(vec!["x".into()]))
        .unwrap_err();
    assert!(err.is_type_mismatch());

    // String and Symbol are interchangeable.
    session
        .set_column("sensors", "s", ColumnValues::Symbol(vec!["x".into()]))
        .unwrap();
    session
        .set_column("sensors", "site", ColumnValues::String(vec!["x".into()]))
        .unwrap();

    assert_eq!(session.row_count("sensors").unwrap(), 0);
    assert_eq!(engine.push_count(), 0);
}

/// Tests that a row of the wrong arity is refused.
#[test]
fn test_add_wrong_arity() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    let err = session.add("events", ts(1), vec![1i64.into()]).unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(session.row_count("events").unwrap(), 0);
}

/// Tests that mixing row appends with a bulk column of the same length works.
#[test]
fn test_mixed_population_modes() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    for k in 0..3 {
        session
            .add("events", ts(k), vec![Value::Null, "m".into()])
            .unwrap();
    }
    session
        .set_column("events", "code", ColumnValues::Int64(vec![7, 8, 9]))
        .unwrap();
    session.push().unwrap();

    let batch = read_all(&engine, "events", &["code"]);
    let code = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(code.values().to_vec(), vec![7, 8, 9]);
}

/// Tests several tables travelling in one engine call.
#[test]
fn test_multi_table_single_call() {
    let engine = sensor_engine();
    let mut session =
        BatchSession::open(&engine, &["sensors", "events"], PushOptions::new()).unwrap();
    session
        .set_timestamps("sensors", vec![ts(1), ts(2)])
        .unwrap();
    session
        .set_column("sensors", "d", ColumnValues::Double(vec![0.5, 0.25]))
        .unwrap();
    session.add("events", ts(1), vec![1i64.into(), "boot".into()]).unwrap();

    let stats = session.push().unwrap();
    assert_eq!(stats.tables, 2);
    assert_eq!(stats.rows, 3);
    assert_eq!(engine.push_count(), 1);

    let recorded = engine.last_push().unwrap();
    let sensors = recorded.table("sensors").unwrap();
    assert_eq!(sensors.columns.len(), 1);
    assert_eq!(sensors.timestamps, vec![ts(1).as_nanos(), ts(2).as_nanos()]);
    assert_eq!(recorded.table("events").unwrap().columns.len(), 2);
}

/// Tests that a push over nothing staged succeeds without calling the engine.
#[test]
fn test_empty_push_is_noop() {
    let engine = sensor_engine();
    let mut session =
        BatchSession::open(&engine, &["sensors", "events"], PushOptions::new()).unwrap();
    let stats = session.push().unwrap();
    assert!(stats.is_empty());
    assert_eq!(engine.push_count(), 0);

    let mut empty = BatchSession::open(&engine, &[] as &[&str], PushOptions::new()).unwrap();
    assert!(empty.push().unwrap().is_empty());
}

/// Tests that explicitly staging zero rows still sends an empty descriptor.
#[test]
fn test_zero_rows_staged_sends_empty_descriptor() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    session.set_timestamps("events", Vec::new()).unwrap();
    let stats = session.push().unwrap();
    assert_eq!(stats.tables, 1);
    assert_eq!(stats.rows, 0);
    let recorded = engine.last_push().unwrap();
    assert_eq!(recorded.table("events").unwrap().row_count, 0);
}

/// Tests asynchronous pushes becoming visible on flush or read.
#[test]
fn test_async_push() {
    let engine = sensor_engine();
    let mut session =
        BatchSession::open(&engine, &["events"], PushOptions::asynchronous()).unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    let stats = session.push().unwrap();
    assert_eq!(stats.mode, PushMode::Async);
    assert_eq!(engine.pending_async(), 1);

    let batch = read_all(&engine, "events", &["code"]);
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(engine.pending_async(), 0);
}

/// Tests fast pushes.
#[test]
fn test_fast_push() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::fast()).unwrap();
    for k in 0..5 {
        session.add("events", ts(k), vec![k.into(), "f".into()]).unwrap();
        session.push().unwrap();
    }
    assert_eq!(engine.push_count(), 5);
    assert_eq!(engine.row_count("events"), Some(5));
}

/// Tests full-row deduplication.
#[test]
fn test_unique_full_row() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new().unique())
        .unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    session.push().unwrap();
    assert_eq!(
        engine.last_push().unwrap().table("events").unwrap().dedup,
        RecordedDedup::FullRow
    );

    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    session.add("events", ts(1), vec![2i64.into(), "a".into()]).unwrap();
    session.push().unwrap();
    assert_eq!(engine.row_count("events"), Some(2));
}

/// Tests deduplication keyed on named columns.
#[test]
fn test_unique_on_columns() {
    let engine = sensor_engine();
    let options = PushOptions::new().unique_on("events", ["msg"]);
    let mut session = BatchSession::open(&engine, &["events"], options).unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    session.add("events", ts(1), vec![2i64.into(), "a".into()]).unwrap();
    session.add("events", ts(1), vec![3i64.into(), "b".into()]).unwrap();
    session.push().unwrap();

    assert_eq!(
        engine.last_push().unwrap().table("events").unwrap().dedup,
        RecordedDedup::Columns(vec!["msg".to_string()])
    );
    assert_eq!(engine.row_count("events"), Some(2));
}

/// Tests that an unknown dedup key column fails before the engine is called.
#[test]
fn test_unique_unknown_key_column() {
    let engine = sensor_engine();
    let options = PushOptions::new().unique_on("events", ["nope"]);
    let mut session = BatchSession::open(&engine, &["events"], options).unwrap();
    session.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    let err = session.push().unwrap_err();
    assert!(err.is_column_not_found());
    assert_eq!(engine.push_count(), 0);
    assert_eq!(session.row_count("events").unwrap(), 0);
}

/// Tests bulk population from Arrow arrays.
#[test]
fn test_set_column_arrow() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    session.set_timestamps("events", vec![ts(1), ts(2)]).unwrap();
    session
        .set_column_arrow("events", "code", &Int64Array::from(vec![Some(5), None]))
        .unwrap();
    session
        .set_column_arrow("events", "msg", &StringArray::from(vec![Some("x"), None]))
        .unwrap();
    let err = session
        .set_column_arrow("events", "code", &Float64Array::from(vec![1.0, 2.0]))
        .unwrap_err();
    assert!(err.is_type_mismatch());
    session.push().unwrap();

    let batch = read_all(&engine, "events", &["code", "msg"]);
    let code = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
    let msg = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(code.value(0), 5);
    assert!(code.is_null(1));
    assert_eq!(msg.value(0), "x");
    assert!(msg.is_null(1));
}

/// Tests a shared engine handle across sessions.
#[test]
fn test_sessions_share_engine() {
    let engine = Arc::new(sensor_engine());
    let mut a = BatchSession::open(Arc::clone(&engine), &["events"], PushOptions::new()).unwrap();
    let mut b = BatchSession::open(Arc::clone(&engine), &["events"], PushOptions::new()).unwrap();
    a.add("events", ts(1), vec![1i64.into(), "a".into()]).unwrap();
    b.add("events", ts(2), vec![2i64.into(), "b".into()]).unwrap();
    a.push().unwrap();
    b.push().unwrap();
    a.close();
    b.close();
    assert_eq!(engine.row_count("events"), Some(2));
}

/// Tests the row writer against the same engine as sessions.
#[test]
fn test_row_writer_round_trip() {
    let engine = sensor_engine();
    let mut writer = RowWriter::new(&engine, "sensors", &["i", "d"]).unwrap();
    for k in 0..4 {
        writer.start_row(ts(k)).unwrap();
        writer.set(0, k).unwrap();
        if k % 2 == 0 {
            writer.set(1, k as f64).unwrap();
        }
    }
    let stats = writer.push_fast().unwrap();
    assert_eq!(stats.rows, 4);

    let batch = read_all(&engine, "sensors", &["i", "d", "s"]);
    let i = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
    let d = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
    assert_eq!(i.values().to_vec(), vec![0, 1, 2, 3]);
    assert_eq!(d.null_count(), 2);
    assert_eq!(batch.column(3).null_count(), 4);
}

/// Tests the read-side aggregates over pushed data.
#[test]
fn test_aggregates_over_intervals() {
    let engine = sensor_engine();
    let mut session = BatchSession::open(&engine, &["events"], PushOptions::new()).unwrap();
    for k in 0..20 {
        session.add("events", ts(k), vec![k.into(), "x".into()]).unwrap();
    }
    session.push().unwrap();

    let intervals = [TimeRange::new(ts(0), ts(10)), TimeRange::new(ts(10), ts(20))];
    let sums = engine
        .aggregate("events", "code", &intervals, Aggregation::Sum)
        .unwrap();
    assert_eq!(sums[0].value, Some(Value::Int64(45)));
    assert_eq!(sums[1].value, Some(Value::Int64(145)));

    let firsts = engine
        .aggregate("events", "code", &intervals, Aggregation::First)
        .unwrap();
    assert_eq!(firsts[1].point, Some(ts(10)));
    assert_eq!(firsts[1].count, 10);

    assert!(engine
        .aggregate("events", "msg", &intervals, Aggregation::Sum)
        .is_err());
}
