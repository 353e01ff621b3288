//! Multi-table batch insertion example.
//!
//! This example stages rows and whole columns for two tables and pushes
//! them to the engine in a single transactional call.

use arrow_array::{Float64Array, RecordBatchReader};
use tsbatch::{
    BatchSession, ColumnInfo, ColumnType, ColumnValues, MemoryEngine, PushOptions, RangeReader,
    TimeRange, Timestamp, Value,
};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let rows: i64 = std::env::var("TSBATCH_DEMO_ROWS")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or(10);

    let engine = MemoryEngine::new();

    println!("1. Creating tables 'sensor_data' and 'alerts'");
    engine.create_table(
        "sensor_data",
        vec![
            ColumnInfo::symbol("device_id", "devices"),
            ColumnInfo::new("temperature", ColumnType::Double),
            ColumnInfo::new("humidity", ColumnType::Double),
            ColumnInfo::new("pressure", ColumnType::Int64),
        ],
    )?;
    engine.create_table(
        "alerts",
        vec![
            ColumnInfo::new("level", ColumnType::Int64),
            ColumnInfo::new("message", ColumnType::String),
        ],
    )?;

    let options = PushOptions::from_env()?;
    println!("   Push mode: {}", options.mode.as_str());
    let mut session = BatchSession::open(&engine, &["sensor_data", "alerts"], options)?;

    println!("\n2. Staging {} rows column by column for 'sensor_data'", rows);
    let timestamps: Vec<Timestamp> = (0..rows).map(|k| Timestamp::from_secs(1_700_000_000 + k)).collect();
    session.set_timestamps("sensor_data", timestamps)?;
    session.set_column(
        "sensor_data",
        "device_id",
        ColumnValues::Symbol((0..rows).map(|k| format!("device_{:03}", k % 3)).collect()),
    )?;
    session.set_column(
        "sensor_data",
        "temperature",
        ColumnValues::Double((0..rows).map(|k| 20.0 + k as f64 * 0.25).collect()),
    )?;
    let humidity = Float64Array::from_iter((0..rows).map(|k| if k % 4 == 0 { None } else { Some(55.0) }));
    session.set_column_arrow("sensor_data", "humidity", &humidity)?;
    session.set_column(
        "sensor_data",
        "pressure",
        ColumnValues::Int64((0..rows).map(|k| 1_013 + k % 5).collect()),
    )?;

    println!("\n3. Staging alerts row by row");
    session.add(
        "alerts",
        Timestamp::from_secs(1_700_000_003),
        vec![2i64.into(), "temperature above threshold".into()],
    )?;
    session.add("alerts", Timestamp::from_secs(1_700_000_007), vec![1i64.into(), Value::Null])?;

    println!("\n4. Pushing both tables");
    let stats = session.push()?;
    println!(
        "   Done. {} tables, {} rows, {} pinned blocks ({} bytes)",
        stats.tables, stats.rows, stats.pinned_allocations, stats.pinned_bytes
    );
    println!(
        "   Assembly {:?}, transmission {:?}",
        stats.assembly_time, stats.transmission_time
    );

    println!("\n5. Reading 'sensor_data' back");
    let reader = engine.read_ranges(
        "sensor_data",
        &["device_id", "temperature", "humidity"],
        &[TimeRange::new(Timestamp::from_secs(1_700_000_000), Timestamp::from_secs(1_700_000_005))],
    )?;
    println!("   Schema: {:?}", reader.schema());
    for batch in reader {
        let batch = batch?;
        println!("   Batch with {} rows", batch.num_rows());
    }

    session.close();
    Ok(())
}
