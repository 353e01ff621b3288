//! Truncate-and-reload example.
//!
//! This example loads a day of readings, then replaces one hour of it
//! atomically with corrected data and inspects the result with aggregates.

use tsbatch::{
    Aggregation, BatchSession, ColumnInfo, ColumnType, ColumnValues, MemoryEngine, PushOptions,
    RangeReader, TimeRange, Timestamp,
};

const HOUR: i64 = 3_600;
const DAY_START: i64 = 1_700_006_400;

fn at(secs: i64) -> Timestamp {
    Timestamp::from_secs(DAY_START + secs)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let engine = MemoryEngine::new();
    engine.create_table("meter", vec![ColumnInfo::new("kwh", ColumnType::Double)])?;

    println!("1. Loading 24 hourly readings");
    let mut session = BatchSession::open(&engine, &["meter"], PushOptions::new())?;
    session.set_timestamps(
        "meter",
        (0..24).map(|h| at(h * HOUR)).collect(),
    )?;
    session.set_column("meter", "kwh", ColumnValues::Double(vec![1.0; 24]))?;
    println!("   Done. {} rows", session.push()?.rows);

    println!("\n2. Replacing hour 5 with four corrected quarter-hour readings");
    let begin = at(5 * HOUR);
    let end = at(6 * HOUR);
    session.set_timestamps(
        "meter",
        (0..4).map(|q| at(5 * HOUR + q * 900)).collect(),
    )?;
    session.set_column("meter", "kwh", ColumnValues::Double(vec![0.3, 0.2, 0.25, 0.35]))?;
    let stats = session.push_with(&PushOptions::truncate([TimeRange::new(begin, end)]))?;
    println!("   Done. {} rows in mode {}", stats.rows, stats.mode.as_str());

    println!("\n3. Aggregating per six-hour block");
    let blocks: Vec<TimeRange> = (0..4)
        .map(|b| {
TimeRange::new(at(b * 6 * HOUR), at((b + 1) * 6 * HOUR))
        })
        .collect();
    for (count, sum) in engine
        .aggregate("meter", "kwh", &blocks, Aggregation::Count)?
        .iter()
        .zip(engine.aggregate("meter", "kwh", &blocks, Aggregation::Sum)?)
    {
        println!(
            "   {} .. {}: {} readings, total {:?}",
            count.range.begin(),
            count.range.end(),
            count.count,
            sum.value
        );
    }

    println!("\n4. Total rows: {}", engine.row_count("meter").unwrap_or_default());
    Ok(())
}
