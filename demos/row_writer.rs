//! Row writer example.
//!
//! This example appends small increments to one table through a
//! [`tsbatch::RowWriter`], pushing each increment with a different mode.

use tsbatch::{ColumnInfo, ColumnType, MemoryEngine, RowWriter, Timestamp};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let engine = MemoryEngine::new();

    println!("1. Creating table 'ticks'");
    engine.create_table(
        "ticks",
        vec![
            ColumnInfo::symbol("symbol", "symbols"),
            ColumnInfo::new("price", ColumnType::Double),
            ColumnInfo::new("size", ColumnType::Int64),
            ColumnInfo::new("venue", ColumnType::String),
        ],
    )?;

    // Only the columns this writer fills; 'venue' stays null.
    let mut writer = RowWriter::new(&engine, "ticks", &["symbol", "price", "size"])?;

    println!("\n2. Writing rows cell by cell");
    for k in 0..3 {
        writer.start_row(Timestamp::from_millis(1_700_000_000_000 + k))?;
        writer.set(0, "ABC")?;
        writer.set(1, 101.5 + k as f64)?;
        writer.set(2, 100 * (k + 1))?;
    }
    let stats = writer.push()?;
    println!("   Done. Pushed {} rows transactionally", stats.rows);

    println!("\n3. Appending whole rows and pushing fast");
    writer.append_row(
        Timestamp::from_millis(1_700_000_000_010),
        vec!["XYZ".into(), 42.0.into(), 7i64.into()],
    )?;
    let stats = writer.push_fast()?;
    println!("   Done. Pushed {} rows in fast mode", stats.rows);

    println!("\n4. Pushing asynchronously");
    writer.append_row(
        Timestamp::from_millis(1_700_000_000_020),
        vec!["XYZ".into(), 42.5.into(), 3i64.into()],
    )?;
    writer.push_async()?;
    println!("   Pending async submissions: {}", engine.pending_async());
    engine.flush();

    println!(
        "\n5. Table now holds {} rows",
        engine.row_count("ticks").unwrap_or_default()
    );
    Ok(())
}
