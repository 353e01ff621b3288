//! Push execution.
//!
//! One push assembles every staged table into pinned blocks, hands the
//! descriptors to the engine in a single call, releases the blocks and resets
//! the tables. Tables are reset whatever the outcome.

use std::time::{Duration, Instant};

use crate::builder::{describe, stage_table, PendingTable, TableBuffer};
use crate::descriptor::PushMode;
use crate::engine::Engine;
use crate::error::{Result, WriterError};
use crate::options::PushOptions;
use crate::pinned::PinTracker;

/// Summary of one completed push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushStats {
    pub mode: PushMode,
    /// Tables sent to the engine; tables with nothing staged are skipped.
    pub tables: usize,
    pub rows: usize,
    /// Blocks pinned for the call, all released before returning.
    pub pinned_allocations: usize,
    pub pinned_bytes: usize,
    pub assembly_time: Duration,
    pub transmission_time: Duration,
}

impl PushStats {
    /// True if the push had nothing to send and made no engine call.
    pub fn is_empty(&self) -> bool {
        self.tables == 0
    }
}

/// Pushes every staged table of `tables` through `engine`.
pub(crate) fn execute<E: Engine + ?Sized>(
    engine: &E,
    tables: &mut [TableBuffer],
    options: &PushOptions,
    pins: &mut PinTracker,
) -> Result<PushStats> {
    let result = transmit(engine, tables, options, pins);
    for table in tables.iter_mut() {
        table.reset();
    }
    match &result {
        Ok(stats) if stats.is_empty() => log::debug!("push: nothing staged"),
        Ok(stats) => log::debug!(
            "push {}: {} tables, {} rows, {} blocks ({} bytes), assembly {:?}, transmission {:?}",
            stats.mode,
            stats.tables,
            stats.rows,
            stats.pinned_allocations,
            stats.pinned_bytes,
            stats.assembly_time,
            stats.transmission_time
        ),
        Err(err) if err.is_engine_rejected() || err.is_connection_lost() => {
            log::warn!("push {} failed: {}", options.mode, err)
        }
        Err(err) => log::debug!("push {} aborted before transmission: {}", options.mode, err),
    }
    result
}

fn transmit<E: Engine + ?Sized>(
    engine: &E,
    tables: &mut [TableBuffer],
    options: &PushOptions,
    pins: &mut PinTracker,
) -> Result<PushStats> {
    if !options.truncate_ranges.is_empty() && options.mode != PushMode::Truncate {
        log::debug!(
            "ignoring {} truncate ranges for {} push",
            options.truncate_ranges.len(),
            options.mode
        );
    }

    let started = Instant::now();
    let mut scope = pins.scope();

    let mut pending: Vec<PendingTable> = Vec::with_capacity(tables.len());
    for table in tables.iter_mut() {
        if let Some(staged) = stage_table(table, options, &mut scope)? {
            pending.push(staged);
        }
    }

    let mut stats = PushStats {
        mode: options.mode,
        tables: pending.len(),
        rows: pending.iter().map(PendingTable::row_count).sum(),
        pinned_allocations: scope.len(),
        pinned_bytes: scope.pinned_bytes(),
        ..PushStats::default()
    };
    if pending.is_empty() {
        return Ok(stats);
    }

    let descriptors = describe(&pending, &scope)?;
    stats.assembly_time = started.elapsed();

    let sent = Instant::now();
    let outcome = engine.push(options.mode, &descriptors);
    stats.transmission_time = sent.elapsed();
    drop(descriptors);

    let released = scope.release();
    log::trace!("released {} blocks after push", released);

    outcome.map_err(WriterError::from)?;
    Ok(stats)
}
