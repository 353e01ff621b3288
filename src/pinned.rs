//! Address-stable allocations referenced by push descriptors.
//!
//! Descriptors handed to the engine borrow memory owned by a [`PinTracker`].
//! Every block is registered with the tracker the moment it is created, so a
//! push that fails halfway through assembly still releases everything it
//! produced. [`PinScope`] ties the release to the lifetime of one push call.
//!
//! Blocks are heap allocations (`Box`, Arrow buffers) whose contents never
//! move while the tracker's own list grows, which is what makes it safe to
//! hand their addresses across the engine boundary.

use std::ops::{Deref, DerefMut};

use arrow_array::{Array, BinaryArray, StringArray};
use arrow_buffer::ScalarBuffer;

use crate::types::TimeRange;

/// A memory block that stays put until released.
#[derive(Debug)]
pub enum Block {
    /// A table or column name.
    Name(Box<str>),
    Float64(ScalarBuffer<f64>),
    /// Int64 and Timestamp column data, and timestamp axes.
    Int64(ScalarBuffer<i64>),
    Utf8(StringArray),
    Binary(BinaryArray),
    Ranges(Box<[TimeRange]>),
}

impl Block {
    /// Bytes of payload held by this block.
    pub fn byte_size(&self) -> usize {
        match self {
            Block::Name(s) => s.len(),
            Block::Float64(b) => b.len() * std::mem::size_of::<f64>(),
            Block::Int64(b) => b.len() * std::mem::size_of::<i64>(),
            Block::Utf8(a) => a.get_buffer_memory_size(),
            Block::Binary(a) => a.get_buffer_memory_size(),
            Block::Ranges(r) => std::mem::size_of_val(&**r),
        }
    }

    /// Short label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Name(_) => "name",
            Block::Float64(_) => "float64",
            Block::Int64(_) => "int64",
            Block::Utf8(_) => "utf8",
            Block::Binary(_) => "binary",
            Block::Ranges(_) => "ranges",
        }
    }
}

/// Handle to a block registered with a tracker.
///
/// Only meaningful until the tracker is next released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId(usize);

/// One registered block. Dropping it releases the memory.
#[derive(Debug)]
pub struct PinnedAllocation {
    block: Block,
    bytes: usize,
}

impl PinnedAllocation {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Per-session list of pinned allocations.
#[derive(Debug, Default)]
pub struct PinTracker {
    pins: Vec<PinnedAllocation>,
    released_total: u64,
}

impl PinTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a block and returns its handle.
    pub fn pin(&mut self, block: Block) -> PinId {
        let bytes = block.byte_size();
        log::trace!("pin #{} {} ({} bytes)", self.pins.len(), block.kind(), bytes);
        self.pins.push(PinnedAllocation { block, bytes });
        PinId(self.pins.len() - 1)
    }

    /// Copies a name into a pinned block.
    pub fn pin_name(&mut self, name: &str) -> PinId {
        self.pin(Block::Name(name.into()))
    }

    pub fn get(&self, id: PinId) -> Option<&Block> {
        self.pins.get(id.0).map(PinnedAllocation::block)
    }

    /// Returns the pinned name behind `id`, if it is one.
    pub fn name(&self, id: PinId) -> Option<&str> {
        match self.get(id)? {
            Block::Name(s) => Some(&**s),
            _ => None,
        }
    }

    /// Returns the pinned ranges behind `id`, if it is one.
    pub fn ranges(&self, id: PinId) -> Option<&[TimeRange]> {
        match self.get(id)? {
            Block::Ranges(r) => Some(&**r),
            _ => None,
        }
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Bytes currently held.
    pub fn pinned_bytes(&self) -> usize {
        self.pins.iter().map(PinnedAllocation::bytes).sum()
    }

    /// Allocations released over the tracker's lifetime.
    pub fn released_total(&self) -> u64 {
        self.released_total
    }

    /// Releases every allocation and clears the list. Calling it on an
    /// empty tracker does nothing.
    pub fn release_all(&mut self) -> usize {
        let released = self.pins.len();
        if released == 0 {
            return 0;
        }
        log::trace!("releasing {} pinned allocations ({} bytes)", released, self.pinned_bytes());
        self.pins.clear();
        self.released_total += released as u64;
        released
    }

    /// Opens a scope whose end releases everything pinned.
    pub fn scope(&mut self) -> PinScope<'_> {
        PinScope { tracker: self }
    }
}

impl Drop for PinTracker {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Guard releasing a tracker's allocations on every exit path.
#[derive(Debug)]
pub struct PinScope<'t> {
    tracker: &'t mut PinTracker,
}

impl PinScope<'_> {
    /// Releases now and returns how many allocations were freed.
    pub fn release(self) -> usize {
        // Drop runs afterwards and finds the list empty.
        self.tracker.release_all()
    }
}

impl Deref for PinScope<'_> {
    type Target = PinTracker;

    fn deref(&self) -> &PinTracker {
        &*self.tracker
    }
}

impl DerefMut for PinScope<'_> {
    fn deref_mut(&mut self) -> &mut PinTracker {
        &mut *self.tracker
    }
}

impl Drop for PinScope<'_> {
    fn drop(&mut self) {
        self.tracker.release_all();
    }
}
