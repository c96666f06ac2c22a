//! Time-boxed tile load queue.
//!
//! Tiles waiting to issue their layer requests are ordered by `(level, seq)`:
//! shallower tiles first, and equal levels in the order they were queued.
//! Each update drains the queue until its time budget is spent, so a burst
//! of new tiles is spread over several frames instead of stalling one.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    time::Duration,
};

use web_time::Instant;

use crate::arena::TileId;

/// Priority queue of tiles waiting to start loading.
#[derive(Debug, Default)]
pub struct LoadQueue {
    heap: BinaryHeap<Reverse<(u32, u64, TileId)>>,
    queued: HashSet<TileId>,
    next_seq: u64,
}

impl LoadQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `tile` at `level`. Returns false if it is already queued.
    pub fn push(&mut self, tile: TileId, level: u32) -> bool {
        if !self.queued.insert(tile) {
            return false;
        }
        self.heap.push(Reverse((level, self.next_seq, tile)));
        self.next_seq += 1;
        true
    }

    /// Take the shallowest, oldest queued tile.
    pub fn pop(&mut self) -> Option<TileId> {
        while let Some(Reverse((_, _, tile))) = self.heap.pop() {
            if self.queued.remove(&tile) {
                return Some(tile);
            }
        }
        None
    }

    /// Drop `tile` from the queue without disturbing the others.
    pub fn remove(&mut self, tile: TileId) -> bool {
        let removed = self.queued.remove(&tile);
        if self.queued.is_empty() {
            self.heap.clear();
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, tile: TileId) -> bool {
        self.queued.contains(&tile)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

/// Wall-clock allowance for one update's worth of work.
#[derive(Debug, Clone, Copy)]
pub struct FrameBudget {
    started: Instant,
    budget: Duration,
}

impl FrameBudget {
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Budget from milliseconds; negative or non-finite values mean none.
    #[must_use]
    pub fn from_millis(millis: f64) -> Self {
        let budget = Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::ZERO);
        Self::start(budget)
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.started.elapsed() >= self.budget
    }
}
