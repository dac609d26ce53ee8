/// Persistent per-block rescue state
///
/// Every block of the run has one signed status byte:
/// - `> 0`: copied successfully, never touched again
/// - `0`: never attempted
/// - `< 0`: attempted `-status` times, every attempt failed
///
/// The store is what makes a rescue resumable: the next invocation reads
/// it back and skips everything already copied.
pub mod file_store;
pub mod memory_store;

pub use file_store::FileStateStore;
pub use memory_store::MemoryStateStore;

use crate::{BlockRange, RescueResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single block.
///
/// Backed by an `i8`, the on-disk width. Failure counts saturate at
/// [`BlockStatus::MAX_FAILURES`]: a block that failed that often stays at
/// `i8::MIN` instead of wrapping around to a positive "done" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockStatus(i8);

impl BlockStatus {
    /// Never attempted
    pub const UNTRIED: BlockStatus = BlockStatus(0);

    /// Copied successfully
    pub const DONE: BlockStatus = BlockStatus(1);

    /// Highest failure count the status byte can carry
    pub const MAX_FAILURES: u32 = 128;

    pub fn from_raw(raw: i8) -> Self {
        Self(raw)
    }

    /// Decode the on-disk byte
    pub fn from_byte(byte: u8) -> Self {
        Self(byte as i8)
    }

    pub fn raw(self) -> i8 {
        self.0
    }

    pub fn to_byte(self) -> u8 {
        self.0 as u8
    }

    pub fn is_done(self) -> bool {
        self.0 > 0
    }

    pub fn is_untried(self) -> bool {
        self.0 == 0
    }

    pub fn is_failed(self) -> bool {
        self.0 < 0
    }

    /// Number of recorded failures (0 for done or untried blocks)
    pub fn failures(self) -> u32 {
        if self.0 < 0 {
            self.0.unsigned_abs() as u32
        } else {
            0
        }
    }

    /// Status after one more failed attempt.
    ///
    /// Done blocks stay done.
    pub fn record_failure(self) -> Self {
        if self.is_done() {
            return self;
        }
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_done() {
            write!(f, "done")
        } else if self.is_untried() {
            write!(f, "untried")
        } else {
            write!(f, "failed x{}", self.failures())
        }
    }
}

/// Aggregate view of a block range in a state store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub good: u64,
    pub failed: u64,
    pub untried: u64,
    /// Highest failure count seen on any single block
    pub worst_failures: u32,
}

impl RangeSummary {
    pub fn record(&mut self, status: BlockStatus) {
        if status.is_done() {
            self.good += 1;
        } else if status.is_failed() {
            self.failed += 1;
            self.worst_failures = self.worst_failures.max(status.failures());
        } else {
            self.untried += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.good + self.failed + self.untried
    }

    /// Share of the range already rescued, in percent
    pub fn rescued_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.good as f64 / total as f64) * 100.0
    }
}

/// Point-addressable block status storage.
///
/// Errors from a store are fatal to the run: the store is expected to live
/// on healthy media, unlike the source being rescued.
pub trait StateStore {
    /// Status of `block`; blocks never written read as [`BlockStatus::UNTRIED`]
    fn get(&mut self, block: u64) -> RescueResult<BlockStatus>;

    /// Record `status` for `block`. Once this returns, a following `get`
    /// of the same block observes the new value even across a crash.
    fn set(&mut self, block: u64, status: BlockStatus) -> RescueResult<()>;

    /// Count statuses across `range`
    fn summarize(&mut self, range: BlockRange) -> RescueResult<RangeSummary> {
        let mut summary = RangeSummary::default();
        for block in range.start..range.end {
            summary.record(self.get(block)?);
        }
        Ok(summary)
    }

    /// Push everything to stable storage
    fn flush(&mut self) -> RescueResult<()> {
        Ok(())
    }
}

impl<T: StateStore + ?Sized> StateStore for &mut T {
    fn get(&mut self, block: u64) -> RescueResult<BlockStatus> {
        (**self).get(block)
    }

    fn set(&mut self, block: u64, status: BlockStatus) -> RescueResult<()> {
        (**self).set(block, status)
    }

    fn summarize(&mut self, range: BlockRange) -> RescueResult<RangeSummary> {
        (**self).summarize(range)
    }

    fn flush(&mut self) -> RescueResult<()> {
        (**self).flush()
    }
}
