pub mod config;
pub mod engine;
pub mod report;
pub mod state;
pub mod transfer;
pub mod ui;

// Re-export the pieces most callers need
pub use config::RescueConfig;
pub use engine::{Counters, RescueEngine, ScanOutcome, ScanSettings, StopReason};
pub use state::{BlockStatus, FileStateStore, MemoryStateStore, RangeSummary, StateStore};
pub use transfer::{BlockCopier, SyncData, TransferError};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal errors. Anything in here ends the run; per-block read/write
/// trouble is a [`TransferError`] and never shows up here.
#[derive(Error, Debug)]
pub enum RescueError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid block range: start_block({start}) >= end_block({end})")]
    InvalidRange { start: u64, end: u64 },

    #[error("State store failure at block {block}")]
    StateStore {
        block: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load configuration")]
    ConfigSource(#[from] ::config::ConfigError),
}

pub type RescueResult<T> = Result<T, RescueError>;

/// Half-open block range `[start, end)`.
///
/// [`BlockRange::new`] and deserialization reject empty ranges. A range
/// built as a struct literal is checked again when a scan starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBlockRange")]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    /// Build a range, rejecting empty or inverted ones
    pub fn new(start: u64, end: u64) -> RescueResult<Self> {
        if start >= end {
            return Err(RescueError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.start && block < self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Last block inside the range
    pub fn last(&self) -> u64 {
        self.end.saturating_sub(1).max(self.start)
    }

    /// Fail with [`RescueError::InvalidRange`] unless `start < end`
    pub fn check(&self) -> RescueResult<()> {
        Self::new(self.start, self.end).map(|_| ())
    }

    /// Symmetric window of `radius` blocks around `center`, clamped to
    /// this range. Returned as an inclusive pair.
    pub fn window(&self, center: u64, radius: u64) -> (u64, u64) {
        let lo = center.saturating_sub(radius).max(self.start);
        let hi = center.saturating_add(radius).min(self.last());
        (lo, hi)
    }
}

#[derive(Deserialize)]
struct RawBlockRange {
    start: u64,
    end: u64,
}

impl TryFrom<RawBlockRange> for BlockRange {
    type Error = RescueError;

    fn try_from(raw: RawBlockRange) -> RescueResult<Self> {
        BlockRange::new(raw.start, raw.end)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
