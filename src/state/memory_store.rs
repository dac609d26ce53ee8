/// In-memory state store for tests and dry runs
use super::{BlockStatus, StateStore};
use crate::RescueResult;
use std::collections::BTreeMap;

/// Sparse map of recorded statuses. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    statuses: BTreeMap<u64, BlockStatus>,
    writes: u64,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from `(block, status)` pairs
    pub fn with_statuses(statuses: impl IntoIterator<Item = (u64, BlockStatus)>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            writes: 0,
        }
    }

    /// Number of `set` calls seen so far
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Blocks that have ever been written
    pub fn recorded_blocks(&self) -> impl Iterator<Item = u64> + '_ {
        self.statuses.keys().copied()
    }

    /// Statuses of `start..end` as raw values, handy for assertions
    pub fn snapshot(&self, start: u64, end: u64) -> Vec<i8> {
        (start..end)
            .map(|block| self.statuses.get(&block).copied().unwrap_or_default().raw())
            .collect()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&mut self, block: u64) -> RescueResult<BlockStatus> {
        Ok(self.statuses.get(&block).copied().unwrap_or_default())
    }

    fn set(&mut self, block: u64, status: BlockStatus) -> RescueResult<()> {
        self.writes += 1;
        self.statuses.insert(block, status);
        Ok(())
    }
}
