/// Block rescue engine
///
/// Drives one of the scan strategies over a block range:
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │  RescueEngine (linear | jump scan)   │
/// └───────┬───────────────────┬──────────┘
///         │                   │
///         ↓                   ↓
/// ┌───────────────┐   ┌────────────────┐
/// │ Neighborhood  │   │  BlockCopier   │
/// │ policy        │   │  attempt/retry │
/// └───────┬───────┘   └───────┬────────┘
///         ↓                   ↓
/// ┌──────────────────────────────────────┐
/// │        StateStore (status bytes)     │
/// └──────────────────────────────────────┘
/// ```
///
/// Everything is strictly sequential. Cancellation is only observed
/// between blocks, so every completed block is already recorded when the
/// engine stops.
pub mod jump;
pub mod linear;
pub mod neighborhood;

#[cfg(test)]
pub(crate) mod test_support;

pub use neighborhood::NeighborhoodPolicy;

use crate::report::BadBlockLog;
use crate::state::{BlockStatus, StateStore};
use crate::transfer::{BlockCopier, SyncData};
use crate::ui::{NullProgress, ProgressReporter};
use crate::{BlockRange, RescueResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default distance between progress updates while walking rescued blocks
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

/// Engine-facing scan parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub range: BlockRange,
    /// Copy tries per block visit, at least 1
    pub retry_count: u32,
    /// Stop at the first failed block
    pub abort_on_error: bool,
    /// Double the step after each failure (linear) / abandon the run
    /// segment on trouble (jump)
    pub skip: bool,
    /// Leave blocks alone once they failed this often (0 = never)
    pub skip_fail: u32,
    /// Walk from the end of the range towards its start
    pub reverse: bool,
    /// Only try blocks with a rescued neighbor this close (0 = off)
    pub good_range: u64,
    /// Avoid blocks with a heavily failed neighbor this close (0 = off)
    pub failed_range: u64,
    /// Run length of the jump scan; 0 selects the linear scan
    pub jump: u64,
    /// Stop the jump scan after this many anchors
    pub max_jumps: Option<u64>,
    /// Sync the destination before every block is recorded as done
    pub sync_state: bool,
    pub progress_interval: u64,
}

impl ScanSettings {
    pub fn new(range: BlockRange) -> Self {
        Self {
            range,
            retry_count: 1,
            abort_on_error: false,
            skip: false,
            skip_fail: 0,
            reverse: false,
            good_range: 0,
            failed_range: 0,
            jump: 0,
            max_jumps: None,
            sync_state: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn mode(&self) -> ScanMode {
        if self.jump > 0 {
            ScanMode::Jump { run_length: self.jump }
        } else if self.reverse {
            ScanMode::Reverse
        } else {
            ScanMode::Forward
        }
    }

    pub fn neighborhood(&self) -> NeighborhoodPolicy {
        NeighborhoodPolicy {
            good_range: self.good_range,
            failed_range: self.failed_range,
            skip_fail: self.skip_fail,
        }
    }
}

/// Which strategy a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    Forward,
    Reverse,
    Jump { run_length: u64 },
}

/// Running ok/bad tallies for one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub ok: u64,
    pub bad: u64,
}

impl Counters {
    pub fn attempted(&self) -> u64 {
        self.ok + self.bad
    }
}

/// Why a scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Linear scan walked off the end of the range
    Completed,
    /// `abort_on_error` hit a failed block
    Aborted { block: u64 },
    /// Cancelled from outside (SIGINT)
    Interrupted,
    /// Jump scan reached `max_jumps`
    JumpLimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub counters: Counters,
    pub stop: StopReason,
    /// Anchors drawn by the jump scan (0 for linear scans)
    pub jumps: u64,
}

pub struct RescueEngine<S, D, M> {
    copier: BlockCopier<S, D>,
    store: M,
    settings: ScanSettings,
    progress: Box<dyn ProgressReporter>,
    bad_log: Option<BadBlockLog>,
    rng: StdRng,
    cancel: Arc<AtomicBool>,
}

impl<S, D, M> RescueEngine<S, D, M>
where
    S: Read + Seek,
    D: Write + Seek + SyncData,
    M: StateStore,
{
    pub fn new(copier: BlockCopier<S, D>, store: M, settings: ScanSettings) -> Self {
        Self {
            copier,
            store,
            settings,
            progress: Box::new(NullProgress),
            bad_log: None,
            rng: StdRng::from_entropy(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_bad_block_log(mut self, log: BadBlockLog) -> Self {
        self.bad_log = Some(log);
        self
    }

    /// Make jump anchors reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Flag that stops the scan before the next block once set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn copier(&self) -> &BlockCopier<S, D> {
        &self.copier
    }

    pub fn store_mut(&mut self) -> &mut M {
        &mut self.store
    }

    pub fn into_parts(self) -> (BlockCopier<S, D>, M) {
        (self.copier, self.store)
    }

    /// Run the configured strategy, then sync destination and state
    pub fn run(&mut self) -> RescueResult<ScanOutcome> {
        self.settings.range.check()?;

        let mode = self.settings.mode();
        tracing::info!(
            range = %self.settings.range,
            mode = ?mode,
            retry_count = self.settings.retry_count,
            skip = self.settings.skip,
            abort_on_error = self.settings.abort_on_error,
            "Starting rescue scan"
        );

        let outcome = match mode {
            ScanMode::Forward | ScanMode::Reverse => self.run_linear()?,
            ScanMode::Jump { .. } => self.run_jump()?,
        };

        // Data before state: a block marked done must be on the destination
        self.copier.sync_destination()?;
        self.store.flush()?;

        tracing::info!(
            ok = outcome.counters.ok,
            bad = outcome.counters.bad,
            stop = ?outcome.stop,
            "Rescue scan finished"
        );

        Ok(outcome)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn progress_due(&self, block: u64) -> bool {
        block % self.settings.progress_interval.max(1) == 0
    }

    /// Decide whether a block that is not done yet gets an attempt
    fn is_eligible(&mut self, block: u64, status: BlockStatus) -> RescueResult<bool> {
        let skip_fail = self.settings.skip_fail;
        if skip_fail > 0 && status.failures() >= skip_fail {
            return Ok(false);
        }

        let policy = self.settings.neighborhood();
        neighborhood::eligible(&mut self.store, block, &policy, self.settings.range)
    }

    /// Attempt `block` and record the result. Returns whether it was copied.
    fn attempt_and_record(
        &mut self,
        block: u64,
        status: BlockStatus,
        counters: &mut Counters,
    ) -> RescueResult<bool> {
        self.progress.update(block, self.settings.range, counters);

        if self.copier.attempt(block, self.settings.retry_count) {
            if self.settings.sync_state {
                self.copier.sync_destination()?;
            }
            counters.ok += 1;
            self.store.set(block, BlockStatus::DONE)?;
            return Ok(true);
        }

        counters.bad += 1;
        let failed = status.record_failure();
        self.store.set(block, failed)?;

        let reason = self
            .copier
            .last_failure()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::warn!(
            block,
            failures = failed.failures(),
            reason = %reason,
            "Block copy failed"
        );

        if let Some(log) = self.bad_log.as_mut() {
            let offset = self.copier.offset_of(block).unwrap_or(u64::MAX);
            // The log is a diagnostic; losing a line never stops the rescue
            if let Err(e) = log.record(block, offset, failed, &reason) {
                tracing::warn!(
                    block,
                    path = %log.path().display(),
                    error = %e,
                    "Failed to append to bad block log"
                );
            }
        }

        Ok(false)
    }
}
