/// Jump scan strategy
///
/// Picks a random anchor in the range, runs forward from it for up to
/// `jump` blocks, then backward from `anchor - 1` for up to `jump - 1`
/// blocks, and repeats. Meant for mostly dead media where readable
/// pockets are scattered; it has no natural end and runs until cancelled,
/// until `max_jumps` anchors were drawn, or (with `abort_on_error`) until
/// a run segment hits a failure.
use super::{Counters, RescueEngine, ScanOutcome, StopReason};
use crate::state::StateStore;
use crate::transfer::SyncData;
use crate::RescueResult;
use rand::Rng;
use std::io::{Read, Seek, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// How a run segment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentEnd {
    /// Walked its full length
    Exhausted,
    /// Left the run range
    OutOfRange,
    /// Gave up on an ineligible block (skip / abort mode)
    Abandoned,
    /// Gave up on a failed block (skip / abort mode)
    Failed { block: u64 },
    Interrupted,
}

impl<S, D, M> RescueEngine<S, D, M>
where
    S: Read + Seek,
    D: Write + Seek + SyncData,
    M: StateStore,
{
    pub(crate) fn run_jump(&mut self) -> RescueResult<ScanOutcome> {
        let range = self.settings.range;
        let run_length = self.settings.jump;

        let mut counters = Counters::default();
        let mut jumps: u64 = 0;
        let mut last_anchor = range.start;

        let stop = loop {
            if self.cancelled() {
                break StopReason::Interrupted;
            }
            if self.settings.max_jumps.is_some_and(|max| jumps >= max) {
                break StopReason::JumpLimitReached;
            }

            let anchor = self.rng.gen_range(range.start..range.end);
            jumps += 1;
            last_anchor = anchor;
            tracing::debug!(anchor, jump = jumps, "Jumping to new anchor");

            let forward = self.run_segment(anchor, Direction::Forward, run_length, &mut counters)?;
            let backward = match anchor.checked_sub(1) {
                Some(first) => self.run_segment(
                    first,
                    Direction::Backward,
                    run_length - 1,
                    &mut counters,
                )?,
                None => SegmentEnd::OutOfRange,
            };

            if forward == SegmentEnd::Interrupted || backward == SegmentEnd::Interrupted {
                break StopReason::Interrupted;
            }

            if self.settings.abort_on_error {
                if let SegmentEnd::Failed { block } = forward {
                    break StopReason::Aborted { block };
                }
                if let SegmentEnd::Failed { block } = backward {
                    break StopReason::Aborted { block };
                }
            }
        };

        self.progress.finish(last_anchor, range, &counters);

        Ok(ScanOutcome {
            counters,
            stop,
            jumps,
        })
    }

    /// Walk up to `len` blocks from `first` in `direction`
    fn run_segment(
        &mut self,
        first: u64,
        direction: Direction,
        len: u64,
        counters: &mut Counters,
    ) -> RescueResult<SegmentEnd> {
        let range = self.settings.range;
        let give_up_on_trouble = self.settings.skip || self.settings.abort_on_error;

        for i in 0..len {
            let next = match direction {
                Direction::Forward => first.checked_add(i),
                Direction::Backward => first.checked_sub(i),
            };
            let Some(block) = next.filter(|&b| range.contains(b)) else {
                return Ok(SegmentEnd::OutOfRange);
            };

            if self.cancelled() {
                return Ok(SegmentEnd::Interrupted);
            }

            let status = self.store.get(block)?;
            if status.is_done() {
                if self.progress_due(block) {
                    self.progress.update(block, range, counters);
                }
                continue;
            }

            if !self.is_eligible(block, status)? {
                if give_up_on_trouble {
                    return Ok(SegmentEnd::Abandoned);
                }
                continue;
            }

            if !self.attempt_and_record(block, status, counters)? && give_up_on_trouble {
                return Ok(SegmentEnd::Failed { block });
            }
        }

        Ok(SegmentEnd::Exhausted)
    }
}
