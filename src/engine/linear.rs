/// Linear scan strategy
///
/// Sweeps the range once, forward or in reverse. With `skip` set the
/// step doubles after every failed block, so a long bad stretch costs a
/// logarithmic number of attempts; the first copied (or already rescued)
/// block drops the step back to 1.
use super::{Counters, RescueEngine, ScanOutcome, StopReason};
use crate::state::StateStore;
use crate::transfer::SyncData;
use crate::RescueResult;
use std::io::{Read, Seek, Write};

impl<S, D, M> RescueEngine<S, D, M>
where
    S: Read + Seek,
    D: Write + Seek + SyncData,
    M: StateStore,
{
    pub(crate) fn run_linear(&mut self) -> RescueResult<ScanOutcome> {
        let range = self.settings.range;
        let forward = !self.settings.reverse;

        let mut counters = Counters::default();
        let mut step: u64 = 1;
        let mut cursor = Some(if forward { range.start } else { range.last() });
        let mut stop = StopReason::Completed;
        let mut final_block = if forward { range.end } else { range.start };

        while let Some(block) = cursor.filter(|&b| range.contains(b)) {
            if self.cancelled() {
                stop = StopReason::Interrupted;
                final_block = block;
                break;
            }

            let status = self.store.get(block)?;

            if status.is_done() {
                if self.progress_due(block) {
                    self.progress.update(block, range, &counters);
                }
                step = 1;
            } else if self.is_eligible(block, status)? {
                if self.attempt_and_record(block, status, &mut counters)? {
                    step = 1;
                } else if self.settings.abort_on_error {
                    stop = StopReason::Aborted { block };
                    final_block = block;
                    break;
                } else if self.settings.skip {
                    step = step.saturating_mul(2);
                }
            }

            cursor = if forward {
                block.checked_add(step)
            } else {
                block.checked_sub(step)
            };
        }

        self.progress.finish(final_block, range, &counters);

        Ok(ScanOutcome {
            counters,
            stop,
            jumps: 0,
        })
    }
}
