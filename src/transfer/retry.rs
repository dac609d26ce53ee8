/// Retry wrapper around [`BlockCopier::copy_block`]
///
/// Retries are immediate. Backing off on a bad region is the scan
/// strategies' business, not this layer's.
use super::BlockCopier;
use std::io::{Read, Seek, Write};

impl<S: Read + Seek, D: Write + Seek> BlockCopier<S, D> {
    /// Try to copy `block` up to `retry_count` times (at least once).
    ///
    /// Returns `true` on the first success. The error of the last failed
    /// try stays available through [`BlockCopier::last_failure`].
    pub fn attempt(&mut self, block: u64, retry_count: u32) -> bool {
        let tries = retry_count.max(1);

        for try_no in 1..=tries {
            match self.copy_block(block) {
                Ok(()) => {
                    self.set_last_failure(None);
                    return true;
                }
                Err(e) => {
                    tracing::debug!(
                        block,
                        attempt = try_no,
                        max_attempts = tries,
                        short = e.is_short_transfer(),
                        error = %e,
                        "Block copy attempt failed"
                    );
                    self.set_last_failure(Some(e));
                }
            }
        }

        false
    }
}
