/// Neighborhood eligibility policy
///
/// Looks at the blocks around a candidate to decide whether an attempt is
/// worth it. Windows are symmetric around the candidate, clamped to the
/// run range, and never include the candidate itself.
use crate::state::StateStore;
use crate::{BlockRange, RescueResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodPolicy {
    /// Require a rescued block within this distance (0 = off)
    pub good_range: u64,
    /// Reject if a heavily failed block is within this distance (0 = off)
    pub failed_range: u64,
    /// Failure count that makes a neighbor "heavily failed". With the
    /// skip-fail option disabled (0) any failed neighbor counts.
    pub skip_fail: u32,
}

impl NeighborhoodPolicy {
    pub fn is_active(&self) -> bool {
        self.good_range > 0 || self.failed_range > 0
    }

    fn heavy_failure_threshold(&self) -> u32 {
        self.skip_fail.max(1)
    }
}

/// Whether `block` may be attempted.
///
/// The caller has already checked the block's own status; this only
/// looks at its neighbors. With no window configured every block is
/// eligible and the store is not touched.
pub fn eligible<M: StateStore + ?Sized>(
    store: &mut M,
    block: u64,
    policy: &NeighborhoodPolicy,
    range: BlockRange,
) -> RescueResult<bool> {
    if !policy.is_active() {
        return Ok(true);
    }

    if policy.failed_range > 0 {
        let threshold = policy.heavy_failure_threshold();
        let (lo, hi) = range.window(block, policy.failed_range);
        for neighbor in (lo..=hi).filter(|&n| n != block) {
            if store.get(neighbor)?.failures() >= threshold {
                tracing::trace!(block, neighbor, "Skipping block next to failed neighbor");
                return Ok(false);
            }
        }
    }

    if policy.good_range > 0 {
        let (lo, hi) = range.window(block, policy.good_range);
        for neighbor in (lo..=hi).filter(|&n| n != block) {
            if store.get(neighbor)?.is_done() {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    Ok(true)
}
