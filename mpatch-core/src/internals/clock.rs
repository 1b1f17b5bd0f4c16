//! The global logical clock.
//!
//! The clock is itself double-buffered: committing writes `c + 1` into the copy which does not hold `c`, so that a
//! single word write, ordered after all the data it guards, decides which generation is visible after a restart.

use core::cmp;

use crate::{Platform, utils};

/// LogicalClock
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LogicalClock([u32; 2]);

impl LogicalClock {
    /// Creates a clock at 0.
    pub(crate) const fn new() -> Self { Self([0, 0]) }

    /// Returns the committed generation.
    pub(crate) fn current(&self) -> u32 { cmp::max(self.0[0], self.0[1]) }

    /// Commits the current generation, returning the new one.
    ///
    /// The barrier before the write guarantees that every write of the checkpoint is durable before the bump.
    pub(crate) fn commit<P: Platform>(&mut self, platform: &P) -> u32 {
        let next = self.current() + 1;

        platform.barrier();

        self.0[utils::parity(next)] = next;

        platform.barrier();

        next
    }

    /// Resets to 0, on a cold boot.
    pub(crate) fn reset(&mut self) { self.0 = [0, 0]; }
}

// mod tests
