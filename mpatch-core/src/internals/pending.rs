//! The table of pending patches, one per slot.
//!
//! The table itself is volatile, mutated freely by the application between checkpoints; a copy is committed at each
//! checkpoint so that a restart resumes the bookkeeping where the checkpoint left it.

use crate::{Error, PendingPatch};
use crate::internals::double_buffer::DoubleBuffered;

/// PendingTable
pub(crate) struct PendingTable<const SLOTS: usize> {
    active: [PendingPatch; SLOTS],
    shadow: DoubleBuffered<[PendingPatch; SLOTS]>,
}

impl<const SLOTS: usize> PendingTable<SLOTS> {
    /// Creates a table of disabled patches.
    pub(crate) const fn new() -> Self {
        let active = [PendingPatch::EMPTY; SLOTS];

        Self { active, shadow: DoubleBuffered::new(active) }
    }

    /// Resets all patches, and their committed copies, to disabled.
    pub(crate) fn reset(&mut self) {
        self.active = [PendingPatch::EMPTY; SLOTS];
        self.shadow.reset(self.active);
    }

    /// Returns the pending patch of `slot`.
    pub(crate) fn get(&self, slot: usize) -> Result<&PendingPatch, Error> {
        self.active.get(slot).ok_or(Error::InvalidSlot(slot))
    }

    /// Returns the pending patch of `slot`, mutably.
    pub(crate) fn get_mut(&mut self, slot: usize) -> Result<&mut PendingPatch, Error> {
        self.active.get_mut(slot).ok_or(Error::InvalidSlot(slot))
    }

    /// Opens a new accumulation window for every stageable patch, once all of them were staged.
    pub(crate) fn staged(&mut self) {
        for patch in self.active.iter_mut().filter(|patch| patch.is_stageable()) {
            patch.staged();
        }
    }

    /// Copies the table into the copy written at `clock`.
    pub(crate) fn checkpoint(&mut self, clock: u32) { self.shadow.store(clock, self.active); }

    /// Copies the copy committed as of `clock` into the table.
    pub(crate) fn restore(&mut self, clock: u32) { self.active = self.shadow.load(clock); }

    /// Resynchronizes the table with the copy just committed, `clock` being the new generation.
    pub(crate) fn post_checkpoint(&mut self, clock: u32) { self.restore(clock); }

    /// Loses the table, as a power loss would.
    pub(crate) fn forget(&mut self) { self.active = [PendingPatch::EMPTY; SLOTS]; }
}

// mod tests
