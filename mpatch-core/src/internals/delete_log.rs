//! Crash-safe deletion.
//!
//! Deleting a patch means rewriting a single link, the one pointing to the patch, so that it points past it. A power
//! loss may strike between deciding what to write and writing it; hence the log records the intended mutation first:
//!
//! 1.  `prepare`: record the link to rewrite, the patch being freed and the new link value; barrier; raise the flag.
//! 2.  Perform the mutation, and free the patch.
//! 3.  `commit`: barrier; lower the flag.
//!
//! Rewriting the link, and freeing the patch, are both idempotent; if the flag is found raised at boot, replaying
//! them and committing converges to the state the delete would have produced.

use crate::Platform;

use super::block_pool::BlockIndex;

/// The location of a link to a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LinkTarget {
    /// The head of the chain of a slot.
    Origin(usize),
    /// The `next` link of the patch starting at the given block.
    Patch(BlockIndex),
}

/// A single pending link mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LinkMutation {
    /// The link to rewrite.
    pub(crate) target: LinkTarget,
    /// The patch being unlinked, and freed.
    pub(crate) victim: BlockIndex,
    /// The new value of the link.
    pub(crate) next: BlockIndex,
}

/// DeleteLog
#[derive(Clone, Copy, Debug)]
pub(crate) struct DeleteLog {
    in_progress: bool,
    mutation: LinkMutation,
}

impl DeleteLog {
    /// Creates an idle log.
    pub(crate) const fn new() -> Self {
        let mutation = LinkMutation { target: LinkTarget::Origin(0), victim: BlockIndex::NULL, next: BlockIndex::NULL };

        Self { in_progress: false, mutation }
    }

    /// Records `mutation`, then raises the flag.
    pub(crate) fn prepare<P: Platform>(&mut self, platform: &P, mutation: LinkMutation) {
        debug_assert!(!self.in_progress);

        self.mutation = mutation;

        platform.barrier();

        self.in_progress = true;

        platform.barrier();
    }

    /// Returns the mutation in progress, if any.
    pub(crate) fn in_progress(&self) -> Option<LinkMutation> { self.in_progress.then_some(self.mutation) }

    /// Lowers the flag, once the mutation is durable.
    pub(crate) fn commit<P: Platform>(&mut self, platform: &P) {
        platform.barrier();

        self.in_progress = false;

        platform.barrier();
    }

    /// Resets the log, on a cold boot.
    pub(crate) fn reset(&mut self) { *self = Self::new(); }
}

// mod tests
