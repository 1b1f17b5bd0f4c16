//! Patches, pending and committed.
//!
//! A pending patch describes which live memory a slot watches; at checkpoint time it is staged into a committed patch,
//! an immutable copy of that memory linked at the head of the slot's chain.

use super::Range;

use crate::internals::block_pool::BlockIndex;

/// How a pending patch behaves once staged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchKind {
    /// Staged at every checkpoint, until disabled.
    Continuous,
    /// Staged at the next checkpoint only, then disabled.
    SingleShot,
}

/// PendingPatch
///
/// The tracking state of a slot, between two checkpoints.
///
/// -   `range` is the current range of interest.
/// -   `max_pending_range` is the union of all ranges of interest since the last checkpoint; this is what is staged.
/// -   `max_range` is the union of all ranges of interest since the last `new_region`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingPatch {
    kind: PatchKind,
    range: Range,
    max_pending_range: Range,
    max_range: Range,
    enabled: bool,
}

impl PendingPatch {
    /// A disabled, never used, pending patch.
    pub const EMPTY: PendingPatch = PendingPatch {
        kind: PatchKind::Continuous,
        range: Range::EMPTY,
        max_pending_range: Range::EMPTY,
        max_range: Range::EMPTY,
        enabled: false,
    };

    /// Returns the kind.
    pub fn kind(&self) -> PatchKind { self.kind }

    /// Returns the current range of interest.
    pub fn range(&self) -> Range { self.range }

    /// Returns the range to be staged at the next checkpoint.
    pub fn max_pending_range(&self) -> Range { self.max_pending_range }

    /// Returns the largest range of interest since the last `new_region`.
    pub fn max_range(&self) -> Range { self.max_range }

    /// Returns whether the patch will be staged at the next checkpoint.
    pub fn is_enabled(&self) -> bool { self.enabled }

    /// Returns whether there is anything to stage.
    pub(crate) fn is_stageable(&self) -> bool { self.enabled && !self.max_pending_range.is_empty() }

    /// Starts afresh, forgetting about any previous range.
    pub(crate) fn new_region(&mut self, range: Range, kind: PatchKind) {
        self.kind = kind;
        self.range = range;
        self.max_pending_range = range;
        self.max_range = range;
        self.enabled = true;
    }

    /// Moves the range of interest, whilst remembering the previous ones.
    pub(crate) fn modify_region(&mut self, range: Range, kind: Option<PatchKind>) {
        if let Some(kind) = kind {
            self.kind = kind;
        }

        self.range = range;
        self.max_pending_range = self.max_pending_range.union(&range);
        self.max_range = self.max_range.union(&range);
        self.enabled = true;
    }

    /// Enables staging.
    pub(crate) fn enable(&mut self) { self.enabled = true; }

    /// Disables staging.
    pub(crate) fn disable(&mut self) { self.enabled = false; }

    /// Opens a new accumulation window after a successful stage.
    pub(crate) fn staged(&mut self) {
        self.max_pending_range = self.range;

        if self.kind == PatchKind::SingleShot {
            self.enabled = false;
        }
    }
}

impl Default for PendingPatch {
    fn default() -> Self { Self::EMPTY }
}

/// Handle to a committed patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchHandle(BlockIndex);

impl PatchHandle {
    pub(crate) fn new(head: BlockIndex) -> Self { Self(head) }

    /// Returns the index of the first block of the patch.
    pub fn index(&self) -> u16 { self.0.value() }
}

// mod tests
