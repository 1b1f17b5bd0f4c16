//! Patch Store
//!
//! Each slot owns a chain of committed patches, newest first. A patch lives in its own chain of pool blocks, the first
//! block starting with a header:
//!
//! -   2 bytes: index of the first block of the next, older, patch.
//! -   4 bytes: logical clock at which the patch was staged.
//! -   4 bytes: lowest address recorded.
//! -   4 bytes: highest address recorded.
//!
//! The copy of the recorded memory immediately follows the header, spilling over the next blocks of the chain.
//!
//! The heads of the chains are durable, and written in place, just like the links between patches: linking a freshly
//! staged patch is a single write, ordered after the patch itself by a barrier. Patches staged during a generation
//! which never got committed are thus reachable after a power loss; they always form a prefix of the chain, and are
//! discarded by the recovery before anything else walks the chain.

use log::{debug, trace, warn};

use crate::{Address, ApplyReport, Error, IntervalNode, PATCH_HEADER_SIZE, PendingPatch, Platform, Range, SweepReport};
use crate::internals::block_pool::{BlockChain, BlockIndex, BlockPool};
use crate::internals::delete_log::{DeleteLog, LinkMutation, LinkTarget};
use crate::internals::double_buffer::DoubleBuffered;
use crate::internals::interval::IntervalTree;
use crate::utils;

const NEXT_OFFSET: usize = 0;
const CLOCK_OFFSET: usize = 2;
const LOW_OFFSET: usize = 6;
const HIGH_OFFSET: usize = 10;

/// The header of a committed patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PatchHeader {
    /// The next, older, patch of the chain.
    pub(crate) next: BlockIndex,
    /// The generation during which the patch was staged.
    pub(crate) clock: u32,
    /// The range recorded.
    pub(crate) range: Range,
}

impl PatchHeader {
    /// Reads the header of the patch starting at `patch`.
    pub(crate) fn read<A>(pool: &BlockPool<A>, patch: BlockIndex) -> Result<Self, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>
    {
        if !pool.contains(patch) {
            return Err(Error::CorruptChain(patch.value()));
        }

        let payload = pool.payload(patch);

        let next = BlockIndex::new(utils::read_u16(payload, NEXT_OFFSET));
        let clock = utils::read_u32(payload, CLOCK_OFFSET);

        let range = Range::new(utils::read_u32(payload, LOW_OFFSET), utils::read_u32(payload, HIGH_OFFSET))
            .filter(|range| !range.is_empty())
            .ok_or(Error::CorruptChain(patch.value()))?;

        Ok(Self { next, clock, range })
    }

    /// Writes the header at the start of `payload`.
    fn write(&self, payload: &mut [u8]) {
        utils::write_u16(payload, NEXT_OFFSET, self.next.value());
        utils::write_u32(payload, CLOCK_OFFSET, self.clock);
        utils::write_u32(payload, LOW_OFFSET, self.range.low());
        utils::write_u32(payload, HIGH_OFFSET, self.range.high());
    }

    /// Returns whether the patch is part of a committed generation, as of `clock`.
    pub(crate) fn is_committed(&self, clock: u32) -> bool { self.clock < clock }
}

/// Which patches a walk considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Visibility {
    /// All linked patches.
    All,
    /// Only the patches committed as of the given clock.
    Committed(u32),
}

impl Visibility {
    fn admits(&self, header: &PatchHeader) -> bool {
        match *self {
            Visibility::All => true,
            Visibility::Committed(clock) => header.is_committed(clock),
        }
    }
}

/// The state of the store, to `rewind` to.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StoreMark<const SLOTS: usize> {
    heads: [BlockIndex; SLOTS],
    max_ranges: [Range; SLOTS],
}

/// PatchStore
pub(crate) struct PatchStore<const SLOTS: usize> {
    //  Durable, written in place.
    heads: [BlockIndex; SLOTS],
    //  Bookkeeping, committed at each checkpoint.
    max_ranges: [Range; SLOTS],
    shadow: DoubleBuffered<[Range; SLOTS]>,
}

impl<const SLOTS: usize> PatchStore<SLOTS> {
    /// Creates a store of empty chains.
    pub(crate) const fn new() -> Self {
        let max_ranges = [Range::EMPTY; SLOTS];

        Self { heads: [BlockIndex::NULL; SLOTS], max_ranges, shadow: DoubleBuffered::new(max_ranges) }
    }

    /// Empties all chains, on a cold boot.
    ///
    /// The blocks are not freed; the pool is expected to be reset alongside.
    pub(crate) fn reset(&mut self) {
        self.heads = [BlockIndex::NULL; SLOTS];
        self.max_ranges = [Range::EMPTY; SLOTS];
        self.shadow.reset(self.max_ranges);
    }

    /// Copies the bookkeeping into the copy written at `clock`.
    pub(crate) fn checkpoint(&mut self, clock: u32) { self.shadow.store(clock, self.max_ranges); }

    /// Copies the bookkeeping committed as of `clock`.
    pub(crate) fn restore(&mut self, clock: u32) { self.max_ranges = self.shadow.load(clock); }

    /// Resynchronizes with the copy just committed, `clock` being the new generation.
    pub(crate) fn post_checkpoint(&mut self, clock: u32) { self.restore(clock); }

    /// Loses the volatile bookkeeping, as a power loss would.
    pub(crate) fn forget(&mut self) { self.max_ranges = [Range::EMPTY; SLOTS]; }

    /// Returns the current state, to `rewind` to.
    pub(crate) fn mark(&self) -> StoreMark<SLOTS> { StoreMark { heads: self.heads, max_ranges: self.max_ranges } }

    /// Unlinks all patches staged since `mark`, without freeing them.
    ///
    /// The blocks are expected to be reclaimed by rewinding the pool alongside.
    pub(crate) fn rewind(&mut self, mark: StoreMark<SLOTS>) {
        self.heads = mark.heads;
        self.max_ranges = mark.max_ranges;
    }

    /// Returns the newest patch of `slot`.
    pub(crate) fn head(&self, slot: usize) -> Result<BlockIndex, Error> {
        self.heads.get(slot).copied().ok_or(Error::InvalidSlot(slot))
    }

    /// Returns the envelope of all ranges recorded in `slot` since its last `new_region`.
    pub(crate) fn max_range(&self, slot: usize) -> Result<Range, Error> {
        self.max_ranges.get(slot).copied().ok_or(Error::InvalidSlot(slot))
    }

    /// Returns the number of patches in the chain of `slot`.
    pub(crate) fn chain_len<A>(&self, pool: &BlockPool<A>, slot: usize) -> Result<usize, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>
    {
        let mut current = self.head(slot)?;
        let mut len = 0;

        while !current.is_null() {
            Self::step(pool, current, len)?;

            current = PatchHeader::read(pool, current)?.next;
            len += 1;
        }

        Ok(len)
    }

    /// Stages `pending` into a new patch at the head of `slot`.
    ///
    /// The live memory of `pending.max_pending_range()` is copied into a freshly allocated chain, stamped with
    /// `clock`. On failure, nothing is linked.
    pub(crate) fn stage<A, P>(
        &mut self,
        pool: &mut BlockPool<A>,
        platform: &P,
        slot: usize,
        pending: &PendingPatch,
        clock: u32,
    )
        -> Result<BlockIndex, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>,
            P: Platform,
    {
        let next = self.head(slot)?;
        let range = pending.max_pending_range();

        if range.is_empty() {
            return Err(Error::EmptyRange);
        }

        let chain = pool.allocate(PATCH_HEADER_SIZE + range.len())?;

        PatchHeader { next, clock, range }.write(pool.payload_mut(chain.head()));

        pool.visit_mut(chain, PATCH_HEADER_SIZE, range.len(), |position, segment| {
            //  Safety:
            //  -   `range` was declared as readable memory by `new_region` or `modify_region`.
            unsafe { platform.read(range.low() + position as Address, segment) };
        })?;

        //  The patch must be durable before it is reachable.
        platform.barrier();

        self.heads[slot] = chain.head();
        self.max_ranges[slot] = pending.max_range();

        debug!("Staged patch {:?} of slot {}: {:?} at clock {}", chain.head(), slot, range, clock);

        Ok(chain.head())
    }

    /// Writes the newest data of every byte recorded in the chain of `slot` back to live memory.
    ///
    /// Patches not admitted by `visibility` are skipped entirely: they neither write nor shadow anything.
    pub(crate) fn apply<A, P>(
        &self,
        pool: &BlockPool<A>,
        platform: &mut P,
        scratch: &mut [IntervalNode],
        slot: usize,
        visibility: Visibility,
    )
        -> Result<ApplyReport, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>,
            P: Platform,
    {
        let mut tree = IntervalTree::new(scratch);
        let mut report = ApplyReport::default();

        let mut current = self.head(slot)?;
        let mut steps = 0;

        while !current.is_null() {
            Self::step(pool, current, steps)?;

            let header = PatchHeader::read(pool, current)?;

            if visibility.admits(&header) {
                let chain = BlockChain::new(current);
                let mut bytes = 0;

                let contributed = tree.resolve(header.range, &mut |fragment: Range| {
                    let offset = PATCH_HEADER_SIZE + header.range.offset_of(fragment.low());

                    bytes += fragment.len();

                    pool.visit(chain, offset, fragment.len(), |position, segment| {
                        //  Safety:
                        //  -   `fragment` is within a range declared as writable memory by `new_region` or
                        //      `modify_region`.
                        unsafe { platform.write(fragment.low() + position as Address, segment) };
                    })
                })?;

                if contributed {
                    report.patches += 1;
                    report.bytes += bytes;
                }
            } else {
                trace!("Skipping uncommitted patch {:?} of slot {}", current, slot);
            }

            current = header.next;
            steps += 1;
        }

        Ok(report)
    }

    /// Deletes the committed patches of `slot` entirely shadowed by newer committed patches.
    ///
    /// Each deletion goes through the delete log.
    pub(crate) fn sweep<A, P>(
        &mut self,
        pool: &mut BlockPool<A>,
        platform: &P,
        log: &mut DeleteLog,
        scratch: &mut [IntervalNode],
        slot: usize,
        clock: u32,
    )
        -> Result<SweepReport, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>,
            P: Platform,
    {
        let mut tree = IntervalTree::new(scratch);
        let mut report = SweepReport::default();

        let mut link = LinkTarget::Origin(slot);
        let mut current = self.head(slot)?;
        let mut steps = 0;

        while !current.is_null() {
            Self::step(pool, current, steps)?;

            let header = PatchHeader::read(pool, current)?;

            //  An uncommitted patch may yet vanish, hence it cannot shadow anything.
            let obsolete = header.is_committed(clock) && !tree.resolve(header.range, &mut |_| Ok(()))?;

            if obsolete {
                debug!("Sweeping obsolete patch {:?} of slot {}: {:?}", current, slot, header.range);

                let mutation = LinkMutation { target: link, victim: current, next: header.next };

                report.blocks += self.delete(pool, platform, log, mutation)?;
                report.patches += 1;
            } else {
                link = LinkTarget::Patch(current);
            }

            current = header.next;
            steps += 1;
        }

        Ok(report)
    }

    /// Completes the delete in progress at the time of a power loss, if any.
    ///
    /// Returns whether a delete was replayed.
    pub(crate) fn recover_delete<A, P>(
        &mut self,
        pool: &mut BlockPool<A>,
        platform: &P,
        log: &mut DeleteLog,
    )
        -> Result<bool, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>,
            P: Platform,
    {
        let mutation = match log.in_progress() {
            Some(mutation) => mutation,
            None => return Ok(false),
        };

        warn!("Replaying interrupted delete of patch {:?}", mutation.victim);

        self.perform(pool, &mutation)?;
        pool.free(BlockChain::new(mutation.victim));

        log.commit(platform);

        Ok(true)
    }

    /// Unlinks, and frees, the patches of `slot` not committed as of `clock`.
    ///
    /// Returns the number of patches discarded.
    pub(crate) fn discard_uncommitted<A>(&mut self, pool: &mut BlockPool<A>, slot: usize, clock: u32)
        -> Result<usize, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>
    {
        let mut discarded = 0;

        loop {
            let head = self.head(slot)?;

            if head.is_null() {
                break;
            }

            Self::step(pool, head, discarded)?;

            let header = PatchHeader::read(pool, head)?;

            //  Chains are ordered newest first, so the uncommitted patches form a prefix.
            if header.is_committed(clock) {
                break;
            }

            warn!("Discarding uncommitted patch {:?} of slot {}, staged at clock {}", head, slot, header.clock);

            self.heads[slot] = header.next;
            pool.free(BlockChain::new(head));

            discarded += 1;
        }

        Ok(discarded)
    }

    /// Marks, in `pool`, every block of every patch of `slot` as in use.
    ///
    /// Returns the number of patches marked.
    pub(crate) fn mark_reachable<A>(&self, pool: &mut BlockPool<A>, slot: usize) -> Result<usize, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>
    {
        let mut current = self.head(slot)?;
        let mut marked = 0;

        while !current.is_null() {
            Self::step(pool, current, marked)?;

            let header = PatchHeader::read(pool, current)?;

            pool.mark(BlockChain::new(current))?;

            current = header.next;
            marked += 1;
        }

        Ok(marked)
    }

    //  Deletes a patch, crash-safely: prepare, perform, free, commit.
    fn delete<A, P>(&mut self, pool: &mut BlockPool<A>, platform: &P, log: &mut DeleteLog, mutation: LinkMutation)
        -> Result<usize, Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>,
            P: Platform,
    {
        log.prepare(platform, mutation);

        self.perform(pool, &mutation)?;
        let freed = pool.free(BlockChain::new(mutation.victim));

        log.commit(platform);

        Ok(freed)
    }

    //  Rewrites the link designated by `mutation`; idempotent.
    fn perform<A>(&mut self, pool: &mut BlockPool<A>, mutation: &LinkMutation) -> Result<(), Error>
        where
            A: AsRef<[u8]> + AsMut<[u8]>
    {
        if !pool.contains(mutation.victim) {
            return Err(Error::CorruptChain(mutation.victim.value()));
        }

        match mutation.target {
            LinkTarget::Origin(slot) => {
                *self.heads.get_mut(slot).ok_or(Error::InvalidSlot(slot))? = mutation.next;
            },
            LinkTarget::Patch(patch) => {
                if !pool.contains(patch) {
                    return Err(Error::CorruptChain(patch.value()));
                }

                utils::write_u16(pool.payload_mut(patch), NEXT_OFFSET, mutation.next.value());
            },
        }

        Ok(())
    }

    //  Checks that `current` is a valid next step of a walk which already took `steps` steps.
    //
    //  Each patch occupies at least one block, hence a walk longer than the pool is a cycle.
    fn step<A>(pool: &BlockPool<A>, current: BlockIndex, steps: usize) -> Result<(), Error> {
        if !pool.contains(current) || steps >= pool.block_count() {
            return Err(Error::CorruptChain(current.value()));
        }

        Ok(())
    }
}

// mod tests
