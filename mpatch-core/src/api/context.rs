//! Checkpoint Context.
//!
//! The `CheckpointContext` owns the whole patching machinery of a device:
//!
//! -   The `NonVolatile` bundle: the block pool and its arena, the patch chains, the pending patches, the logical
//!     clock and the delete log.
//! -   The `Platform`, to access live memory.
//! -   The scratch area of the interval resolver.
//!
//! A single instance is expected to live for the whole lifetime of the program, passed around by unique reference.
//!
//! #   Power cycles
//!
//! The durable state survives a power loss, the volatile one does not. On a host, a power cycle is expressed by
//! `power_off`, which hands back the parts with the volatile state lost, followed by `new` then either `initialize`
//! on a cold boot or `restore` on a warm one.

use core::marker::PhantomData;

use log::{debug, info, warn};

use crate::{Address, Configuration, Error, IntervalNode, PatchHandle, PatchKind, PendingPatch, Platform, Properties};
use crate::Range;
use crate::internals::{
    block_pool::BlockPool,
    clock::LogicalClock,
    delete_log::DeleteLog,
    double_buffer::DoubleBuffered,
    patch_store::{PatchStore, Visibility},
    pending::PendingTable,
};

/// The outcome of applying patches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of patches which contributed at least one byte.
    pub patches: usize,
    /// Number of bytes written back to live memory.
    pub bytes: usize,
    /// The outcome of the sweep following the application, if requested.
    pub swept: SweepReport,
}

/// The outcome of a sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of obsolete patches deleted.
    pub patches: usize,
    /// Number of blocks returned to the pool.
    pub blocks: usize,
}

/// The outcome of a restore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Whether a delete interrupted by the power loss was replayed.
    pub replayed_delete: bool,
    /// Number of patches of the interrupted generation discarded.
    pub discarded: usize,
    /// Number of blocks found free, although in use as of the last checkpoint.
    ///
    /// These are the blocks of the patches deleted by the interrupted generation.
    pub reclaimed: usize,
    /// The outcome of applying the committed patches.
    pub applied: ApplyReport,
}

/// NonVolatile
///
/// The state which must survive a power loss, to be placed in non-volatile memory.
///
/// Some of its parts are only committed at checkpoints; their in-use copy is lost on power loss, and restored from
/// the last committed copy.
pub struct NonVolatile<A, const SLOTS: usize> {
    pub(crate) pool: BlockPool<A>,
    pub(crate) store: PatchStore<SLOTS>,
    pub(crate) pending: PendingTable<SLOTS>,
    pub(crate) clock: LogicalClock,
    pub(crate) delete_log: DeleteLog,
    pub(crate) identity: Option<u32>,
    pub(crate) stack_pointer: DoubleBuffered<Address>,
}

impl<A, const SLOTS: usize> NonVolatile<A, SLOTS> {
    /// Creates a blank instance over `arena`.
    ///
    /// Usable in a `static`, so that the whole instance may be placed in a non-volatile section.
    pub const fn new(arena: A) -> Self {
        Self {
            pool: BlockPool::new(arena),
            store: PatchStore::new(),
            pending: PendingTable::new(),
            clock: LogicalClock::new(),
            delete_log: DeleteLog::new(),
            identity: None,
            stack_pointer: DoubleBuffered::new(0),
        }
    }

    //  Loses the volatile copies, as a power loss would.
    fn forget(&mut self) {
        self.pool.forget();
        self.store.forget();
        self.pending.forget();
    }
}

impl<A, const SLOTS: usize> NonVolatile<A, SLOTS>
    where
        A: AsRef<[u8]> + AsMut<[u8]>
{
    /// Returns the number of blocks carved out of the arena, for the configuration `C`.
    ///
    /// Useful to size the interval scratch area, see `Properties::scratch_nodes`.
    pub fn block_count<C: Configuration>(&self) -> usize { Properties::<C>::block_count(self.pool.arena_len()) }
}

/// CheckpointContext
pub struct CheckpointContext<C, P, A, S, const SLOTS: usize> {
    platform: P,
    nv: NonVolatile<A, SLOTS>,
    scratch: S,
    _configuration: PhantomData<C>,
}

impl<C, P, A, S, const SLOTS: usize> CheckpointContext<C, P, A, S, SLOTS>
    where
        C: Configuration,
        P: Platform,
        A: AsRef<[u8]> + AsMut<[u8]>,
        S: AsMut<[IntervalNode]>,
{
    /// Powers on.
    ///
    /// Validates the configuration against the arena and the scratch area, then sets up the geometry of the pool.
    /// The volatile state is lost: either `initialize` or `restore` must be called before anything else.
    ///
    /// Fails with `Error::Misconfigured` if no block fits in the arena, if a block cannot hold a patch header, or if
    /// the scratch area holds fewer than `Properties::<C>::scratch_nodes(blocks)` nodes.
    pub fn new(platform: P, mut nv: NonVolatile<A, SLOTS>, mut scratch: S) -> Result<Self, Error> {
        let blocks = Properties::<C>::validate(nv.pool.arena_len())?;

        if scratch.as_mut().len() < Properties::<C>::scratch_nodes(blocks) {
            return Err(Error::Misconfigured("interval scratch too small"));
        }

        nv.pool.configure(C::BLOCK_PAYLOAD, blocks);
        nv.forget();

        debug!("Powered on: {} blocks of {} bytes, {} slots", blocks, C::BLOCK_PAYLOAD, SLOTS);

        Ok(Self { platform, nv, scratch, _configuration: PhantomData })
    }

    /// Powers off, handing back the parts, with the volatile state lost.
    pub fn power_off(mut self) -> (P, NonVolatile<A, SLOTS>, S) {
        self.nv.forget();

        (self.platform, self.nv, self.scratch)
    }

    /// Starts afresh: no patch, no pending patch, clock at 0, no restore point.
    pub fn initialize(&mut self) {
        let nv = &mut self.nv;

        nv.pool.reset();
        nv.store.reset();
        nv.pending.reset();
        nv.clock.reset();
        nv.delete_log.reset();
        nv.identity = None;
        nv.stack_pointer.reset(0);

        self.platform.barrier();

        info!("Initialized: {} blocks free", nv.pool.free_count());
    }

    /// Returns a reference to the platform.
    pub fn platform(&self) -> &P { &self.platform }

    /// Returns a mutable reference to the platform.
    pub fn platform_mut(&mut self) -> &mut P { &mut self.platform }

    /// Returns the committed generation.
    pub fn clock(&self) -> u32 { self.nv.clock.current() }

    /// Returns the number of free blocks.
    pub fn free_blocks(&self) -> usize { self.nv.pool.free_count() }

    /// Returns the number of blocks of the pool.
    pub fn block_count(&self) -> usize { self.nv.pool.block_count() }

    /// Returns the number of patches in the chain of `slot`.
    pub fn chain_len(&self, slot: usize) -> Result<usize, Error> { self.nv.store.chain_len(&self.nv.pool, slot) }

    /// Returns the envelope of all ranges staged for `slot` since its last `new_region`.
    pub fn origin_range(&self, slot: usize) -> Result<Range, Error> { self.nv.store.max_range(slot) }

    /// Returns the pending patch of `slot`.
    pub fn pending(&self, slot: usize) -> Result<PendingPatch, Error> { self.nv.pending.get(slot).copied() }

    /// Starts tracking `range` for `slot`, forgetting about any previously tracked range.
    ///
    /// The patches already committed for `slot` remain valid until shadowed.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `range` is mapped, readable and writable, memory of the platform for as long as any patch of
    ///     `slot` may be staged or applied.
    pub unsafe fn new_region(&mut self, slot: usize, range: Range, kind: PatchKind) -> Result<(), Error> {
        if range.is_empty() {
            return Err(Error::EmptyRange);
        }

        self.nv.pending.get_mut(slot)?.new_region(range, kind);

        Ok(())
    }

    /// Moves the tracked range of `slot` to `range`, whilst still staging the previously tracked ranges at the next
    /// checkpoint.
    ///
    /// `kind`, if any, replaces the kind of the pending patch.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `range` is mapped, readable and writable, memory of the platform for as long as any patch of
    ///     `slot` may be staged or applied.
    pub unsafe fn modify_region(&mut self, slot: usize, range: Range, kind: Option<PatchKind>) -> Result<(), Error> {
        if range.is_empty() {
            return Err(Error::EmptyRange);
        }

        self.nv.pending.get_mut(slot)?.modify_region(range, kind);

        Ok(())
    }

    /// Enables staging of `slot`.
    pub fn enable(&mut self, slot: usize) -> Result<(), Error> {
        self.nv.pending.get_mut(slot)?.enable();
        Ok(())
    }

    /// Disables staging of `slot`.
    pub fn disable(&mut self, slot: usize) -> Result<(), Error> {
        self.nv.pending.get_mut(slot)?.disable();
        Ok(())
    }

    /// Stages the pending patch of `slot`, regardless of whether it is enabled.
    ///
    /// Fails with `Error::Exhausted` if the pool cannot hold the patch.
    pub fn stage(&mut self, slot: usize) -> Result<PatchHandle, Error> {
        let clock = self.nv.clock.current();
        let pending = *self.nv.pending.get(slot)?;

        let head = self.nv.store.stage(&mut self.nv.pool, &self.platform, slot, &pending, clock)?;

        self.nv.pending.get_mut(slot)?.staged();

        Ok(PatchHandle::new(head))
    }

    /// Stages the pending patch of `slot`, sweeping obsolete patches if the pool is exhausted.
    ///
    /// Fails with `Error::OutOfMemory`, fatal, if the pool is still exhausted after sweeping.
    pub fn stage_retry(&mut self, slot: usize) -> Result<PatchHandle, Error> {
        match self.stage(slot) {
            Err(Error::Exhausted { needed, available }) => {
                debug!("Staging slot {}: {} blocks needed, {} available, sweeping", slot, needed, available);

                self.sweep()?;

                self.stage(slot).map_err(|error| match error {
                    Error::Exhausted { .. } => Error::OutOfMemory,
                    error => error,
                })
            },
            result => result,
        }
    }

    /// Stages all enabled pending patches, as a single batch.
    ///
    /// If the pool is exhausted, the patches staged so far in the batch are discarded, then:
    ///
    /// -   If `retry`, obsolete patches are swept and the whole batch is staged again; if the pool is still exhausted,
    ///     fails with `Error::OutOfMemory`, fatal.
    /// -   Otherwise, returns false, leaving the pending patches untouched.
    ///
    /// On success, single-shot patches are disabled, and the accumulation window of each staged patch restarts from
    /// its current range.
    pub fn stage_all(&mut self, retry: bool) -> Result<bool, Error> {
        let mut swept = false;

        loop {
            match self.stage_batch() {
                Ok(staged) => {
                    self.nv.pending.staged();

                    debug!("Staged {} patches at clock {}", staged, self.nv.clock.current());

                    return Ok(true);
                },
                Err(Error::Exhausted { .. }) if !retry => return Ok(false),
                Err(Error::Exhausted { needed, available }) if !swept => {
                    debug!("Staging batch: {} blocks needed, {} available, sweeping", needed, available);

                    self.sweep()?;
                    swept = true;
                },
                Err(Error::Exhausted { .. }) => return Err(Error::OutOfMemory),
                Err(error) => return Err(error),
            }
        }
    }

    /// Writes the newest data of every byte recorded by any patch back to live memory.
    ///
    /// If `delete`, obsolete patches are swept afterwards.
    pub fn apply_all(&mut self, delete: bool) -> Result<ApplyReport, Error> {
        let mut report = self.apply_visible(Visibility::All)?;

        if delete {
            report.swept = self.sweep()?;
        }

        Ok(report)
    }

    /// Deletes, in every slot, the committed patches entirely shadowed by newer committed patches.
    pub fn sweep(&mut self) -> Result<SweepReport, Error> {
        let clock = self.nv.clock.current();
        let nv = &mut self.nv;

        let mut report = SweepReport::default();

        for slot in 0..SLOTS {
            let scratch = self.scratch.as_mut();
            let swept = nv.store.sweep(&mut nv.pool, &self.platform, &mut nv.delete_log, scratch, slot, clock)?;

            report.patches += swept.patches;
            report.blocks += swept.blocks;
        }

        debug!("Swept {} patches, {} blocks, at clock {}", report.patches, report.blocks, clock);

        Ok(report)
    }

    /// Stages all enabled pending patches, sweeping if need be, then writes the structures into the copies of the
    /// current generation.
    ///
    /// Returns the current generation; nothing is committed until `commit_checkpoint`.
    pub fn prepare_checkpoint(&mut self) -> Result<u32, Error> {
        self.stage_all(true)?;

        let clock = self.nv.clock.current();

        self.nv.pool.checkpoint(clock);
        self.nv.store.checkpoint(clock);
        self.nv.pending.checkpoint(clock);

        Ok(clock)
    }

    /// Commits the generation prepared by `prepare_checkpoint`, returning the new generation.
    pub fn commit_checkpoint(&mut self) -> u32 {
        let clock = self.nv.clock.commit(&self.platform);

        self.nv.pool.post_checkpoint(clock);
        self.nv.store.post_checkpoint(clock);
        self.nv.pending.post_checkpoint(clock);

        debug!("Committed checkpoint, clock now {}", clock);

        clock
    }

    /// Prepares then commits a checkpoint of the patches, returning the new generation.
    pub fn checkpoint(&mut self) -> Result<u32, Error> {
        self.prepare_checkpoint()?;

        Ok(self.commit_checkpoint())
    }

    /// Restores the state committed by the last checkpoint, after a power loss.
    ///
    /// The structures are reloaded from their committed copies, the interrupted generation is recovered from, then
    /// all committed patches are applied to live memory.
    pub fn restore(&mut self) -> Result<RecoveryReport, Error> {
        let clock = self.nv.clock.current();

        self.nv.pool.restore(clock);
        self.nv.store.restore(clock);
        self.nv.pending.restore(clock);

        let mut report = self.recover()?;
        report.applied = self.apply_visible(Visibility::Committed(clock))?;

        info!(
            "Restored clock {}: {} patches applied, {} bytes, {} discarded",
            clock, report.applied.patches, report.applied.bytes, report.discarded
        );

        Ok(report)
    }

    /// Recovers from a generation interrupted by a power loss.
    ///
    /// Completes the delete in progress, if any, then discards the patches staged during the interrupted generation.
    /// Finally rebuilds the free stack out of the blocks no chain reaches, which reclaims the blocks of the patches
    /// deleted during the interrupted generation.
    ///
    /// Expects the structures to have been reloaded from their committed copies.
    pub fn recover(&mut self) -> Result<RecoveryReport, Error> {
        let clock = self.nv.clock.current();
        let nv = &mut self.nv;

        let replayed_delete = nv.store.recover_delete(&mut nv.pool, &self.platform, &mut nv.delete_log)?;

        let mut discarded = 0;

        for slot in 0..SLOTS {
            discarded += nv.store.discard_uncommitted(&mut nv.pool, slot, clock)?;
        }

        if discarded > 0 {
            //  The unlinks must be durable before the blocks are handed out again.
            self.platform.barrier();

            warn!("Discarded {} uncommitted patches", discarded);
        }

        nv.pool.clear_marks();

        for slot in 0..SLOTS {
            nv.store.mark_reachable(&mut nv.pool, slot)?;
        }

        let reclaimed = nv.pool.rebuild_free_stack();

        if reclaimed > 0 {
            warn!("Reclaimed {} blocks of patches deleted since the last checkpoint", reclaimed);
        }

        Ok(RecoveryReport { replayed_delete, discarded, reclaimed, applied: ApplyReport::default() })
    }

    /// Returns the restore point identity, if any.
    pub(crate) fn identity(&self) -> Option<u32> { self.nv.identity }

    /// Sets the restore point identity.
    pub(crate) fn set_identity(&mut self, identity: Option<u32>) {
        self.nv.identity = identity;
        self.platform.barrier();
    }

    /// Records the stack pointer of the checkpoint being written at `clock`.
    pub(crate) fn store_stack_pointer(&mut self, clock: u32, stack_pointer: Address) {
        self.nv.stack_pointer.store(clock, stack_pointer);
    }

    /// Returns the stack pointer committed as of `clock`.
    pub(crate) fn stack_pointer(&self, clock: u32) -> Address { self.nv.stack_pointer.load(clock) }

    fn stage_batch(&mut self) -> Result<usize, Error> {
        let clock = self.nv.clock.current();

        let pool = self.nv.pool.snapshot();
        let store = self.nv.store.mark();

        let mut staged = 0;

        for slot in 0..SLOTS {
            let pending = *self.nv.pending.get(slot)?;

            if !pending.is_stageable() {
                continue;
            }

            if let Err(error) = self.nv.store.stage(&mut self.nv.pool, &self.platform, slot, &pending, clock) {
                //  The patches must be unreachable before their blocks are handed out again.
                self.nv.store.rewind(store);
                self.platform.barrier();

                self.nv.pool.rewind(pool);

                return Err(error);
            }

            staged += 1;
        }

        Ok(staged)
    }

    fn apply_visible(&mut self, visibility: Visibility) -> Result<ApplyReport, Error> {
        let mut report = ApplyReport::default();

        for slot in 0..SLOTS {
            let scratch = self.scratch.as_mut();
            let applied = self.nv.store.apply(&self.nv.pool, &mut self.platform, scratch, slot, visibility)?;

            report.patches += applied.patches;
            report.bytes += applied.bytes;
        }

        Ok(report)
    }
}

// mod tests
