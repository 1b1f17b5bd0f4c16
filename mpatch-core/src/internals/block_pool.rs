//! Block Pool
//!
//! The Block Pool carves a byte-addressable, non-volatile, arena into fixed-size blocks. Blocks are designated by
//! their 16-bit index within the arena rather than by address, so that the structures built out of them remain valid
//! across a restart, wherever the arena is mapped.
//!
//! Each block starts with 2 links:
//!
//! -   The next free block, used while the block sits on the free stack.
//! -   The next block of the chain, used while the block is allocated.
//!
//! Keeping the links apart means that freeing a chain never destroys the chain itself, so a free interrupted by a
//! power loss can be replayed from the very same chain.
//!
//! Like a freshly carved page, the arena is not threaded into a free list upfront: the blocks above the `initialized`
//! watermark are free, and only get initialized the first time they are handed out.

use core::{cmp, fmt};

use log::{debug, trace};

use crate::{BLOCK_LINK_SIZE, Error};
use crate::internals::double_buffer::DoubleBuffered;
use crate::utils;

/// Index of a block within the arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockIndex(u16);

impl BlockIndex {
    /// The "no block" sentinel.
    pub(crate) const NULL: BlockIndex = BlockIndex(0xFFFF);

    /// Creates an instance.
    pub(crate) const fn new(value: u16) -> Self { Self(value) }

    /// Returns the inner value.
    pub(crate) const fn value(&self) -> u16 { self.0 }

    /// Returns whether this is the sentinel.
    pub(crate) const fn is_null(&self) -> bool { self.0 == Self::NULL.0 }
}

impl fmt::Debug for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() { write!(f, "NULL") } else { write!(f, "#{}", self.0) }
    }
}

/// Handle to a chain of blocks, owned by whoever holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockChain(BlockIndex);

impl BlockChain {
    /// Creates an instance.
    pub(crate) fn new(head: BlockIndex) -> Self {
        debug_assert!(!head.is_null());

        Self(head)
    }

    /// Returns the first block of the chain.
    pub(crate) fn head(&self) -> BlockIndex { self.0 }
}

/// The state of the allocator, as committed at each checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PoolState {
    //  Head of the free stack.
    next_free: BlockIndex,
    //  Number of free blocks, on the stack or above the watermark.
    free_count: u16,
    //  Watermark; blocks at or above it have never been handed out.
    initialized: u16,
}

impl PoolState {
    const fn all_free(count: u16) -> Self { Self { next_free: BlockIndex::NULL, free_count: count, initialized: 0 } }
}

/// BlockPool
pub(crate) struct BlockPool<A> {
    arena: A,
    //  Geometry, derived from the configuration at each boot.
    payload: usize,
    count: u16,
    //  The in-use state; volatile.
    active: PoolState,
    //  The committed states; durable.
    slots: DoubleBuffered<PoolState>,
}

impl<A> BlockPool<A> {
    /// Creates an unconfigured instance over `arena`.
    pub(crate) const fn new(arena: A) -> Self {
        let state = PoolState::all_free(0);

        Self { arena, payload: 0, count: 0, active: state, slots: DoubleBuffered::new(state) }
    }

    /// Sets the geometry of the arena, without touching its state.
    pub(crate) fn configure(&mut self, payload: usize, count: usize) {
        debug_assert!(payload > 0);
        debug_assert!(count > 0 && count < BlockIndex::NULL.value() as usize, "count: {}", count);

        self.payload = payload;
        self.count = count as u16;
    }

    /// Resets both committed states, and the active one, to "all free".
    pub(crate) fn reset(&mut self) {
        self.active = PoolState::all_free(self.count);
        self.slots.reset(self.active);

        debug!("Block pool reset: {} blocks of {} bytes", self.count, self.payload);
    }

    /// Returns the number of blocks in the arena.
    pub(crate) fn block_count(&self) -> usize { self.count as usize }

    /// Returns the number of free blocks.
    pub(crate) fn free_count(&self) -> usize { self.active.free_count as usize }

    /// Returns the number of payload bytes per block.
    #[cfg(test)]
    pub(crate) fn payload_size(&self) -> usize { self.payload }

    /// Copies the active state into the copy written at `clock`.
    pub(crate) fn checkpoint(&mut self, clock: u32) { self.slots.store(clock, self.active); }

    /// Copies the copy committed as of `clock` into the active state.
    pub(crate) fn restore(&mut self, clock: u32) { self.active = self.slots.load(clock); }

    /// Resynchronizes the active state with the copy just committed, `clock` being the new generation.
    pub(crate) fn post_checkpoint(&mut self, clock: u32) { self.restore(clock); }

    /// Loses the active state, as a power loss would.
    pub(crate) fn forget(&mut self) {
        self.active = PoolState { next_free: BlockIndex::new(0xDEAD), free_count: 0xDEAD, initialized: 0xDEAD };
    }

    /// Returns the active state, to `rewind` to.
    pub(crate) fn snapshot(&self) -> PoolState { self.active }

    /// Rewinds the active state to `snapshot`, undoing all allocations since.
    ///
    /// Only valid if no block was freed since `snapshot`: allocating never touches the free links, hence the free stack
    /// as of `snapshot` is still intact.
    pub(crate) fn rewind(&mut self, snapshot: PoolState) {
        trace!("Rewinding {} allocated blocks", snapshot.free_count.saturating_sub(self.active.free_count));

        self.active = snapshot;
    }

    /// Returns whether `index` designates a block of the arena.
    pub(crate) fn contains(&self, index: BlockIndex) -> bool { index.value() < self.count }

    fn offset_of(&self, index: BlockIndex) -> usize {
        debug_assert!(self.contains(index), "{:?} >= {}", index, self.count);

        index.value() as usize * (self.payload + BLOCK_LINK_SIZE)
    }
}

impl<A> BlockPool<A>
    where
        A: AsRef<[u8]> + AsMut<[u8]>
{
    /// Returns the size of the arena, in bytes.
    pub(crate) fn arena_len(&self) -> usize { self.arena.as_ref().len() }

    /// Allocates a chain of blocks able to hold `size` bytes.
    ///
    /// The capacity is checked before any block is removed from the free stack, hence on failure the pool is left
    /// untouched.
    pub(crate) fn allocate(&mut self, size: usize) -> Result<BlockChain, Error> {
        let needed = cmp::max(size.div_ceil(self.payload), 1);
        let available = self.free_count();

        if needed > available {
            return Err(Error::Exhausted { needed, available });
        }

        let mut head = BlockIndex::NULL;
        let mut tail = BlockIndex::NULL;

        for _ in 0..needed {
            let block = self.pop().ok_or(Error::CorruptChain(self.active.next_free.value()))?;

            self.set_next_block(block, BlockIndex::NULL);

            if tail.is_null() {
                head = block;
            } else {
                self.set_next_block(tail, block);
            }

            tail = block;
        }

        self.active.free_count -= needed as u16;

        trace!("Allocated {} blocks from {:?} for {} bytes", needed, head, size);

        Ok(BlockChain::new(head))
    }

    /// Returns all blocks of `chain` to the free stack, returning how many were actually freed.
    ///
    /// Blocks already free are skipped, so that freeing a chain twice, as replaying an interrupted free does, never
    /// double-counts a block.
    pub(crate) fn free(&mut self, chain: BlockChain) -> usize {
        let mut current = chain.head();
        let mut freed = 0;
        let mut steps = 0;

        while self.contains(current) && steps < self.count {
            let next = self.next_block(current);

            if !self.is_free(current) {
                self.set_next_free(current, self.active.next_free);
                self.active.next_free = current;
                self.active.free_count += 1;
                freed += 1;
            }

            current = next;
            steps += 1;
        }

        trace!("Freed {} blocks from {:?}", freed, chain.head());

        freed
    }

    /// Returns whether `index` is free, either on the free stack or above the watermark.
    pub(crate) fn is_free(&self, index: BlockIndex) -> bool {
        if index.value() >= self.active.initialized {
            return true;
        }

        let mut current = self.active.next_free;
        let mut steps = 0;

        while self.contains(current) && steps < self.active.free_count {
            if current == index {
                return true;
            }

            current = self.next_free(current);
            steps += 1;
        }

        false
    }

    /// Returns the number of blocks of `chain`.
    #[cfg(test)]
    pub(crate) fn chain_len(&self, chain: BlockChain) -> Result<usize, Error> {
        let mut current = chain.head();
        let mut len = 0;

        while !current.is_null() {
            if !self.contains(current) || len == self.block_count() {
                return Err(Error::CorruptChain(current.value()));
            }

            current = self.next_block(current);
            len += 1;
        }

        Ok(len)
    }

    /// Calls `f` with each payload segment of `chain` covering `[offset, offset + len)`, in order.
    ///
    /// `f` receives the position of the segment relative to `offset`.
    pub(crate) fn visit<F>(&self, chain: BlockChain, offset: usize, len: usize, mut f: F) -> Result<(), Error>
        where
            F: FnMut(usize, &[u8])
    {
        let mut current = chain.head();
        let mut skip = offset;
        let mut done = 0;
        let mut steps = 0;

        while done < len {
            if !self.contains(current) || steps == self.block_count() {
                return Err(Error::CorruptChain(current.value()));
            }

            let payload = self.payload(current);

            if skip >= payload.len() {
                skip -= payload.len();
            } else {
                let available = cmp::min(payload.len() - skip, len - done);
                f(done, &payload[skip..skip + available]);

                done += available;
                skip = 0;
            }

            current = self.next_block(current);
            steps += 1;
        }

        Ok(())
    }

    /// Calls `f` with each payload segment of `chain` covering `[offset, offset + len)`, in order, mutably.
    ///
    /// `f` receives the position of the segment relative to `offset`.
    pub(crate) fn visit_mut<F>(&mut self, chain: BlockChain, offset: usize, len: usize, mut f: F) -> Result<(), Error>
        where
            F: FnMut(usize, &mut [u8])
    {
        let mut current = chain.head();
        let mut skip = offset;
        let mut done = 0;
        let mut steps = 0;

        while done < len {
            if !self.contains(current) || steps == self.block_count() {
                return Err(Error::CorruptChain(current.value()));
            }

            let payload = self.payload_mut(current);
            let size = payload.len();

            if skip >= size {
                skip -= size;
            } else {
                let available = cmp::min(size - skip, len - done);
                f(done, &mut payload[skip..skip + available]);

                done += available;
                skip = 0;
            }

            current = self.next_block(current);
            steps += 1;
        }

        Ok(())
    }

    /// Returns the payload of a block.
    pub(crate) fn payload(&self, index: BlockIndex) -> &[u8] {
        let start = self.offset_of(index) + BLOCK_LINK_SIZE;
        &self.arena.as_ref()[start..start + self.payload]
    }

    /// Returns the payload of a block, mutably.
    pub(crate) fn payload_mut(&mut self, index: BlockIndex) -> &mut [u8] {
        let start = self.offset_of(index) + BLOCK_LINK_SIZE;
        let end = start + self.payload;
        &mut self.arena.as_mut()[start..end]
    }

    /// Returns the next block of the chain `index` is part of.
    pub(crate) fn next_block(&self, index: BlockIndex) -> BlockIndex {
        BlockIndex::new(utils::read_u16(self.arena.as_ref(), self.offset_of(index) + 2))
    }

    /// Clears the marks of all blocks below the watermark, ahead of `mark` and `rebuild_free_stack`.
    pub(crate) fn clear_marks(&mut self) {
        for index in 0..self.active.initialized {
            self.set_next_free(BlockIndex::new(index), BlockIndex::NULL);
        }
    }

    /// Marks every block of `chain` as in use.
    ///
    /// The `next_free` link of a block in use is unused, and holds the mark: a marked block links to itself, which a
    /// block on the free stack never does.
    pub(crate) fn mark(&mut self, chain: BlockChain) -> Result<(), Error> {
        let mut current = chain.head();
        let mut steps = 0;

        while !current.is_null() {
            if current.value() >= self.active.initialized || steps == self.block_count() {
                return Err(Error::CorruptChain(current.value()));
            }

            self.set_next_free(current, current);

            current = self.next_block(current);
            steps += 1;
        }

        Ok(())
    }

    /// Rebuilds the free stack out of the blocks below the watermark left unmarked.
    ///
    /// After a power loss, the free stack committed by the last checkpoint still lists as in use the blocks of the
    /// patches deleted since, and its links may have been overwritten; only the chains themselves are trustworthy.
    ///
    /// Returns the number of free blocks gained.
    pub(crate) fn rebuild_free_stack(&mut self) -> usize {
        let previous = self.active.free_count;

        let mut next_free = BlockIndex::NULL;
        let mut free_count = self.count - self.active.initialized;

        //  Lowest indices on top.
        for index in (0..self.active.initialized).rev() {
            let block = BlockIndex::new(index);

            if self.next_free(block) != block {
                self.set_next_free(block, next_free);
                next_free = block;
                free_count += 1;
            }
        }

        self.active.next_free = next_free;
        self.active.free_count = free_count;

        debug!("Free stack rebuilt: {} blocks free, {} before", free_count, previous);

        free_count.saturating_sub(previous) as usize
    }

    //  Pops a block from the free stack, or from above the watermark.
    //
    //  Does not adjust `free_count`.
    fn pop(&mut self) -> Option<BlockIndex> {
        let head = self.active.next_free;

        if !head.is_null() {
            if !self.contains(head) {
                return None;
            }

            self.active.next_free = self.next_free(head);
            return Some(head);
        }

        if self.active.initialized < self.count {
            let block = BlockIndex::new(self.active.initialized);
            self.active.initialized += 1;

            //  First use: initialize the links.
            self.set_next_free(block, BlockIndex::NULL);
            self.set_next_block(block, BlockIndex::NULL);

            return Some(block);
        }

        None
    }

    fn next_free(&self, index: BlockIndex) -> BlockIndex {
        BlockIndex::new(utils::read_u16(self.arena.as_ref(), self.offset_of(index)))
    }

    fn set_next_free(&mut self, index: BlockIndex, next: BlockIndex) {
        let offset = self.offset_of(index);
        utils::write_u16(self.arena.as_mut(), offset, next.value());
    }

    fn set_next_block(&mut self, index: BlockIndex, next: BlockIndex) {
        let offset = self.offset_of(index) + 2;
        utils::write_u16(self.arena.as_mut(), offset, next.value());
    }
}

// mod tests
