//! Checkpointer
//!
//! The Checkpointer snapshots the whole process on top of the incremental patches of its `CheckpointContext`: the
//! `.data` and `.bss` sections, the live part of the stack, and the register file.
//!
//! A checkpoint is written into the copies of the current generation, then committed by bumping the logical clock.
//! Saving the register file is the very last step before the bump: it returns twice, once right away, and once more
//! when a later restore reloads it, in which case the clock must be left alone.
//!
//! A restore reloads the copies of the last committed generation. It first moves to a dedicated stack, as the main
//! stack is about to be overwritten, and finishes with the register file, which hands control back to the code which
//! took the checkpoint.
//!
//! #   Code identity
//!
//! The restore point is stamped with the identity of the firmware which set it, typically a build timestamp; a
//! different firmware never restores it, as the layout of its memory may differ.

use core::cmp;

use log::{debug, error, info};

use crate::{Address, CheckpointContext, Configuration, Error, IntervalNode, MemoryMap, Platform, Processor, ResumeKind};
use crate::utils;

const CHUNK_SIZE: usize = 64;

/// How the device booted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boot {
    /// No restore point was available; the state was initialized afresh.
    Cold,
    /// The last committed checkpoint was restored.
    Restored,
}

/// Checkpointer
pub struct Checkpointer<C, P, R, A, S, const SLOTS: usize> {
    context: CheckpointContext<C, P, A, S, SLOTS>,
    processor: R,
    identity: u32,
}

impl<C, P, R, A, S, const SLOTS: usize> Checkpointer<C, P, R, A, S, SLOTS>
    where
        C: Configuration,
        P: Platform,
        R: Processor,
        A: AsRef<[u8]> + AsMut<[u8]>,
        S: AsMut<[IntervalNode]>,
{
    /// Creates an instance, for the firmware of the given `identity`.
    pub fn new(context: CheckpointContext<C, P, A, S, SLOTS>, processor: R, identity: u32) -> Self {
        Self { context, processor, identity }
    }

    /// Returns a reference to the context.
    pub fn context(&self) -> &CheckpointContext<C, P, A, S, SLOTS> { &self.context }

    /// Returns a mutable reference to the context.
    pub fn context_mut(&mut self) -> &mut CheckpointContext<C, P, A, S, SLOTS> { &mut self.context }

    /// Returns a reference to the processor.
    pub fn processor(&self) -> &R { &self.processor }

    /// Returns a mutable reference to the processor.
    pub fn processor_mut(&mut self) -> &mut R { &mut self.processor }

    /// Returns the identity of the running firmware.
    pub fn identity(&self) -> u32 { self.identity }

    /// Splits into context and processor.
    pub fn into_parts(self) -> (CheckpointContext<C, P, A, S, SLOTS>, R) { (self.context, self.processor) }

    /// Returns whether a restore point set by this very firmware, and at least one checkpoint, are available.
    pub fn restore_available(&self) -> bool {
        self.context.identity() == Some(self.identity) && self.context.clock() > 0
    }

    /// Forgets the restore point: the next boot is a cold one.
    pub fn invalidate(&mut self) {
        self.context.set_identity(None);

        info!("Restore point invalidated");
    }

    /// Marks the checkpoints as a valid restore point, for this firmware.
    ///
    /// Typically called once the one-time setup of the application is complete.
    pub fn set_available(&mut self) {
        self.context.set_identity(Some(self.identity));

        info!("Restore point set for identity {:#010x}", self.identity);
    }

    /// Boots: restores the last checkpoint if available, and initializes afresh otherwise.
    pub fn boot(&mut self) -> Boot {
        match self.restore() {
            Boot::Cold => {
                self.context.initialize();
                Boot::Cold
            },
            restored => restored,
        }
    }

    /// Takes a checkpoint.
    ///
    /// Returns `FreshReturn` once committed, or `ResumedFromRestore` when control comes back through a restore of this
    /// very checkpoint. Halts if the patches cannot be staged.
    pub fn checkpoint(&mut self) -> ResumeKind {
        let clock = match self.context.prepare_checkpoint() {
            Ok(clock) => clock,
            Err(error) => self.fatal(error),
        };

        let slot = utils::parity(clock);
        let map = self.processor.memory_map();
        let stack_pointer = self.processor.stack_pointer();

        let (offset, len) = match live_stack(&map, stack_pointer) {
            Ok(stack) => stack,
            Err(error) => self.fatal(error),
        };

        let platform = self.context.platform_mut();

        //  Safety:
        //  -   The sections and their shadows are provided by the memory map, and do not overlap.
        unsafe {
            copy(platform, map.data.low(), map.data_shadow[slot], map.data.len());
            copy(platform, map.bss.low(), map.bss_shadow[slot], map.bss.len());
            copy(platform, stack_pointer, map.stack_shadow[slot] + offset as Address, len);
        }

        self.context.store_stack_pointer(clock, stack_pointer);

        //  Safety:
        //  -   The frame of this function lies within the live part of the stack, just saved.
        if unsafe { self.processor.save_registers(slot) } == ResumeKind::ResumedFromRestore {
            debug!("Resumed from checkpoint of clock {}", clock);

            return ResumeKind::ResumedFromRestore;
        }

        let clock = self.context.commit_checkpoint();

        debug!("Checkpoint committed, clock now {}, {} blocks free", clock, self.context.free_blocks());

        ResumeKind::FreshReturn
    }

    /// Restores the last committed checkpoint, if available.
    ///
    /// Returns `Cold`, touching nothing, if no restore point is available. Otherwise, the patches and sections are
    /// restored, and the register file last; on hardware, control then resumes from the matching `checkpoint`.
    /// Halts if the patches cannot be recovered.
    pub fn restore(&mut self) -> Boot {
        if !self.restore_available() {
            info!("No restore point available for identity {:#010x}", self.identity);

            return Boot::Cold;
        }

        let map = self.processor.memory_map();

        //  Safety:
        //  -   The restore stack is dedicated to this purpose.
        //  -   Control only goes back to the frames of the main stack through `restore_registers`.
        unsafe { self.processor.switch_stack(map.restore_stack_top) };

        if let Err(error) = self.context.restore() {
            self.fatal(error);
        }

        let clock = self.context.clock();
        let slot = utils::parity(clock.wrapping_add(1));
        let stack_pointer = self.context.stack_pointer(clock);

        let (offset, len) = match live_stack(&map, stack_pointer) {
            Ok(stack) => stack,
            Err(error) => self.fatal(error),
        };

        let platform = self.context.platform_mut();

        //  Safety:
        //  -   The sections and their shadows are provided by the memory map, and do not overlap.
        //  -   The code running does not use the main stack anymore.
        unsafe {
            copy(platform, map.data_shadow[slot], map.data.low(), map.data.len());
            copy(platform, map.bss_shadow[slot], map.bss.low(), map.bss.len());
            copy(platform, map.stack_shadow[slot] + offset as Address, stack_pointer, len);
        }

        info!("Restored checkpoint of clock {}", clock);

        //  Safety:
        //  -   Memory, stack included, is back to the state it had when `slot` was saved.
        unsafe { self.processor.restore_registers(slot) };

        Boot::Restored
    }

    fn fatal(&mut self, error: Error) -> ! {
        error!("Halting: {}", error);

        self.processor.halt()
    }
}

//  Returns the offset of the stack pointer within the stack, and the length of the live part of the stack.
fn live_stack(map: &MemoryMap, stack_pointer: Address) -> Result<(usize, usize), Error> {
    let stack = map.stack;

    if stack.is_empty() || stack_pointer < stack.low() || stack_pointer > stack.high() {
        return Err(Error::Misconfigured("stack pointer outside of the stack"));
    }

    Ok((stack.offset_of(stack_pointer), (stack.high() - stack_pointer) as usize + 1))
}

//  Copies `len` bytes from `from` to `to`, through a small bounce buffer.
//
//  #   Safety
//
//  -   Assumes that both ranges are mapped memory, and do not overlap.
unsafe fn copy<P: Platform>(platform: &mut P, from: Address, to: Address, len: usize) {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut done = 0;

    while done < len {
        let chunk = &mut buffer[..cmp::min(CHUNK_SIZE, len - done)];

        platform.read(from + done as Address, chunk);
        platform.write(to + done as Address, chunk);

        done += chunk.len();
    }
}

// mod tests
