//! The processor of the simulated device.

use std::mem;

use log::warn;
use rand::Rng;

use mpatch_core::{Address, MemoryMap, Processor, ResumeKind};

use super::memory_map;

/// The register file of a Cortex-M class processor, minus the stack pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    /// `r0` to `r12`.
    pub general: [u32; 13],
    /// `lr`.
    pub link: u32,
    /// `pc`.
    pub program_counter: u32,
    /// `xpsr`.
    pub status: u32,
}

impl RegisterFile {
    /// Creates a register file filled with random values.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut general = [0u32; 13];
        rng.fill(&mut general[..]);

        Self { general, link: rng.gen(), program_counter: rng.gen(), status: rng.gen() }
    }
}

/// Implementation of the Processor trait, for the simulated device.
///
/// The saved register files are non-volatile, and survive `power_loss`.
pub struct SimProcessor {
    registers: RegisterFile,
    stack_pointer: Address,
    saved: [Option<(RegisterFile, Address)>; 2],
    resume_next: bool,
}

impl SimProcessor {
    /// Creates an instance, with the stack pointer 512 bytes below the top of the main stack.
    pub fn new() -> Self {
        let stack_pointer = memory_map().stack.high() - 0x1FF;

        Self { registers: RegisterFile::default(), stack_pointer, saved: [None; 2], resume_next: false }
    }

    /// Returns the register file.
    pub fn registers(&self) -> &RegisterFile { &self.registers }

    /// Returns the register file, mutably.
    pub fn registers_mut(&mut self) -> &mut RegisterFile { &mut self.registers }

    /// Sets the stack pointer, as pushing or popping frames would.
    pub fn set_stack_pointer(&mut self, stack_pointer: Address) { self.stack_pointer = stack_pointer; }

    /// Makes the next `save_registers` return as if control came back through a restore.
    pub fn resume_next_save(&mut self) { self.resume_next = true; }

    /// Loses the register file, as a power loss would.
    pub fn power_loss<R: Rng>(&mut self, rng: &mut R) {
        self.registers = RegisterFile::random(rng);
        self.stack_pointer = rng.gen();
        self.resume_next = false;
    }
}

impl Default for SimProcessor {
    fn default() -> Self { Self::new() }
}

impl Processor for SimProcessor {
    fn memory_map(&self) -> MemoryMap { memory_map() }

    fn stack_pointer(&self) -> Address { self.stack_pointer }

    unsafe fn switch_stack(&mut self, top: Address) { self.stack_pointer = top; }

    unsafe fn save_registers(&mut self, slot: usize) -> ResumeKind {
        self.saved[slot] = Some((self.registers, self.stack_pointer));

        if mem::replace(&mut self.resume_next, false) {
            ResumeKind::ResumedFromRestore
        } else {
            ResumeKind::FreshReturn
        }
    }

    unsafe fn restore_registers(&mut self, slot: usize) {
        match self.saved[slot] {
            Some((registers, stack_pointer)) => {
                self.registers = registers;
                self.stack_pointer = stack_pointer;
            },
            None => warn!("No register file saved in slot {}", slot),
        }
    }

    fn halt(&mut self) -> ! { panic!("device halted") }
}

// mod tests
