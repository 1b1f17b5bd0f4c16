//! Test utilities.

use core::cell::Cell;

use std::{vec, vec::Vec};

use crate::{Address, Configuration, MemoryMap, Platform, Processor, Range, ResumeKind};

/// Base address of the memory of `TestPlatform`.
pub(crate) const MEMORY_BASE: Address = 0x1000;

/// Size, in bytes, of the memory of `TestPlatform`.
pub(crate) const MEMORY_SIZE: usize = 0x1000;

/// Payload of the blocks of `TestConfiguration`.
pub(crate) const BLOCK_PAYLOAD: usize = 64;

pub(crate) struct TestConfiguration;

impl Configuration for TestConfiguration {
    const BLOCK_PAYLOAD: usize = BLOCK_PAYLOAD;
}

/// A flat, byte-addressable memory starting at `MEMORY_BASE`.
pub(crate) struct TestPlatform {
    memory: Vec<u8>,
    barriers: Cell<usize>,
}

impl TestPlatform {
    /// Returns the number of barriers issued so far.
    pub(crate) fn barriers(&self) -> usize { self.barriers.get() }

    /// Returns the bytes of `range`.
    pub(crate) fn bytes(&self, range: Range) -> &[u8] {
        let start = (range.low() - MEMORY_BASE) as usize;
        &self.memory[start..start + range.len()]
    }

    /// Returns the bytes of `range`, mutably.
    pub(crate) fn bytes_mut(&mut self, range: Range) -> &mut [u8] {
        let start = (range.low() - MEMORY_BASE) as usize;
        &mut self.memory[start..start + range.len()]
    }

    /// Overwrites the whole memory with a pattern unlikely to match any test data.
    pub(crate) fn scramble(&mut self) {
        for (index, byte) in self.memory.iter_mut().enumerate() {
            *byte = 0xA5 ^ (index as u8);
        }
    }

    /// Overwrites `range` with a pattern unlikely to match any test data.
    pub(crate) fn scramble_range(&mut self, range: Range) {
        for (index, byte) in self.bytes_mut(range).iter_mut().enumerate() {
            *byte = 0x5A ^ (index as u8);
        }
    }
}

impl Default for TestPlatform {
    fn default() -> Self { Self { memory: vec![0; MEMORY_SIZE], barriers: Cell::new(0) } }
}

impl Platform for TestPlatform {
    unsafe fn read(&self, address: Address, buffer: &mut [u8]) {
        let start = (address - MEMORY_BASE) as usize;
        buffer.copy_from_slice(&self.memory[start..start + buffer.len()]);
    }

    unsafe fn write(&mut self, address: Address, bytes: &[u8]) {
        let start = (address - MEMORY_BASE) as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn barrier(&self) { self.barriers.set(self.barriers.get() + 1); }
}

/// Returns the range `[MEMORY_BASE + low, MEMORY_BASE + high]`.
pub(crate) fn range(low: u32, high: u32) -> Range { Range::new(MEMORY_BASE + low, MEMORY_BASE + high).unwrap() }

/// Returns an arena able to hold `blocks` blocks of `TestConfiguration`.
pub(crate) fn arena(blocks: usize) -> Vec<u8> {
    vec![0; blocks * crate::Properties::<TestConfiguration>::block_stride()]
}

/// The volatile part of the memory of `TestPlatform`, as laid out by `memory_map`.
pub(crate) fn volatile() -> Range { range(0x000, 0x7FF) }

/// The memory layout used with `TestProcessor`.
///
/// The volatile memory holds `.data`, `.bss`, a heap at `[0x200, 0x3FF]`, the stack and the restore stack; the
/// shadows live above `0x800`.
pub(crate) fn memory_map() -> MemoryMap {
    MemoryMap {
        data: range(0x000, 0x0FF),
        bss: range(0x100, 0x1FF),
        stack: range(0x400, 0x4FF),
        data_shadow: [MEMORY_BASE + 0x800, MEMORY_BASE + 0x900],
        bss_shadow: [MEMORY_BASE + 0xA00, MEMORY_BASE + 0xB00],
        stack_shadow: [MEMORY_BASE + 0xC00, MEMORY_BASE + 0xD00],
        restore_stack_top: MEMORY_BASE + 0x800,
    }
}

/// A processor with a single register, saved alongside the stack pointer.
pub(crate) struct TestProcessor {
    pub(crate) register: u32,
    pub(crate) stack_pointer: Address,
    /// The saved register files; non-volatile.
    pub(crate) saved: [Option<(u32, Address)>; 2],
    /// Whether the next `save_registers` returns as if resumed.
    pub(crate) resume: bool,
    /// The last stack switched to.
    pub(crate) switched: Option<Address>,
}

impl TestProcessor {
    /// Loses the register file, as a power loss would.
    pub(crate) fn power_cycle(&mut self) {
        self.register = 0xDEAD_BEEF;
        self.stack_pointer = 0;
        self.switched = None;
    }
}

impl Default for TestProcessor {
    fn default() -> Self {
        let stack_pointer = memory_map().stack.low() + 0x80;

        Self { register: 0, stack_pointer, saved: [None; 2], resume: false, switched: None }
    }
}

impl Processor for TestProcessor {
    fn memory_map(&self) -> MemoryMap { memory_map() }

    fn stack_pointer(&self) -> Address { self.stack_pointer }

    unsafe fn switch_stack(&mut self, top: Address) {
        self.stack_pointer = top;
        self.switched = Some(top);
    }

    unsafe fn save_registers(&mut self, slot: usize) -> ResumeKind {
        self.saved[slot] = Some((self.register, self.stack_pointer));

        if core::mem::replace(&mut self.resume, false) {
            ResumeKind::ResumedFromRestore
        } else {
            ResumeKind::FreshReturn
        }
    }

    unsafe fn restore_registers(&mut self, slot: usize) {
        let (register, stack_pointer) = self.saved[slot].expect("no saved registers");

        self.register = register;
        self.stack_pointer = stack_pointer;
    }

    fn halt(&mut self) -> ! { panic!("halted") }
}
