//! Processor
//!
//! The Processor trait gives access to the parts of the machine that cannot be expressed portably: the memory layout
//! decided by the linker, the stack pointer, and the register file.

use super::{Address, Range};

/// How control came back from `Processor::save_registers`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeKind {
    /// The registers were just saved; execution continues normally.
    FreshReturn,
    /// The registers were restored from a previous save; the checkpoint is being resumed after a power loss.
    ResumedFromRestore,
}

/// The memory layout of the firmware image.
///
/// The values are build-time constants, typically linker-provided symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryMap {
    /// The initialized data section, `.data`.
    pub data: Range,
    /// The zero-initialized data section, `.bss`.
    pub bss: Range,
    /// The main stack, growing downward from `stack.high()`.
    pub stack: Range,
    /// The start of the 2 non-volatile copies of `.data`, one per checkpoint parity.
    pub data_shadow: [Address; 2],
    /// The start of the 2 non-volatile copies of `.bss`, one per checkpoint parity.
    pub bss_shadow: [Address; 2],
    /// The start of the 2 non-volatile copies of the stack, one per checkpoint parity.
    pub stack_shadow: [Address; 2],
    /// The top of the dedicated stack used while restoring the main stack.
    pub restore_stack_top: Address,
}

/// Abstraction of the processor specific services.
pub trait Processor {
    /// Returns the memory layout of the firmware image.
    fn memory_map(&self) -> MemoryMap;

    /// Returns the current stack pointer.
    ///
    /// The live part of the stack spans from the stack pointer to `memory_map().stack.high()`.
    fn stack_pointer(&self) -> Address;

    /// Switches the stack pointer to `top`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `top` is the top of a region dedicated to this purpose.
    /// -   Assumes that the caller never returns into a frame of the previous stack, except through
    ///     `restore_registers`.
    unsafe fn switch_stack(&mut self, top: Address);

    /// Saves the register file into the non-volatile `slot`, 0 or 1.
    ///
    /// This function returns twice: once after saving, with `FreshReturn`, and once more after a later
    /// `restore_registers` of the same slot, with `ResumedFromRestore`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that the stack frame of the caller is part of the checkpointed stack.
    unsafe fn save_registers(&mut self, slot: usize) -> ResumeKind;

    /// Restores the register file from the non-volatile `slot`, 0 or 1.
    ///
    /// On hardware, control is transferred to the matching `save_registers` call, and this function never returns.
    ///
    /// #   Safety
    ///
    /// -   Assumes that memory, stack included, was restored to the state it had when `slot` was saved.
    unsafe fn restore_registers(&mut self, slot: usize);

    /// Stops the device, forever.
    ///
    /// Used when continuing would mean running on corrupted state.
    fn halt(&mut self) -> !;
}
