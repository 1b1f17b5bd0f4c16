//! Platform
//!
//! The Platform trait is used to access live memory by raw address. By abstracting the underlying platform, it becomes
//! possible to run the same checkpointing logic on a bare-metal target, or on a simulated device.

use super::Address;

/// Abstraction of platform specific memory accesses and ordering.
pub trait Platform {
    /// Copies the bytes located at `[address, address + buffer.len())` into `buffer`.
    ///
    /// #   Safety
    ///
    /// `read` assumes that:
    /// -   The whole range is mapped, readable, memory.
    /// -   No live reference aliases the range mutably.
    unsafe fn read(&self, address: Address, buffer: &mut [u8]);

    /// Copies `bytes` to `[address, address + bytes.len())`.
    ///
    /// #   Safety
    ///
    /// `write` assumes that:
    /// -   The whole range is mapped, writable, memory.
    /// -   No live reference aliases the range.
    unsafe fn write(&mut self, address: Address, bytes: &[u8]);

    /// Write barrier.
    ///
    /// All memory writes issued before the barrier must be observed, including across a power loss, before any write
    /// issued after it. On Cortex-M targets, this is a `dsb` followed by an `isb`.
    fn barrier(&self);
}
