//! The memory of the simulated device.

use std::cell::Cell;

use log::{debug, trace};
use rand::Rng;

use mpatch_core::{Address, Platform, Range};

use super::layout::{FRAM_BASE, FRAM_SIZE, SRAM_BASE, SRAM_SIZE};

/// The payload of the panic raised when power is cut at a barrier.
///
/// Recovered with `std::panic::catch_unwind`, then `downcast_ref::<PowerLoss>()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerLoss {
    /// The number of the barrier at which power was cut, counting from 1 since power-on.
    pub barrier: u64,
}

/// Implementation of the Platform trait, for the simulated device.
///
/// Accesses outside of the SRAM and the FRAM are bus faults, and panic.
pub struct SimPlatform {
    sram: Vec<u8>,
    fram: Vec<u8>,
    barriers: Cell<u64>,
    cut_at: Option<u64>,
}

impl SimPlatform {
    /// Creates an instance, with all memory zeroed.
    pub fn new() -> Self {
        Self { sram: vec![0; SRAM_SIZE], fram: vec![0; FRAM_SIZE], barriers: Cell::new(0), cut_at: None }
    }

    /// Returns the number of barriers issued since power-on.
    pub fn barriers(&self) -> u64 { self.barriers.get() }

    /// Cuts power when the `barrier`-th barrier since power-on is issued, unwinding with `PowerLoss`.
    ///
    /// The writes issued before the barrier are durable, none issued after it is.
    pub fn cut_power_at(&mut self, barrier: Option<u64>) { self.cut_at = barrier; }

    /// Returns the bytes of `range`.
    ///
    /// #   Panics
    ///
    /// If `range` is not entirely within either the SRAM or the FRAM.
    pub fn bytes(&self, range: Range) -> &[u8] {
        let (bank, start) = self.locate(range.low(), range.len());

        let memory = match bank {
            Bank::Sram => &self.sram,
            Bank::Fram => &self.fram,
        };

        &memory[start..start + range.len()]
    }

    /// Returns the bytes of `range`, mutably.
    ///
    /// #   Panics
    ///
    /// If `range` is not entirely within either the SRAM or the FRAM.
    pub fn bytes_mut(&mut self, range: Range) -> &mut [u8] {
        let (bank, start) = self.locate(range.low(), range.len());

        let memory = match bank {
            Bank::Sram => &mut self.sram,
            Bank::Fram => &mut self.fram,
        };

        &mut memory[start..start + range.len()]
    }

    /// Loses the content of the SRAM, as a power loss would, and resets the barrier count.
    ///
    /// The SRAM is filled with a random pattern.
    pub fn power_loss<R: Rng>(&mut self, rng: &mut R) {
        let pattern: u8 = rng.gen();

        self.sram.fill(pattern);

        //  A few random bytes, so that no pattern is ever uniform.
        for _ in 0..64 {
            let index = rng.gen_range(0..SRAM_SIZE);
            self.sram[index] = rng.gen();
        }

        self.barriers.set(0);
        self.cut_at = None;

        debug!("SRAM lost, filled with {:#04x}", pattern);
    }

    fn locate(&self, address: Address, len: usize) -> (Bank, usize) {
        let end = address as usize + len;

        if address >= SRAM_BASE && end <= SRAM_BASE as usize + SRAM_SIZE {
            return (Bank::Sram, (address - SRAM_BASE) as usize);
        }

        if address >= FRAM_BASE && end <= FRAM_BASE as usize + FRAM_SIZE {
            return (Bank::Fram, (address - FRAM_BASE) as usize);
        }

        panic!("bus fault: {} bytes at {:#010x}", len, address);
    }
}

impl Default for SimPlatform {
    fn default() -> Self { Self::new() }
}

impl Platform for SimPlatform {
    unsafe fn read(&self, address: Address, buffer: &mut [u8]) {
        let (bank, start) = self.locate(address, buffer.len());

        let memory = match bank {
            Bank::Sram => &self.sram,
            Bank::Fram => &self.fram,
        };

        buffer.copy_from_slice(&memory[start..start + buffer.len()]);
    }

    unsafe fn write(&mut self, address: Address, bytes: &[u8]) {
        let (bank, start) = self.locate(address, bytes.len());

        let memory = match bank {
            Bank::Sram => &mut self.sram,
            Bank::Fram => &mut self.fram,
        };

        memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn barrier(&self) {
        let barrier = self.barriers.get() + 1;
        self.barriers.set(barrier);

        if self.cut_at == Some(barrier) {
            trace!("Power cut at barrier {}", barrier);

            std::panic::panic_any(PowerLoss { barrier });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bank {
    Sram,
    Fram,
}

// mod tests
