#![deny(missing_docs)]

//! A simulated intermittently powered device, running mpatch-core.
//!
//! The device is made of:
//! -   A volatile SRAM, holding `.data`, `.bss`, a heap, the main stack and the restore stack; it is scrambled by each
//!     power loss.
//! -   A non-volatile FRAM, holding the copies of the sections for each checkpoint parity.
//! -   A processor, with a small register file saved into non-volatile slots.
//! -   A non-volatile arena, holding the block pool of the patches.
//!
//! The simulation makes it possible to exercise power losses at any point: between checkpoints, or in the middle of
//! one, by cutting power at a chosen write barrier.

mod device;
mod platform;

pub use device::{SimCheckpointer, SimContext, SimDevice, SLOTS};
pub use platform::{PowerLoss, RegisterFile, SimConfiguration, SimPlatform, SimProcessor};
pub use platform::{layout, memory_map};

/// The identity of this build, stamped at build time.
///
/// A restore point is only ever restored by the build which set it.
pub const CODE_IDENTITY: u32 = parse_identity(env!("MPATCH_BUILD_ID"));

//  Parses a decimal number at compile-time, wrapping on overflow and skipping any non-digit.
const fn parse_identity(digits: &str) -> u32 {
    let digits = digits.as_bytes();

    let mut result: u32 = 0;
    let mut index = 0;

    while index < digits.len() {
        let digit = digits[index];

        if digit.is_ascii_digit() {
            result = result.wrapping_mul(10).wrapping_add((digit - b'0') as u32);
        }

        index += 1;
    }

    result
}

// mod tests
