//! The simulated hardware.

mod memory;
mod processor;

pub use memory::{PowerLoss, SimPlatform};
pub use processor::{RegisterFile, SimProcessor};

use mpatch_core::{Configuration, MemoryMap};

/// Implementation of the Configuration trait, for the simulated device.
#[derive(Default)]
pub struct SimConfiguration;

impl Configuration for SimConfiguration {
    const BLOCK_PAYLOAD: usize = 600;
}

/// The memory layout of the simulated device.
pub mod layout {
    use mpatch_core::{Address, Range};

    /// Start of the volatile SRAM.
    pub const SRAM_BASE: Address = 0x2000_0000;

    /// Size, in bytes, of the volatile SRAM.
    pub const SRAM_SIZE: usize = 32 * 1024;

    /// Start of the non-volatile FRAM.
    pub const FRAM_BASE: Address = 0x6000_0000;

    /// Size, in bytes, of the non-volatile FRAM.
    pub const FRAM_SIZE: usize = 32 * 1024;

    /// The whole SRAM.
    pub const SRAM: Range = section(SRAM_BASE, SRAM_BASE + SRAM_SIZE as Address - 1);

    /// The initialized data section, `.data`.
    pub const DATA: Range = section(SRAM_BASE, SRAM_BASE + 0x07FF);

    /// The zero-initialized data section, `.bss`.
    pub const BSS: Range = section(SRAM_BASE + 0x0800, SRAM_BASE + 0x0FFF);

    /// The heap, whose ranges are tracked by patches.
    pub const HEAP: Range = section(SRAM_BASE + 0x1000, SRAM_BASE + 0x4FFF);

    /// The top of the restore stack, which grows downward from there down to the end of the heap.
    pub const RESTORE_STACK_TOP: Address = SRAM_BASE + 0x6000;

    /// The main stack.
    pub const STACK: Range = section(SRAM_BASE + 0x6000, SRAM_BASE + 0x7FFF);

    /// The copies of `.data`, one per checkpoint parity.
    pub const DATA_SHADOW: [Address; 2] = [FRAM_BASE, FRAM_BASE + 0x0800];

    /// The copies of `.bss`, one per checkpoint parity.
    pub const BSS_SHADOW: [Address; 2] = [FRAM_BASE + 0x1000, FRAM_BASE + 0x1800];

    /// The copies of the main stack, one per checkpoint parity.
    pub const STACK_SHADOW: [Address; 2] = [FRAM_BASE + 0x2000, FRAM_BASE + 0x4000];

    const fn section(low: Address, high: Address) -> Range {
        match Range::new(low, high) {
            Some(range) => range,
            None => Range::EMPTY,
        }
    }
}

/// Returns the memory map of the simulated device.
pub fn memory_map() -> MemoryMap {
    MemoryMap {
        data: layout::DATA,
        bss: layout::BSS,
        stack: layout::STACK,
        data_shadow: layout::DATA_SHADOW,
        bss_shadow: layout::BSS_SHADOW,
        stack_shadow: layout::STACK_SHADOW,
        restore_stack_top: layout::RESTORE_STACK_TOP,
    }
}

#[cfg(test)]
mod tests {

use super::layout::*;

#[test]
fn layout_sections_disjoint() {
    let sections = [DATA, BSS, HEAP, STACK];

    for (index, section) in sections.iter().enumerate() {
        assert!(!section.is_empty(), "{:?}", section);
        assert!(SRAM.contains(section), "{:?}", section);

        for other in &sections[index + 1..] {
            assert!(!section.overlaps(other), "{:?} overlaps {:?}", section, other);
        }
    }

    assert!(HEAP.high() < RESTORE_STACK_TOP);
}

#[test]
fn layout_shadows_fit() {
    let fram_end = FRAM_BASE as usize + FRAM_SIZE;

    for parity in 0..2 {
        assert!(DATA_SHADOW[parity] as usize + DATA.len() <= BSS_SHADOW[0] as usize);
        assert!(BSS_SHADOW[parity] as usize + BSS.len() <= STACK_SHADOW[0] as usize);
        assert!(STACK_SHADOW[parity] as usize + STACK.len() <= fram_end);
    }

    assert_eq!(DATA_SHADOW[0] as usize + DATA.len(), DATA_SHADOW[1] as usize);
    assert_eq!(BSS_SHADOW[0] as usize + BSS.len(), BSS_SHADOW[1] as usize);
    assert_eq!(STACK_SHADOW[0] as usize + STACK.len(), STACK_SHADOW[1] as usize);
}

} // mod tests
