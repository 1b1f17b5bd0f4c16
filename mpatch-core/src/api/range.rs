//! Ranges of addresses.
//!
//! Ranges are inclusive on both ends, so that a range may reach the very last byte of the address space.

use core::{cmp, fmt};

/// An address within the device address space.
pub type Address = u32;

/// Range
///
/// A contiguous interval of addresses, `[low, high]`, both inclusive.
///
/// The all-zero range stands for "not yet set", and is empty. As a consequence, the single byte at address 0 cannot
/// be described; address 0 is never part of tracked memory on the supported targets.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Range {
    low: Address,
    high: Address,
}

impl Range {
    /// The empty, not yet set, range.
    pub const EMPTY: Range = Range { low: 0, high: 0 };

    /// Creates a range from its bounds, or None if `low > high`.
    pub const fn new(low: Address, high: Address) -> Option<Range> {
        if low <= high { Some(Range { low, high }) } else { None }
    }

    /// Creates a range spanning `len` bytes from `start`, or None if `len` is 0 or the range would overflow.
    pub fn with_len(start: Address, len: usize) -> Option<Range> {
        let len = Address::try_from(len).ok()?;
        let high = start.checked_add(len.checked_sub(1)?)?;

        Some(Range { low: start, high })
    }

    /// Creates a range from its bounds.
    ///
    /// Only for internal use, when `low <= high` is known to hold.
    pub(crate) fn between(low: Address, high: Address) -> Range {
        debug_assert!(low <= high, "{:#x} > {:#x}", low, high);

        Range { low, high }
    }

    /// Returns the lowest address, inclusive.
    pub const fn low(&self) -> Address { self.low }

    /// Returns the highest address, inclusive.
    pub const fn high(&self) -> Address { self.high }

    /// Returns whether the range is the empty, not yet set, range.
    pub const fn is_empty(&self) -> bool { self.low == 0 && self.high == 0 }

    /// Returns the number of bytes within the range; 0 if empty.
    pub const fn len(&self) -> usize {
        if self.is_empty() { 0 } else { (self.high - self.low) as usize + 1 }
    }

    /// Returns the smallest range containing both `self` and `other`.
    ///
    /// The empty range is the neutral element.
    pub fn union(&self, other: &Range) -> Range {
        if self.is_empty() {
            return *other;
        }

        if other.is_empty() {
            return *self;
        }

        Range { low: cmp::min(self.low, other.low), high: cmp::max(self.high, other.high) }
    }

    /// Returns whether `self` and `other` share at least one address.
    pub fn overlaps(&self, other: &Range) -> bool {
        !self.is_empty() && !other.is_empty() && self.low <= other.high && other.low <= self.high
    }

    /// Returns whether `other` lies entirely within `self`.
    pub fn contains(&self, other: &Range) -> bool {
        !self.is_empty() && !other.is_empty() && self.low <= other.low && other.high <= self.high
    }

    /// Returns the offset of `address` from the start of the range.
    pub(crate) fn offset_of(&self, address: Address) -> usize {
        debug_assert!(self.low <= address && address <= self.high);

        (address - self.low) as usize
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.low, self.high)
    }
}

// mod tests
