//! Expected memory content.

use std::fmt;

use mpatch_core::{Address, Range};

/// The first byte found to differ from a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    /// Address of the byte.
    pub address: Address,
    /// Content of the byte at the time of the snapshot.
    pub expected: u8,
    /// Current content of the byte.
    pub actual: u8,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {:#010x}: expected {:#04x}, got {:#04x}", self.address, self.expected, self.actual)
    }
}

/// Snapshot
///
/// A copy of a set of memory ranges, taken at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    ranges: Vec<(Range, Vec<u8>)>,
}

impl Snapshot {
    /// Captures `ranges`, as returned by `read`.
    pub fn capture<'a, F>(ranges: &[Range], read: F) -> Self
        where
            F: Fn(Range) -> &'a [u8],
    {
        let ranges = ranges.iter().map(|range| (*range, read(*range).to_vec())).collect();

        Self { ranges }
    }

    /// Returns the ranges captured.
    pub fn ranges(&self) -> impl Iterator<Item = Range> + '_ { self.ranges.iter().map(|(range, _)| *range) }

    /// Returns the first byte, as returned by `read`, differing from the snapshot, if any.
    pub fn mismatch<'a, F>(&self, read: F) -> Option<Mismatch>
        where
            F: Fn(Range) -> &'a [u8],
    {
        for (range, expected) in &self.ranges {
            let actual = read(*range);

            let position = expected.iter().zip(actual.iter()).position(|(expected, actual)| expected != actual);

            if let Some(offset) = position {
                return Some(Mismatch {
                    address: range.low() + offset as Address,
                    expected: expected[offset],
                    actual: actual[offset],
                });
            }
        }

        None
    }
}

// mod tests
