//! A stand-in for the application, modifying memory at random.

use rand::{Rng, SeedableRng, rngs::StdRng};

use mpatch_core::{Address, Range};

/// Scribbler
///
/// Picks random ranges within a region, and random content for them, from a seeded generator so that any failure may
/// be replayed.
pub struct Scribbler {
    rng: StdRng,
}

impl Scribbler {
    /// Creates an instance, from `seed`.
    pub fn new(seed: u64) -> Self { Self { rng: StdRng::seed_from_u64(seed) } }

    /// Returns the underlying generator.
    pub fn rng(&mut self) -> &mut StdRng { &mut self.rng }

    /// Returns true with probability `numerator / denominator`.
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool { self.rng.gen_ratio(numerator, denominator) }

    /// Returns a random number in `[low, high]`.
    pub fn between(&mut self, low: usize, high: usize) -> usize { self.rng.gen_range(low..=high) }

    /// Returns a random range within `region`, at most `max_len` bytes long.
    ///
    /// #   Panics
    ///
    /// If `region` is empty, or `max_len` is 0.
    pub fn range(&mut self, region: Range, max_len: usize) -> Range {
        assert!(!region.is_empty());
        assert!(max_len > 0);

        let len = self.rng.gen_range(1..=max_len.min(region.len()));
        let offset = self.rng.gen_range(0..=region.len() - len);

        Range::with_len(region.low() + offset as Address, len).expect("Within region")
    }

    /// Fills `bytes` with random content.
    pub fn scribble(&mut self, bytes: &mut [u8]) { self.rng.fill(bytes); }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn scribbler_range_within() {
    let mut scribbler = Scribbler::new(5);
    let region = Range::new(0x100, 0x1FF).unwrap();

    for _ in 0..1_000 {
        let range = scribbler.range(region, 64);

        assert!(region.contains(&range), "{:?}", range);
        assert!(range.len() <= 64, "{:?}", range);
    }
}

#[test]
fn scribbler_replayable() {
    let mut first = Scribbler::new(9);
    let mut second = Scribbler::new(9);

    let mut a = [0u8; 16];
    let mut b = [0u8; 16];

    first.scribble(&mut a);
    second.scribble(&mut b);

    assert_eq!(a, b);
}

} // mod tests
