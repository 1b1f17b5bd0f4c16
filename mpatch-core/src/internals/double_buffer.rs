//! Double buffering of durable structures.
//!
//! A durable structure is kept in 2 copies, one per parity of the logical clock:
//!
//! -   A checkpoint taken at clock `c` writes the copy `c % 2`.
//! -   Once the clock is bumped to `c + 1`, the copy `c % 2` is the committed one.
//!
//! Hence at clock `c`, the committed copy is `(c + 1) % 2`, and the copy `c % 2` is free to be overwritten: whatever
//! happens to it, a power loss before the next bump will restore from the other one.

use crate::utils;

/// DoubleBuffered
#[derive(Clone, Copy, Debug)]
pub(crate) struct DoubleBuffered<T>([T; 2]);

impl<T> DoubleBuffered<T>
    where
        T: Copy
{
    /// Creates an instance, with both copies set to `value`.
    pub(crate) const fn new(value: T) -> Self { Self([value, value]) }

    /// Resets both copies to `value`.
    pub(crate) fn reset(&mut self, value: T) { self.0 = [value, value]; }

    /// Stores `value` into the copy written by a checkpoint at `clock`.
    pub(crate) fn store(&mut self, clock: u32, value: T) { self.0[utils::parity(clock)] = value; }

    /// Loads the copy committed as of `clock`.
    pub(crate) fn load(&self, clock: u32) -> T { self.0[utils::parity(clock.wrapping_add(1))] }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn double_buffered_store_load() {
    let mut buffer = DoubleBuffered::new(0u32);

    //  Checkpoint at 0, then commit to 1.
    buffer.store(0, 10);
    assert_eq!(0, buffer.load(0));
    assert_eq!(10, buffer.load(1));

    //  Checkpoint at 1, interrupted: clock still 1.
    buffer.store(1, 11);
    assert_eq!(10, buffer.load(1));

    //  Checkpoint at 1 again, then commit to 2.
    buffer.store(1, 12);
    assert_eq!(12, buffer.load(2));
}

#[test]
fn double_buffered_reset() {
    let mut buffer = DoubleBuffered::new(0u32);

    buffer.store(0, 10);
    buffer.reset(3);

    assert_eq!(3, buffer.load(0));
    assert_eq!(3, buffer.load(1));
}

} // mod tests
