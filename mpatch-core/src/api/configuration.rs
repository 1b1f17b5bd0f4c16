//! The configuration of mpatch-core.
//!
//! The non-volatile arena is carved into blocks of a fixed size, each block prefixed by a small link header:
//!
//! -   2 bytes: index of the next free block, while on the free list.
//! -   2 bytes: index of the next block of the chain, while allocated.
//! -   `BLOCK_PAYLOAD` bytes: payload.
//!
//! A patch occupies a chain of blocks, starting with a `PATCH_HEADER_SIZE` bytes header followed by the copy of the
//! memory it records.

/// Size, in bytes, of the link header preceding the payload of each block.
pub const BLOCK_LINK_SIZE: usize = 4;

/// Size, in bytes, of the header of a patch: next patch (2), stage clock (4), low (4) and high (4).
pub const PATCH_HEADER_SIZE: usize = 14;

/// Maximum number of blocks in a pool.
///
/// Block indices are 16 bits, and 0xFFFF is reserved as the "no block" sentinel.
pub const MAX_BLOCKS: usize = 0xFFFE;

/// Configuration
///
/// The Configuration instance allows adjusting the geometry of the block pool.
pub trait Configuration {
    /// The number of payload bytes of each block.
    ///
    /// The minimum is `PATCH_HEADER_SIZE`, as the header of a patch must fit within its first block.
    const BLOCK_PAYLOAD: usize;
}

/// Properties
///
/// Properties of a given Configuration.
///
/// Work-around for the inability to implement static methods directly on a trait.
pub struct Properties<C>(C);

impl<C> Properties<C>
    where
        C: Configuration
{
    /// Returns the distance, in bytes, between the starts of 2 consecutive blocks.
    pub fn block_stride() -> usize { C::BLOCK_PAYLOAD + BLOCK_LINK_SIZE }

    /// Returns the number of blocks carved out of an arena of `arena_len` bytes.
    pub fn block_count(arena_len: usize) -> usize {
        if C::BLOCK_PAYLOAD == 0 {
            return 0;
        }

        core::cmp::min(arena_len / Self::block_stride(), MAX_BLOCKS)
    }

    /// Returns the minimum number of interval nodes needed to resolve chains over `block_count` blocks.
    ///
    /// Each patch occupies at least one block, and the fragments inserted by the resolver are disjoint with bounds
    /// taken from the patch bounds, hence at most `2 * patches - 1` of them are ever inserted at once.
    pub fn scratch_nodes(block_count: usize) -> usize { 2 * block_count + 1 }

    /// Validates the configuration against an arena of `arena_len` bytes, returning the number of blocks.
    pub fn validate(arena_len: usize) -> Result<usize, super::Error> {
        use super::Error::Misconfigured;

        if C::BLOCK_PAYLOAD < PATCH_HEADER_SIZE {
            return Err(Misconfigured("block payload smaller than patch header"));
        }

        match Self::block_count(arena_len) {
            0 => Err(Misconfigured("arena too small for a single block")),
            count => Ok(count),
        }
    }
}

#[cfg(test)]
mod tests {

use super::*;

struct TestConfiguration;

impl Configuration for TestConfiguration {
    const BLOCK_PAYLOAD: usize = 600;
}

struct TinyConfiguration;

impl Configuration for TinyConfiguration {
    const BLOCK_PAYLOAD: usize = 8;
}

type TestProperties = Properties<TestConfiguration>;

#[test]
fn properties_block_stride() {
    assert_eq!(604, TestProperties::block_stride());
}

#[test]
fn properties_block_count() {
    assert_eq!(0, TestProperties::block_count(0));
    assert_eq!(0, TestProperties::block_count(603));
    assert_eq!(1, TestProperties::block_count(604));
    assert_eq!(1, TestProperties::block_count(1207));
    assert_eq!(2, TestProperties::block_count(1208));
    assert_eq!(MAX_BLOCKS, TestProperties::block_count(usize::MAX));
}

#[test]
fn properties_validate() {
    use crate::Error::Misconfigured;

    assert_eq!(Ok(4), TestProperties::validate(4 * 604 + 17));
    assert!(matches!(TestProperties::validate(600), Err(Misconfigured(_))));
    assert!(matches!(Properties::<TinyConfiguration>::validate(4096), Err(Misconfigured(_))));
}

} // mod tests
