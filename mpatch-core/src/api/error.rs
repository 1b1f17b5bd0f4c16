//! Errors of mpatch-core.
//!
//! Most errors are either recovered locally, such as a transiently exhausted block pool, or fatal: there is no
//! operator to report to on an intermittently powered device, hence the caller is expected to halt on the latter.

use thiserror::Error;

/// Error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The block pool cannot satisfy an allocation; a sweep may reclaim obsolete patches.
    #[error("block pool exhausted: {needed} blocks needed, {available} available")]
    Exhausted {
        /// Number of blocks requested.
        needed: usize,
        /// Number of blocks free at the time of the request.
        available: usize,
    },
    /// The block pool is still exhausted after sweeping obsolete patches.
    #[error("unrecoverable out-of-memory")]
    OutOfMemory,
    /// The arena, the payload size, or the interval scratch cannot work together.
    #[error("misconfigured: {0}")]
    Misconfigured(&'static str),
    /// The slot does not exist.
    #[error("invalid slot: {0}")]
    InvalidSlot(usize),
    /// There is nothing to stage within an empty range.
    #[error("empty range")]
    EmptyRange,
    /// The interval scratch cannot hold another fragment.
    #[error("interval scratch exhausted")]
    ScratchExhausted,
    /// A patch chain or block chain links to an invalid block.
    #[error("corrupt chain at block {0:#06x}")]
    CorruptChain(u16),
}

impl Error {
    /// Returns whether the device cannot safely continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Exhausted { .. } | Error::InvalidSlot(_) | Error::EmptyRange)
    }
}

// mod tests
