#![no_std]

#![deny(missing_docs)]

//! Building blocks for intermittent computing.
//!
//! mpatch-core lets a device which loses power unpredictably resume execution as if nothing happened. It contains:
//! -   A block pool, carving a non-volatile arena into fixed-size blocks addressed by index.
//! -   A patch store, recording immutable copies of modified memory ranges, newest first.
//! -   An interval resolver, replaying patches newest-wins and spotting the obsolete ones.
//! -   A checkpointer, committing whole-process snapshots behind a double-buffered logical clock.
//!
//! Platform specifics, such as raw memory accesses, barriers or the register file, are abstracted by the `Platform`
//! and `Processor` traits, so the same logic runs on bare-metal targets and on a hosted simulator.

#[cfg(test)]
extern crate std;

mod api;
mod internals;
mod utils;

pub use api::*;
