#![deny(missing_docs)]

//! Test helpers for mpatch.
//!
//! -   `Snapshot` captures the expected content of memory at a commit point, and reports the first divergence.
//! -   `Scribbler` plays the application, modifying random ranges of memory.

mod scribbler;
mod snapshot;

pub use scribbler::Scribbler;
pub use snapshot::{Mismatch, Snapshot};
