//! The internals of mpatch-core.
//!
//! The internals provide all the heavy-lifting.

pub mod block_pool;
pub mod clock;
pub mod delete_log;
pub mod double_buffer;
pub mod interval;
pub mod patch_store;
pub mod pending;

#[cfg(test)]
pub(crate) mod test;
