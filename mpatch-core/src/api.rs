//! The API of mpatch-core.

mod checkpointer;
mod configuration;
mod context;
mod error;
mod patch;
mod platform;
mod processor;
mod range;

pub use checkpointer::{Boot, Checkpointer};
pub use configuration::{Configuration, Properties, BLOCK_LINK_SIZE, MAX_BLOCKS, PATCH_HEADER_SIZE};
pub use context::{ApplyReport, CheckpointContext, NonVolatile, RecoveryReport, SweepReport};
pub use error::Error;
pub use patch::{PatchHandle, PatchKind, PendingPatch};
pub use platform::Platform;
pub use processor::{MemoryMap, Processor, ResumeKind};
pub use range::{Address, Range};

pub use crate::internals::interval::IntervalNode;
