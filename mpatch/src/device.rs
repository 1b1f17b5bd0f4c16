//! The simulated device, assembled.

use log::debug;
use rand::Rng;

use mpatch_core::{
    Boot, CheckpointContext, Checkpointer, Error, IntervalNode, NonVolatile, Properties, Range, ResumeKind,
};

use crate::{CODE_IDENTITY, SimConfiguration, SimPlatform, SimProcessor};

/// The number of patch slots of the simulated device.
pub const SLOTS: usize = 4;

/// The checkpoint context of the simulated device.
pub type SimContext = CheckpointContext<SimConfiguration, SimPlatform, Vec<u8>, Vec<IntervalNode>, SLOTS>;

/// The checkpointer of the simulated device.
pub type SimCheckpointer =
    Checkpointer<SimConfiguration, SimPlatform, SimProcessor, Vec<u8>, Vec<IntervalNode>, SLOTS>;

/// SimDevice
///
/// A whole device: memory, processor, non-volatile arena, and the checkpointer tying them together.
///
/// The device is powered on by `new`, and cycled by `power_cycle`; neither boots it, which is left to `boot`.
pub struct SimDevice {
    checkpointer: SimCheckpointer,
}

impl SimDevice {
    /// Creates a device with an arena of `blocks` blocks, running this very build.
    pub fn new(blocks: usize) -> Result<Self, Error> { Self::with_identity(blocks, CODE_IDENTITY) }

    /// Creates a device with an arena of `blocks` blocks, running the firmware of the given `identity`.
    pub fn with_identity(blocks: usize, identity: u32) -> Result<Self, Error> {
        let arena = vec![0; blocks * Properties::<SimConfiguration>::block_stride()];

        Self::power_on(SimPlatform::new(), SimProcessor::new(), NonVolatile::new(arena), identity)
    }

    /// Returns a reference to the checkpointer.
    pub fn checkpointer(&self) -> &SimCheckpointer { &self.checkpointer }

    /// Returns a mutable reference to the checkpointer.
    pub fn checkpointer_mut(&mut self) -> &mut SimCheckpointer { &mut self.checkpointer }

    /// Returns a reference to the checkpoint context.
    pub fn context(&self) -> &SimContext { self.checkpointer.context() }

    /// Returns a mutable reference to the checkpoint context.
    pub fn context_mut(&mut self) -> &mut SimContext { self.checkpointer.context_mut() }

    /// Returns a reference to the platform.
    pub fn platform(&self) -> &SimPlatform { self.context().platform() }

    /// Returns a mutable reference to the platform.
    pub fn platform_mut(&mut self) -> &mut SimPlatform { self.context_mut().platform_mut() }

    /// Returns a reference to the processor.
    pub fn processor(&self) -> &SimProcessor { self.checkpointer.processor() }

    /// Returns a mutable reference to the processor.
    pub fn processor_mut(&mut self) -> &mut SimProcessor { self.checkpointer.processor_mut() }

    /// Returns the bytes of `range`.
    pub fn memory(&self, range: Range) -> &[u8] { self.platform().bytes(range) }

    /// Returns the bytes of `range`, mutably.
    pub fn memory_mut(&mut self, range: Range) -> &mut [u8] { self.platform_mut().bytes_mut(range) }

    /// Boots, restoring the last checkpoint if available.
    pub fn boot(&mut self) -> Boot { self.checkpointer.boot() }

    /// Takes a checkpoint.
    pub fn checkpoint(&mut self) -> ResumeKind { self.checkpointer.checkpoint() }

    /// Loses power, then powers on again, still running the same firmware.
    ///
    /// The SRAM and the register file are lost; the FRAM, the arena and the saved register files survive.
    pub fn power_cycle<R: Rng>(self, rng: &mut R) -> Result<Self, Error> {
        let identity = self.checkpointer.identity();

        self.reflash(rng, identity)
    }

    /// Loses power, then powers on again, running the firmware of the given `identity`.
    pub fn reflash<R: Rng>(self, rng: &mut R, identity: u32) -> Result<Self, Error> {
        let (context, mut processor) = self.checkpointer.into_parts();
        let (mut platform, nv, _) = context.power_off();

        debug!("Power lost after {} barriers", platform.barriers());

        platform.power_loss(rng);
        processor.power_loss(rng);

        Self::power_on(platform, processor, nv, identity)
    }

    fn power_on(
        platform: SimPlatform,
        processor: SimProcessor,
        nv: NonVolatile<Vec<u8>, SLOTS>,
        identity: u32,
    )
        -> Result<Self, Error>
    {
        let blocks = nv.block_count::<SimConfiguration>();
        let scratch = vec![IntervalNode::EMPTY; Properties::<SimConfiguration>::scratch_nodes(blocks)];

        let context = SimContext::new(platform, nv, scratch)?;

        Ok(Self { checkpointer: Checkpointer::new(context, processor, identity) })
    }
}

// mod tests
