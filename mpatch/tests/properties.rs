use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

use mpatch::{SimDevice, layout};
use mpatch_core::{Address, Boot, PatchKind, Range, ResumeKind};

const BLOCKS: usize = 64;

const REGION_LEN: usize = 4096;

const MAX_WRITE: usize = 512;

//  A write of `len` bytes of `value`, at `offset` within the region.
#[derive(Clone, Copy, Debug)]
struct Write {
    offset: usize,
    len: usize,
    value: u8,
}

impl Write {
    fn range(&self) -> Range {
        Range::with_len(layout::HEAP.low() + self.offset as Address, self.len).expect("Within heap")
    }
}

fn writes() -> impl Strategy<Value = Vec<Write>> {
    let write = (0..=REGION_LEN - MAX_WRITE, 1..=MAX_WRITE, any::<u8>())
        .prop_map(|(offset, len, value)| Write { offset, len, value });

    prop::collection::vec(write, 1..16)
}

fn region() -> Range { Range::with_len(layout::HEAP.low(), REGION_LEN).expect("Within heap") }

//  The expected content of the region, for the bytes written at least once.
fn model(writes: &[Write]) -> Vec<Option<u8>> {
    let mut model = vec![None; REGION_LEN];

    for write in writes {
        model[write.offset..write.offset + write.len].fill(Some(write.value));
    }

    model
}

fn mismatch(device: &SimDevice, model: &[Option<u8>]) -> Option<(usize, u8, u8)> {
    let bytes = device.memory(region());

    model.iter()
        .zip(bytes)
        .enumerate()
        .find_map(|(offset, (expected, actual))| match expected {
            Some(expected) if expected != actual => Some((offset, *expected, *actual)),
            _ => None,
        })
}

//  Plays `writes`, each tracked in slot 0 and checkpointed on its own.
fn play(writes: &[Write]) -> SimDevice {
    let mut device = SimDevice::new(BLOCKS).expect("Powered on");

    assert_eq!(Boot::Cold, device.boot());
    device.checkpointer_mut().set_available();

    for write in writes {
        let range = write.range();

        device.memory_mut(range).fill(write.value);

        //  Safety:
        //  -   The heap lies within the SRAM of the device.
        unsafe { device.context_mut().new_region(0, range, PatchKind::SingleShot).expect("Valid slot") };

        assert_eq!(ResumeKind::FreshReturn, device.checkpoint());
    }

    device
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn restore_matches_newest_writes(writes in writes(), seed in any::<u64>()) {
        let device = play(&writes);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut device = device.power_cycle(&mut rng).expect("Powered on");

        prop_assert_eq!(Boot::Restored, device.boot());
        prop_assert_eq!(writes.len() as u32, device.context().clock());
        prop_assert_eq!(None, mismatch(&device, &model(&writes)));
    }

    #[test]
    fn sweep_preserves_content(writes in writes(), scrambled in any::<u8>()) {
        let mut device = play(&writes);

        let free = device.context().free_blocks();
        let swept = device.context_mut().sweep().expect("Swept");

        prop_assert_eq!(free + swept.blocks, device.context().free_blocks());

        device.memory_mut(region()).fill(scrambled);
        device.context_mut().apply_all(false).expect("Applied");

        prop_assert_eq!(None, mismatch(&device, &model(&writes)));
    }

    #[test]
    fn range_union_contains_both(a in 1..0x1_0000u32, b in 1..0x1_0000u32, len in 1..0x100usize) {
        let first = Range::with_len(a, len).expect("No overflow");
        let second = Range::with_len(b, len).expect("No overflow");

        let union = first.union(&second);

        prop_assert!(union.contains(&first));
        prop_assert!(union.contains(&second));
        prop_assert_eq!(first.overlaps(&second), second.overlaps(&first));
        prop_assert_eq!(union.len() < 2 * len, first.overlaps(&second));
    }
}
