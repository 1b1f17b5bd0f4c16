//  Helpers shared by the randomized tests.
//
//  The heap is split into one region per slot. The application is played by a `Scribbler`, which modifies random
//  ranges of the regions, tracking them, as well as random ranges of the sections.

#![allow(dead_code)]

use std::panic::{self, AssertUnwindSafe};

use mpatch::{PowerLoss, SLOTS, SimDevice, layout};
use mpatch_core::{Address, Boot, PatchKind, Processor, Range, ResumeKind};
use mpatch_test::{Scribbler, Snapshot};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn region(slot: usize, len: usize) -> Range {
    Range::with_len(layout::HEAP.low() + (slot * len) as Address, len).unwrap()
}

pub fn live_stack(device: &SimDevice) -> Range {
    Range::new(device.processor().stack_pointer(), layout::STACK.high()).unwrap()
}

//  Captures the sections, and the regions.
pub fn capture(device: &SimDevice, region_len: usize) -> Snapshot {
    let mut ranges = vec![layout::DATA, layout::BSS, live_stack(device)];
    ranges.extend((0..SLOTS).map(|slot| region(slot, region_len)));

    Snapshot::capture(&ranges, |range| device.memory(range))
}

pub fn check(device: &SimDevice, expected: &Snapshot, round: usize) {
    if let Some(mismatch) = expected.mismatch(|range| device.memory(range)) {
        panic!("round {}: {}", round, mismatch);
    }
}

pub fn scribble(device: &mut SimDevice, scribbler: &mut Scribbler, range: Range) {
    scribbler.scribble(device.memory_mut(range));
}

//  Modifies a random range of each section.
pub fn scribble_sections(device: &mut SimDevice, scribbler: &mut Scribbler, max_touch: usize) {
    let stack = live_stack(device);

    for section in [layout::DATA, layout::BSS, stack] {
        let range = scribbler.range(section, max_touch);
        scribble(device, scribbler, range);
    }
}

//  Modifies, and tracks, random ranges of random regions.
pub fn touch(device: &mut SimDevice, scribbler: &mut Scribbler, region_len: usize, max_touch: usize) {
    let mut touched = [false; SLOTS];

    for _ in 0..scribbler.between(1, 6) {
        let slot = scribbler.between(0, SLOTS - 1);
        let range = scribbler.range(region(slot, region_len), max_touch);

        scribble(device, scribbler, range);

        let context = device.context_mut();

        //  Safety:
        //  -   The regions lie within the SRAM of the device.
        unsafe {
            if touched[slot] {
                context.modify_region(slot, range, None).unwrap();
            } else {
                let kind = if scribbler.chance(1, 2) { PatchKind::SingleShot } else { PatchKind::Continuous };
                context.new_region(slot, range, kind).unwrap();
            }
        }

        touched[slot] = true;
    }
}

//  Returns a device, cold booted, whose regions and sections were all checkpointed once, with the restore point set.
pub fn setup(scribbler: &mut Scribbler, blocks: usize, region_len: usize) -> SimDevice {
    init_logging();

    let mut device = SimDevice::new(blocks).unwrap();

    assert_eq!(Boot::Cold, device.boot());

    for slot in 0..SLOTS {
        let region = region(slot, region_len);

        scribble(&mut device, scribbler, region);

        unsafe { device.context_mut().new_region(slot, region, PatchKind::SingleShot).unwrap() };
    }

    let stack = live_stack(&device);

    for section in [layout::DATA, layout::BSS, stack] {
        scribble(&mut device, scribbler, section);
    }

    assert_eq!(ResumeKind::FreshReturn, device.checkpoint());
    device.checkpointer_mut().set_available();

    device
}

//  Arms a power cut at one of the next `within` barriers.
pub fn arm(device: &mut SimDevice, scribbler: &mut Scribbler, within: usize) {
    let barrier = device.platform().barriers() + scribbler.between(1, within) as u64;

    device.platform_mut().cut_power_at(Some(barrier));
}

//  Runs `f`, returning None if power was cut.
pub fn powered<T>(f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(payload) if payload.is::<PowerLoss>() => None,
        Err(payload) => panic::resume_unwind(payload),
    }
}

//  Keeps the power cuts out of the test output.
pub fn silence_power_losses() {
    let default = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        if !info.payload().is::<PowerLoss>() {
            default(info);
        }
    }));
}
