//  Power cuts at arbitrary write barriers.
//
//  Whichever the barrier power is cut at, while checkpointing, sweeping, staging, or restoring, the restored memory
//  must match the memory of the last committed checkpoint.

mod common;

use serial_test::serial;

use mpatch::SimDevice;
use mpatch_core::{Boot, ResumeKind};
use mpatch_test::{Scribbler, Snapshot};

use common::*;

const ROUNDS: usize = 2_000;

const BLOCKS: usize = 96;

const REGION_LEN: usize = 512;

const MAX_TOUCH: usize = 256;

fn play(device: &mut SimDevice, scribbler: &mut Scribbler) {
    touch(device, scribbler, REGION_LEN, MAX_TOUCH);
    scribble_sections(device, scribbler, MAX_TOUCH);
}

//  Boots, cutting power at random barriers until a boot completes.
fn reboot(mut device: SimDevice, scribbler: &mut Scribbler) -> (SimDevice, usize) {
    let mut cuts = 0;

    loop {
        device = device.power_cycle(scribbler.rng()).unwrap();

        arm(&mut device, scribbler, 4);

        if let Some(boot) = powered(|| device.boot()) {
            assert_eq!(Boot::Restored, boot);

            device.platform_mut().cut_power_at(None);

            return (device, cuts);
        }

        cuts += 1;
    }
}

#[test]
#[serial]
fn power_loss_while_checkpointing() {
    silence_power_losses();

    let mut scribbler = Scribbler::new(0xC0FF_EE00);
    let mut device = setup(&mut scribbler, BLOCKS, REGION_LEN);

    let mut expected = capture(&device, REGION_LEN);
    let mut cuts = 0;

    for round in 0..ROUNDS {
        play(&mut device, &mut scribbler);

        let candidate = capture(&device, REGION_LEN);
        let clock = device.context().clock();

        arm(&mut device, &mut scribbler, 16);

        match powered(|| device.checkpoint()) {
            Some(resume) => {
                assert_eq!(ResumeKind::FreshReturn, resume, "round {}", round);

                device.platform_mut().cut_power_at(None);
                expected = candidate;

                if scribbler.chance(3, 4) {
                    continue;
                }
            },
            None => {
                cuts += 1;

                //  Cut after the commit point.
                if device.context().clock() != clock {
                    expected = candidate;
                }
            },
        }

        let (rebooted, _) = reboot(device, &mut scribbler);
        device = rebooted;

        check(&device, &expected, round);
    }

    assert!(cuts > ROUNDS / 10, "{} cuts", cuts);
    assert!(device.context().free_blocks() > 0);

    let _ = std::panic::take_hook();
}

#[test]
#[serial]
fn power_loss_while_recovering() {
    silence_power_losses();

    let mut scribbler = Scribbler::new(0xBAD_F00D);
    let mut device = setup(&mut scribbler, BLOCKS, REGION_LEN);

    let mut cuts = 0;

    for round in 0..ROUNDS {
        play(&mut device, &mut scribbler);

        assert_eq!(ResumeKind::FreshReturn, device.checkpoint(), "round {}", round);

        let expected: Snapshot = capture(&device, REGION_LEN);

        //  Work lost to the power loss, possibly in the middle of a delete.
        play(&mut device, &mut scribbler);

        arm(&mut device, &mut scribbler, 32);

        let outcome = powered(|| {
            let context = device.context_mut();

            context.sweep().unwrap();
            context.stage_all(true).unwrap()
        });

        if outcome.is_none() {
            cuts += 1;
        }

        let (rebooted, boot_cuts) = reboot(device, &mut scribbler);
        device = rebooted;
        cuts += boot_cuts;

        check(&device, &expected, round);
    }

    assert!(cuts > ROUNDS / 10, "{} cuts", cuts);
    assert!(device.context().free_blocks() > 0);

    let _ = std::panic::take_hook();
}
