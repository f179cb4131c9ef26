// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Boot orchestrator flows over the simulated platform.

mod common;

use common::*;
use sbm::boot::BootError;
use sbm::oem::{BootReason, BootStage};
use sbm::swup::SwupStatus;
use sbm::LockdownMode;

const UUID_A: [u8; 16] = [0xa1; 16];
const BODY_LEN: usize = 8192;

#[test]
fn boot_installs_a_fresh_update() {
    let swup = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let mut rig = TestRig::new(&[&swup.image]);
    let oem = rig.oem;
    let mut sbm = rig.sbm();

    let summary = sbm.boot().unwrap();
    assert_eq!(summary.reason, BootReason::UpdateAndBoot);
    assert_eq!(summary.version, 0x0100_0001);
    assert_eq!(summary.exec_start, EXEC_START);
    assert_eq!(sbm.last_status(), SwupStatus::InstalledThisBoot);
    assert!(sbm.executable_slot_module_valid());

    let stages = oem.stages.borrow();
    assert!(stages.contains(&BootStage::InstallingUpdate));
    assert!(stages.contains(&BootStage::UpdateInstalled));
    assert!(stages.contains(&BootStage::LaunchingImage));
}

#[test]
fn good_boot_with_previously_installed_update() {
    let swup = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let mut rig = TestRig::new(&[&swup.image]);

    // First boot installs.
    rig.sbm().boot().unwrap();

    // "Reset": persistent RAM clears, flash survives. The package is
    // still in the update slot but matches the installed UUID.
    rig.reset_persistent();
    let mut sbm = rig.sbm();
    let summary = sbm.boot().unwrap();
    assert_eq!(summary.reason, BootReason::NormalBoot);
    assert_eq!(sbm.last_status(), SwupStatus::InstalledPrevious);
}

#[test]
fn good_boot_with_no_update_present() {
    let swup = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let mut rig = TestRig::new(&[&swup.image]);
    rig.sbm().boot().unwrap();

    // Clear both update slots; the installed image boots on its own.
    for slot in rig.map.update_slots {
        rig.map.erase(slot, 0, slot.size).unwrap();
    }
    rig.reset_persistent();
    rig.oem.stages.borrow_mut().clear();

    let oem = rig.oem;
    let mut sbm = rig.sbm();
    let summary = sbm.boot().unwrap();
    assert_eq!(summary.reason, BootReason::NormalBoot);
    assert_eq!(summary.version, 0x0100_0001);

    let stages = oem.stages.borrow();
    assert!(stages.contains(&BootStage::NoUpdate));
    assert!(stages.contains(&BootStage::ExaminingImage));
    assert!(stages.contains(&BootStage::LaunchingImage));
}

#[test]
fn boot_prefers_the_newest_of_two_updates() {
    let v1 = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let v2 = build_swup([0xb2; 16], 0x0100_0002, BODY_LEN);
    let mut rig = TestRig::new(&[&v1.image, &v2.image]);

    let mut sbm = rig.sbm();
    let summary = sbm.boot().unwrap();
    assert_eq!(summary.version, 0x0100_0002);
    assert_eq!(sbm.last_installed_uuid(), [0xb2; 16]);
}

#[test]
fn boot_fails_without_provisioned_data() {
    let mut rig = TestRig::new(&[]);

    // Knock out the presence magic.
    rig.patch_slot(&rig.map.sbm_slot, PD_OFFSET, |b| *b = 0xff);
    rig.patch_slot(&rig.map.sbm_slot, PD_OFFSET + 1, |b| *b = 0xff);

    let oem = rig.oem;
    let mut sbm = rig.sbm();
    assert_eq!(sbm.boot().err(), Some(BootError::NoProvisionedData));
    assert!(oem.stages.borrow().contains(&BootStage::NoProvisionedData));
}

#[test]
fn boot_fails_on_bad_provisioned_data_hash() {
    let mut rig = TestRig::new(&[]);

    // Flip one bit of the stored provisioned-data hash.
    rig.patch_slot(&rig.map.sbm_slot, PD_OFFSET + 20, |b| *b ^= 0x01);

    let oem = rig.oem;
    let mut sbm = rig.sbm();
    assert_eq!(sbm.boot().err(), Some(BootError::BadProvisionedDataHash));
    assert!(oem
        .stages
        .borrow()
        .contains(&BootStage::BadProvisionedDataHash));
}

#[test]
fn boot_fails_with_no_image_and_no_update() {
    let mut rig = TestRig::new(&[]);
    let oem = rig.oem;
    let mut sbm = rig.sbm();
    assert_eq!(sbm.boot().err(), Some(BootError::NoImage));
    assert!(oem.stages.borrow().contains(&BootStage::NoImage));
}

#[test]
fn immediate_lockdown_is_raised_before_provisioning_checks() {
    let swup = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let mut rig = TestRig::new(&[&swup.image]);
    rig.policy.lockdown = LockdownMode::Immediate;
    rig.policy.lockdown_level = 1;

    let hal = rig.hal;
    let oem = rig.oem;
    let mut sbm = rig.sbm();
    sbm.boot().unwrap();
    assert_eq!(hal.lockdown.get(), 1);

    let stages = oem.stages.borrow();
    let raise = stages
        .iter()
        .position(|s| *s == BootStage::RaisingLockdownLevel)
        .unwrap();
    let starting = stages
        .iter()
        .position(|s| *s == BootStage::Starting)
        .unwrap();
    assert!(raise < starting);
}

#[test]
fn delayed_lockdown_is_raised_after_image_check() {
    let swup = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let mut rig = TestRig::new(&[&swup.image]);
    rig.policy.lockdown = LockdownMode::Delayed;
    rig.policy.lockdown_level = 1;

    let hal = rig.hal;
    let oem = rig.oem;
    let mut sbm = rig.sbm();
    sbm.boot().unwrap();
    assert_eq!(hal.lockdown.get(), 1);

    let stages = oem.stages.borrow();
    let raise = stages
        .iter()
        .position(|s| *s == BootStage::RaisingLockdownLevel)
        .unwrap();
    let examining = stages
        .iter()
        .position(|s| *s == BootStage::ExaminingImage)
        .unwrap();
    assert!(raise > examining);
}
