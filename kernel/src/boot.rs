// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Boot orchestration.
//!
//! Drives the whole path from reset to application launch: provisioned
//! data checks, update selection and installation, installed-image
//! verification, lockdown elevation, and the final handoff. Failure at any
//! stage funnels into [`Sbm::launch_fail`], which reports through the OEM
//! hooks and parks the device.

use crate::hal::Hal;
use crate::logging;
use crate::oem::{BootReason, BootStage, OemHooks, UpdateEvent};
use crate::swup::{InstallStatus, SwupSelectorData, SwupStatus};
use crate::{LockdownMode, Sbm};

/// Most update slots any supported integration defines.
pub const MAX_UPDATE_SLOTS: usize = 4;

/// Why the boot could not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    /// The encrypted provisioned data failed to authenticate or decrypt.
    PdbDecrypt,
    /// No plausible provisioned data block.
    NoProvisionedData,
    /// The provisioned-data hash did not match.
    BadProvisionedDataHash,
    /// An install erased the exec slot and then failed.
    Bricked,
    /// No valid application to launch.
    NoImage,
}

/// What a successful boot decided.
#[derive(Clone, Copy, Debug)]
pub struct BootSummary {
    pub reason: BootReason,
    /// Version of the image about to run.
    pub version: u32,
    /// Entry address handed to the HAL.
    pub exec_start: usize,
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Attempt to install from one selected update slot and fold the
    /// outcome into the recorded status.
    fn update_app(
        &mut self,
        entry: &mut SwupSelectorData,
        reason: &mut BootReason,
    ) -> InstallStatus {
        let mut install_status = InstallStatus::Failure;

        if entry.status == SwupStatus::Initial {
            let mut install_update = true;

            if self.executable_slot_module_valid() {
                // There is a module in the executable slot, so the update
                // version can be policed against it.
                log::info!("Checking update version");
                self.oem.boot_status(BootStage::CheckingVersion);

                let update_slot = &self.mem.update_slots[entry.slot_index];
                if self.update_version_rollback(update_slot) {
                    log::warn!(
                        "Update failed: version rollback from {:#x} to {:#x} not permitted",
                        self.piem_version(),
                        entry.version
                    );
                    self.oem.boot_status(BootStage::BadVersion);
                    self.oem.update_log(UpdateEvent::FailVersion);
                    *reason = BootReason::FailedUpdate;
                    entry.status = SwupStatus::ErrorRollback;
                    install_update = false;
                } else {
                    log::info!(
                        "Update from version {:#x} to {:#x}",
                        self.piem_version(),
                        entry.version
                    );
                    self.oem.boot_status(BootStage::Update);
                }
            }

            if install_update {
                log::info!("Installing version {:#x}", entry.version);
                self.oem.boot_status(BootStage::InstallingUpdate);
                let update_slot = &self.mem.update_slots[entry.slot_index];
                install_status =
                    self.install_module(update_slot, entry.max_offset, entry.key_instance);
                if matches!(
                    install_status,
                    InstallStatus::Success | InstallStatus::SuccessVerified
                ) {
                    entry.status = SwupStatus::InstalledThisBoot;
                    log::info!("Update installed");
                    self.oem.boot_status(BootStage::UpdateInstalled);
                    self.oem.update_log(UpdateEvent::Success);
                    *reason = BootReason::UpdateAndBoot;
                } else {
                    // The exec slot may or may not have survived; the
                    // caller decides based on the install status.
                    entry.status = SwupStatus::Error;
                }
            }
        } else if entry.status == SwupStatus::InstalledPrevious {
            install_status = InstallStatus::Success;
        }

        self.set_last_status(entry.status);
        install_status
    }

    /// The boot state machine, stopping just before the handoff so the
    /// outcome is observable. [`Sbm::run`] performs the actual launch.
    pub fn boot(&mut self) -> Result<BootSummary, BootError> {
        self.hal.boot_timer_start();

        if self.policy.lockdown == LockdownMode::Immediate
            && self.hal.lockdown_level() < self.policy.lockdown_level
        {
            log::info!("Raising lockdown level to {}", self.policy.lockdown_level);
            self.oem.boot_status(BootStage::RaisingLockdownLevel);
            self.hal.raise_lockdown();
        }

        log::info!("==========================================");
        log::info!("Secure Boot Manager starting");
        self.oem.boot_status(BootStage::Starting);
        self.oem.boot_status(BootStage::CheckingProvisionedData);

        match self.pdb_encrypted() {
            Ok(true) => {
                if self.verify_and_decrypt_pdb().is_err() {
                    return Err(BootError::PdbDecrypt);
                }
            }
            Ok(false) => {}
            Err(_) => {
                log::error!("No provisioned data");
                self.oem.boot_status(BootStage::NoProvisionedData);
                return Err(BootError::NoProvisionedData);
            }
        }

        let data_present = self.datastore().map(|ds| ds.data_present()).unwrap_or(false);
        if !data_present {
            log::error!("No provisioned data");
            self.oem.boot_status(BootStage::NoProvisionedData);
            return Err(BootError::NoProvisionedData);
        }

        let (sbm_size, pd_size) = self.calculate_sizes();
        log::info!("SBM size: {sbm_size:#06x}, data size: {pd_size:#06x}");
        self.oem.report_sbm_sizes(sbm_size, pd_size);

        #[cfg(feature = "ppd-hash")]
        if !self.datastore_hash_check() {
            log::error!("Bad provisioned data hash");
            self.oem.boot_status(BootStage::BadProvisionedDataHash);
            return Err(BootError::BadProvisionedDataHash);
        }

        self.oem.boot_status(BootStage::GoodProvisionedData);

        let mut reason = BootReason::NormalBoot;
        let mut final_status = InstallStatus::Failure;

        if !self.mem.update_slots.is_empty() {
            self.oem.boot_status(BootStage::ExaminingUpdate);

            let slot_count = self.mem.update_slots.len().min(MAX_UPDATE_SLOTS);
            let mut queue = [SwupSelectorData {
                slot_index: 0,
                status: SwupStatus::Error,
                key_instance: 0,
                max_offset: 0,
                version: 0,
            }; MAX_UPDATE_SLOTS];
            self.build_swup_priority_queue(&mut queue[..slot_count]);

            // Install from the highest-priority candidate; fall through to
            // the next on a plain failure, stop on any install.
            for index in 0..slot_count {
                log::info!(
                    "update slot \"{}\" selected for installation",
                    self.mem.update_slots[queue[index].slot_index].name
                );
                let install_status = self.update_app(&mut queue[index], &mut reason);
                if matches!(
                    install_status,
                    InstallStatus::Bricked
                        | InstallStatus::Success
                        | InstallStatus::SuccessVerified
                ) {
                    final_status = install_status;
                }
                if matches!(
                    final_status,
                    InstallStatus::Success | InstallStatus::SuccessVerified
                ) {
                    break;
                }
            }

            if final_status == InstallStatus::Bricked {
                // Past the point of no return: the exec slot has been at
                // least partially erased.
                return Err(BootError::Bricked);
            }
            if final_status == InstallStatus::Failure {
                log::info!("No update present");
                self.oem.boot_status(BootStage::NoUpdate);
                self.oem.update_log(UpdateEvent::None);
            }
        }

        log::info!("Checking installed executable signature");
        self.oem.boot_status(BootStage::ExaminingImage);

        // Skip re-verification only if the install already verified.
        if final_status != InstallStatus::SuccessVerified && !self.executable_slot_module_valid() {
            self.stop_boot_timer(BootReason::NoApplication);
            self.oem.boot_status(BootStage::NoImage);
            return Err(BootError::NoImage);
        }

        if self.policy.lockdown == LockdownMode::Delayed
            && self.hal.lockdown_level() < self.policy.lockdown_level
        {
            log::info!("Raising lockdown level to {}", self.policy.lockdown_level);
            self.oem.boot_status(BootStage::RaisingLockdownLevel);
            self.hal.raise_lockdown();
        }

        let version = self.piem_version();
        log::info!("Running executable image version {version:#x}");
        self.oem.boot_status(BootStage::LaunchingImage);

        // Nothing secret may survive into the application.
        self.clear_plaintext_pdb();
        self.work.wipe();
        self.stop_boot_timer(reason);

        Ok(BootSummary {
            reason,
            version,
            exec_start: self.mem.exec_slot.start,
        })
    }

    fn stop_boot_timer(&mut self, reason: BootReason) {
        let elapsed = self.hal.boot_timer_stop();
        self.persist.boot_time_us = elapsed;
        if self.policy.record_boot_time {
            log::info!("SBM boot time: {} ms", (elapsed + 500) / 1000);
            self.oem.record_boot_time(reason, elapsed);
        }
    }

    /// Boot and hand over to the application. Never returns.
    pub fn run(&mut self) -> ! {
        match self.boot() {
            Ok(summary) => {
                logging::disable();
                self.hal.run_application(summary.exec_start);
                // Should never return but, just in case...
                self.oem.boot_status(BootStage::ImageReturned);
                self.launch_fail();
            }
            Err(_) => self.launch_fail(),
        }
    }

    /// Report the failure and park forever, toggling the error LED.
    pub fn launch_fail(&mut self) -> ! {
        self.clear_plaintext_pdb();
        log::error!("Boot failed");
        self.oem.boot_status(BootStage::Failed);
        self.oem.launch_fail();
        logging::disable();
        loop {
            self.hal.led_toggle();
        }
    }
}
