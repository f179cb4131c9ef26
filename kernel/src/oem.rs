// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! OEM integration hooks.
//!
//! The original firmware published these as weak symbols with no-op
//! defaults; here they are a trait the boot orchestrator is generic over,
//! with [`NoopOem`] as the zero-cost default implementation.

/// Boot progress stages reported through [`OemHooks::boot_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootStage {
    Starting,
    CheckingProvisionedData,
    NoProvisionedData,
    BadProvisionedDataHash,
    GoodProvisionedData,
    ExaminingUpdate,
    CheckingVersion,
    BadVersion,
    BadTarget,
    NoUpdate,
    Update,
    InstallingUpdate,
    UpdateInstalled,
    ExaminingImage,
    NoImage,
    LaunchingImage,
    ImageReturned,
    RaisingLockdownLevel,
    Failed,
}

/// Outcome classes reported through the update log hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    None,
    Success,
    FailVersion,
}

/// Why this boot took as long as it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootReason {
    NormalBoot,
    UpdateAndBoot,
    FailedUpdate,
    NoApplication,
}

pub trait OemHooks {
    /// Boot progress tracking.
    fn boot_status(&self, _stage: BootStage) {}

    /// Update outcome logging.
    fn update_log(&self, _event: UpdateEvent) {}

    /// Called when no application can be launched, before the SBM parks
    /// itself.
    fn launch_fail(&self) {}

    /// Report the measured SBM code and provisioned-data sizes.
    fn report_sbm_sizes(&self, _sbm_size: u32, _pd_size: u32) {}

    /// Record the boot time once the boot timer has been stopped.
    fn record_boot_time(&self, _reason: BootReason, _boot_time_us: u32) {}
}

/// The do-nothing OEM hook set.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOem;

impl OemHooks for NoopOem {}
