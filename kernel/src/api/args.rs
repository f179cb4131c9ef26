// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Secure API input structures.
//!
//! These are caller-allocated PODs; their layout is ABI with applications.
//! Pointer fields are untrusted application addresses and every one of
//! them is validated by its handler before use.

use sbmdefs::{AppInfoRecord, MemorySlotId, PdSlot};

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct SlotNumberOfDeviceCertificateArgs {
    pub usage: u16,
    pub instance: u8,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GetX509CertificateFromSlotArgs {
    pub slot: u8,
    pub buf: *mut u8,
    pub len: u16,
    pub cert_len: *mut u16,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct NumberOfKeysArgs {
    pub key_type: u16,
    pub key_usage: u16,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct SlotNumberOfKeyArgs {
    pub key_type: u16,
    pub key_usage: u16,
    pub instance: u8,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct SlotNumberOfKeyForCertificateArgs {
    pub slot: PdSlot,
    pub key_type: *mut u16,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct DetailsOfKeyArgs {
    pub slot: PdSlot,
    pub key_type: *mut u16,
    pub key_usage: *mut u16,
    pub public_key: *mut u8,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct SignUsingKeyArgs {
    pub slot: PdSlot,
    pub hash: *const u8,
    pub hlen: u16,
    pub sig: *mut u8,
    pub sig_len: *mut u16,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct VerifyUsingKeyArgs {
    pub slot: PdSlot,
    pub hash: *const u8,
    pub hlen: u16,
    pub sig: *const u8,
    pub slen: u16,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GenerateSharedSecretArgs {
    pub slot: PdSlot,
    pub public_key: *const u8,
    pub shared_secret: *mut u8,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GetSbmInformationArgs {
    pub sbm_ver: *mut u8,
    pub sbm_ver_length: *mut u32,
    pub sbm_build_time: *mut u8,
    pub sbm_build_time_length: *mut u32,
    pub provisioned_ver: *mut u8,
    pub provisioned_ver_length: *mut u32,
    pub provisioned_time: *mut u8,
    pub provisioned_time_length: *mut u32,
    pub provisioning_machine: *mut u8,
    pub provisioning_machine_length: *mut u32,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GetUpdateInfoArgs {
    pub status: *mut u32,
    pub uuid: *mut u8,
    pub uuid_length: *mut u16,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GetApplicationInfoArgs {
    pub num_apps: *mut u32,
    pub app_info_records: *mut AppInfoRecord,
    pub app_info_records_length: *mut u32,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GetUpdateSlotInfoArgs {
    pub update_slot_id: *mut u32,
    pub start_address: *mut u32,
    pub slot_size: *mut u32,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct UpdateSlotBeginWriteArgs {
    pub write_size: *mut u32,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct UpdateSlotWriteArgs {
    pub buffer: *const u8,
    pub bytes: u32,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct SetActiveUpdateSlotArgs {
    pub slot_id: MemorySlotId,
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GetSbmPerformanceArgs {
    pub boot_time: *mut u32,
    pub sbm_size: *mut u32,
    pub pd_size: *mut u32,
    pub watchdog_period: *mut u32,
    pub watchdog_max_period: *mut u32,
    pub watchdog_max_activity_start: *mut u32,
    pub watchdog_max_activity_end: *mut u32,
    pub sbm_stack_size: *mut u32,
    pub sbm_stack_used: *mut u32,
}
