// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Secure API numbering and stable return codes.
//!
//! The numeric values here are ABI shared with applications built against
//! earlier SBM releases and must not change.

use core::mem::size_of;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Data slot indices fit in a signed byte; negative values carry the error
/// codes below.
pub type PdSlot = i8;

pub const SECURE_API_RETURN_SUCCESS: i8 = 0;
pub const SECURE_API_ERR_API_FAILURE: i8 = -1;
pub const SECURE_API_ERR_COMMAND_FAILED: i8 = -2;
pub const SECURE_API_ERR_BUFFER_LOCATION_INVALID: i8 = -3;
pub const SECURE_API_ERR_BUFFER_SIZE_INVALID: i8 = -4;
/* -5 was NO_PROVISIONED_DATA and must not be reused. */
pub const SECURE_API_ERR_SLOT_OUT_OF_RANGE: i8 = -6;
pub const SECURE_API_ERR_SLOT_TYPE_MISMATCH: i8 = -7;
pub const SECURE_API_ERR_NO_MATCHING_SLOT_FOUND: i8 = -8;

/// Status yielded by the API routing function itself, before any handler
/// runs. The values must be preserved for backwards compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum DispatchCode {
    Ok = 0,
    MissingFunction = 1,
    UnimplementedFunction = 2,
    InBufMissing = 3,
    OutBufMissing = 4,
    BufOverlap = 5,
    InBufSizeError = 6,
    OutBufSizeError = 7,
    EdpDecryptError = 8,
}

/* Function numbers, indexing the secure API dispatch table. */
pub const API_GET_NUMBER_OF_DEVICE_CERTIFICATES: u32 = 0;
pub const API_GET_SLOT_NUMBER_OF_DEVICE_CERTIFICATE: u32 = 1;
pub const API_GET_X509_CERTIFICATE_FROM_SLOT: u32 = 2;
pub const API_GET_PARENT_OF_CERTIFICATE: u32 = 3;
pub const API_GET_NUMBER_OF_KEYS: u32 = 4;
pub const API_GET_SLOT_NUMBER_OF_KEY: u32 = 5;
pub const API_GET_SLOT_NUMBER_OF_KEY_FOR_CERTIFICATE: u32 = 6;
pub const API_GET_DETAILS_OF_KEY: u32 = 7;
pub const API_SIGN_USING_KEY: u32 = 8;
pub const API_VERIFY_USING_KEY: u32 = 9;
pub const API_GENERATE_SHARED_SECRET: u32 = 10;
pub const API_GET_SBM_INFORMATION: u32 = 11;
pub const API_GET_UPDATE_INFO: u32 = 12;
pub const API_GET_APPLICATION_INFO: u32 = 13;
pub const API_GET_UPDATE_SLOT_INFO: u32 = 14;
pub const API_CHECK_UPDATE_SLOT: u32 = 15;
pub const API_INSTALL_UPDATE: u32 = 16;
pub const API_UPDATE_SLOT_BEGIN_WRITE: u32 = 17;
pub const API_UPDATE_SLOT_WRITE: u32 = 18;
pub const API_UPDATE_SLOT_END_WRITE: u32 = 19;
pub const API_SET_ACTIVE_UPDATE_SLOT: u32 = 20;
pub const API_GET_SBM_PERFORMANCE: u32 = 21;

/* Recommended buffer sizes for the SBM information strings. The SBM
 * reports the required size when a supplied buffer is too small. */
pub const SECURE_API_SBM_VER_STR_SIZE: usize = 15;
pub const SECURE_API_SBM_TIME_STR_SIZE: usize = 21;
pub const SECURE_API_PROV_VER_STR_SIZE: usize = 38;
pub const SECURE_API_PROV_TIME_STR_SIZE: usize = 20;
pub const SECURE_API_PROV_MACH_STR_SIZE: usize = 36;

/// Stable identifier of a memory slot as exposed through the secure API.
pub type MemorySlotId = u32;

/// Marks "no such slot" in slot-info replies.
pub const MEMORY_SLOT_ID_INVALID: MemorySlotId = u32::MAX;

/// Per-application record returned by the application-info service.
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct AppInfoRecord {
    /// Always zero: only the master application exists.
    pub app_type: U32,
    /// Always one: only the installed application is reported.
    pub installed: U32,
    /// First address of the executable image.
    pub start_addr: U32,
    /// Last address of the executable image.
    pub end_addr: U32,
    /// Installed version number.
    pub app_version: U32,
}

pub const APP_INFO_RECORD_SIZE: usize = 20;
const _: () = assert!(size_of::<AppInfoRecord>() == APP_INFO_RECORD_SIZE);
