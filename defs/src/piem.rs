// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Permanently installed executable module layout.
//!
//! The module as carried in an EUB is `{header, image[], footer}`. On
//! installation the 1 KiB header is re-fabricated as an IAVVCS (the header
//! plus SBM-written execution info) and programmed into the app-status slot,
//! while the image body and footer land in the exec slot.

use crate::types::{Hash, Signature, UuidBytes};
use bitflags::bitflags;
use core::mem::size_of;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Expected value of [`PiemHeader::module_status`].
pub const PIEM_EXPECTED_STATUS: u32 = 0x5555_aaaa;

/// Size of the padded module header at the front of an EUB payload. This is
/// also the granularity of the installer's streaming decrypt.
pub const PIEM_HEADER_SIZE: usize = 1024;

/// Expected value of [`SbmExecInfo::capability_indicator`].
pub const EXPECTED_IAVVCS_CAPABILITY: u16 = 0x55aa;

bitflags! {
    /// What the SBM recorded alongside the module header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IavvcsCapFlags: u16 {
        /// A copy of the module footer follows the installed UUID.
        const MUF_SUPPLIED = 1;
    }
}

/* Module header field-presence bits; reserved ones must be clear. */
pub const PIEM_FIELD_HASH: u8 = 1;
pub const PIEM_FIELD_SIGNATURE: u8 = 2;
pub const PIEM_FIELD_CHECKSUM: u8 = 4;
pub const PIEM_FIELD_RESERVED: u8 = 0xf8;

/// Fixed prefix of the 1 KiB module header. Everything between this prefix
/// and [`PIEM_HEADER_SIZE`] is zero in a freshly built module; the SBM
/// writes an [`SbmExecInfo`] there when fabricating the IAVVCS.
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PiemHeader {
    /// Fixed magic, expected to be [`PIEM_EXPECTED_STATUS`].
    pub module_status: U32,
    /// Offset from the start of the header to the module footer.
    pub footer_offset: U32,
    /// Must match [`PiemFooter::footer_random`].
    pub header_random: U32,
    /// Zero at layout v1.0.
    pub field_presence: u8,
    /// Number of power-on signatures carried in the footer.
    pub num_signatures: u8,
    /// Size of the footer in bytes.
    pub footer_length: U16,
}

pub const PIEM_HEADER_PREFIX_SIZE: usize = 16;
const _: () = assert!(size_of::<PiemHeader>() == PIEM_HEADER_PREFIX_SIZE);

/// Offset of the SBM execution info within the 1 KiB header.
pub const PIEM_EXEC_INFO_OFFSET: usize = PIEM_HEADER_PREFIX_SIZE;

/// Module footer. The module hash, signature and checksum cover the header
/// and image up to and including `version_number`.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PiemFooter {
    /// Version number used to police rollback.
    pub version_number: U32,
    /// Hash from the start of the header to the end of `version_number`.
    pub block_hash: Hash,
    /// Signature over `block_hash` using the power-up validation key.
    pub block_sig: Signature,
    /// Checksum over the same span as `block_hash`.
    pub block_cs: U16,
    pub pad: U16,
    /// Must match [`PiemHeader::header_random`].
    pub footer_random: U32,
}

pub const PIEM_FOOTER_SIZE: usize = 108;
const _: () = assert!(size_of::<PiemFooter>() == PIEM_FOOTER_SIZE);

/// Bytes of a [`PiemFooter`] covered by the module hash: just the version
/// number, everything after it is the integrity chain itself.
pub const PIEM_FOOTER_HASHED_SIZE: usize = 4;

/// Execution info fabricated by the SBM when installing an update, written
/// into the reserved area of the IAVVCS header.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SbmExecInfo {
    /// UUID of the update installed in the exec slot.
    pub installed_uuid: UuidBytes,
    /// Expected to be [`EXPECTED_IAVVCS_CAPABILITY`].
    pub capability_indicator: U16,
    /// [`IavvcsCapFlags`] bits; reserved bits must be clear.
    pub capability_flags: U16,
    /// Copy of the installed module's footer.
    pub installed_muf: PiemFooter,
}

pub const SBM_EXEC_INFO_SIZE: usize = 128;
const _: () = assert!(size_of::<SbmExecInfo>() == SBM_EXEC_INFO_SIZE);
const _: () = assert!(PIEM_EXEC_INFO_OFFSET + SBM_EXEC_INFO_SIZE <= PIEM_HEADER_SIZE);
