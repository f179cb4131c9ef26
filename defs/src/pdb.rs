// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Provisioned Data Block record layouts.
//!
//! The PDB is written once by the provisioning tool and read-only at
//! runtime: a summary record, a table of 16-byte slot headers, the slot
//! payloads, and (when the block is encrypted) a security footer.

use crate::types::UuidBytes;
use bitflags::bitflags;
use core::mem::size_of;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Expected value of [`Psr::presence`]: the flash erase pattern XOR 0x8888.
pub const PSR_PRESENT: u16 = 0xffff ^ 0x8888;

pub const PPD_SEED_SIZE: usize = 16;
pub const PPD_HASH_SIZE: usize = 32;

/// Bytes of build-time security-context randomness folded into the
/// provisioned-data hash.
pub const PPD_CONTEXT_RANDOM_SIZE: usize = 4;

bitflags! {
    /// Provisioned-data capability word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PdbCapability: u32 {
        /// The PDB body is stored encrypted and must be materialised into
        /// RAM before use.
        const ENCRYPTED = 1;
    }
}

/// Provisioned Summary Record: the fixed header at the front of the PDB.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Psr {
    /// Set to [`PSR_PRESENT`] by the provisioning tool.
    pub presence: U16,
    pub reserved_0: U16,
    pub pd_pc_seed: [u8; PPD_SEED_SIZE],
    pub pd_pc_hash: [u8; PPD_HASH_SIZE],
    /// [`PdbCapability`] bits.
    pub capability: U32,
    /// Overall length of the PDB.
    pub length: U32,
    /// Number of provisioned data slots.
    pub data_slots: U16,
    pub reserved_1: U16,
    /// Offset (from the PSR) to the slot header table.
    pub pdsh_offset: U32,
    /// Offset (from the PSR) to the security footer.
    pub pdsf_offset: U16,
    /// Offset (from the PSR) to the key reference data.
    pub krd_offset: U16,
    pub reserved: [u8; 8],
}

pub const PSR_SIZE: usize = 80;
const _: () = assert!(size_of::<Psr>() == PSR_SIZE);

/// Offset of [`Psr::capability`]; the provisioned-data hash covers the PSR
/// from this field onwards.
pub const PSR_CAPABILITY_OFFSET: usize = 52;

/// Slot header table entries never index more than an `i8` of slots.
pub const PDB_MAX_SLOTS: u16 = i8::MAX as u16;

/// Common prefix of every 16-byte slot header.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SlotHeader {
    /// Purpose in the top nibble, subtype in the bottom twelve bits.
    pub sh_type: U16,
    /// Index of the memory device carrying the payload.
    pub device: u8,
    pub reserved_0: u8,
    /// Offset (from the PSR) to the slot payload.
    pub slot_offset: U32,
    /// Size of the slot payload.
    pub slot_size: U16,
    /// Interpretation depends on the slot purpose; see the typed overlays.
    pub variant: [u8; 6],
}

pub const SLOT_HEADER_SIZE: usize = 16;
const _: () = assert!(size_of::<SlotHeader>() == SLOT_HEADER_SIZE);

/// Variant fields of a certificate or key slot header.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SlotUsage {
    /// Usage class; zero acts as a wildcard when searching.
    pub usage: U16,
    pub reserved: [u8; 4],
}

/// Variant fields of a certificate slot header.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SlotCert {
    pub cert_usage: U16,
    /// Slot number of the parent certificate.
    pub parent_id: U16,
    pub reserved: u8,
    /// Slot holding the key associated with this certificate.
    pub key_slot: u8,
}

/// Variant fields of an update-key slot header. Purpose and set overlay the
/// 16-bit usage field.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SlotUpdateKey {
    pub purpose: u8,
    pub set: u8,
    pub reserved: [u8; 4],
}

const _: () = assert!(size_of::<SlotUsage>() == 6);
const _: () = assert!(size_of::<SlotCert>() == 6);
const _: () = assert!(size_of::<SlotUpdateKey>() == 6);

/* Slot purpose: top four bits of sh_type. */
pub const SLOT_PURPOSE_MASK: u16 = 0xf000;
pub const SLOT_PURPOSE_IDENTITY_CERT: u16 = 0x1000;
pub const SLOT_PURPOSE_IDENTITY_KEY: u16 = 0x2000;
pub const SLOT_PURPOSE_TRUST_ANCHOR_KEY: u16 = 0x3000;
pub const SLOT_PURPOSE_UPDATE_KEY: u16 = 0x8000;
pub const SLOT_PURPOSE_PROVISION_INFO: u16 = 0xf000;

pub fn slot_purpose(sh_type: u16) -> u16 {
    sh_type & SLOT_PURPOSE_MASK
}

/* Slot subtype: bottom twelve bits of sh_type. */
pub const SLOT_SUBTYPE_MASK: u16 = 0xfff;

pub fn slot_subtype(sh_type: u16) -> u16 {
    sh_type & SLOT_SUBTYPE_MASK
}

/* Certificate level: bottom two bits of the subtype. */
pub const CERT_LEVEL_MASK: u16 = 3;
pub const CERT_LEVEL_ANY: u16 = 0;
pub const CERT_LEVEL_DEVICE: u16 = 1;
pub const CERT_LEVEL_INTERMEDIATE: u16 = 2;
pub const CERT_LEVEL_ROOT: u16 = 3;

/* Key category: bits 10-11 of the subtype. */
pub const KEY_CATEGORY_MASK: u16 = 0xc00;
pub const KEY_CATEGORY_ANY: u16 = 0;
pub const KEY_CATEGORY_PUBLIC: u16 = 0x400;
pub const KEY_CATEGORY_PRIVATE: u16 = 0x800;
pub const KEY_CATEGORY_PAIR: u16 = KEY_CATEGORY_PUBLIC | KEY_CATEGORY_PRIVATE;

pub fn key_category(sh_type: u16) -> u16 {
    sh_type & KEY_CATEGORY_MASK
}

/* Key algorithm: bits 5-9 of the subtype. */
pub const KEY_ALGORITHM_MASK: u16 = 0x3e0;
pub const ECC_KEY_NIST_P256: u16 = 0x60;

pub fn key_algorithm(sh_type: u16) -> u16 {
    sh_type & KEY_ALGORITHM_MASK
}

/* Key curve: bottom five bits of the subtype. */
pub const KEY_CURVE_MASK: u16 = 0x1f;
pub const ECC_KEY_CURVE_PURE_256_V1: u16 = 1;

pub fn key_curve(sh_type: u16) -> u16 {
    sh_type & KEY_CURVE_MASK
}

/* Update key purposes. */
pub const KEY_PURPOSE_DEVICE_UPDATE: u8 = 0;
pub const KEY_PURPOSE_OEM_VALIDATION: u8 = 1;
pub const KEY_PURPOSE_OEM_TRANSPORTATION: u8 = 2;
pub const KEY_PURPOSE_PU_VALIDATION: u8 = 0xf;

/* Provisioning-info slot subtypes. */
pub const PROVISIONING_SUMMARY: u16 = 0;
pub const PROVISIONING_DETAILS: u16 = 1;

/* TLV node tags within certificate/key slot payloads. */
pub const TLV_X509_CERTIFICATE: u16 = 0x0001;
pub const TLV_IMMEDIATE_PUBLIC_KEY: u16 = 0x0010;
pub const TLV_IMMEDIATE_PRIVATE_KEY: u16 = 0x0011;

/// Provisioning summary payload: the binary security world identity.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ProvisioningSummary {
    /// Binary security context UUID.
    pub context_uuid: UuidBytes,
    /// Security context freeze number.
    pub iteration: U16,
    pub padding: U16,
}

pub const PROVISIONING_SUMMARY_SIZE: usize = 20;
const _: () = assert!(size_of::<ProvisioningSummary>() == PROVISIONING_SUMMARY_SIZE);

/// Provisioning details payload: textual provenance strings.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ProvisioningDetails {
    /// Textual security context UUID / freeze number.
    pub context_uuid_iteration: [u8; 40],
    /// Textual provisioning time, `YYYY/MM/DD HH:MM:SS`.
    pub date_time: [u8; 20],
    /// Textual UUID or MAC address of the provisioning machine.
    pub machine_uuid: [u8; 36],
}

pub const PROVISIONING_DETAILS_SIZE: usize = 96;
const _: () = assert!(size_of::<ProvisioningDetails>() == PROVISIONING_DETAILS_SIZE);

/// Provisioned Data Security Footer: describes the encrypted span of the
/// PDB. Followed on flash by the MAC, the IV and the key reference data.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SecurityFooter {
    pub encryption_key_algo: U32,
    pub authentication_key_algo: U32,
    /// First encrypted byte, relative to the PSR.
    pub encrypted_start_offset: U16,
    /// Last encrypted byte, relative to the PSR.
    pub encrypted_end_offset: U16,
    pub mac_length: U16,
    pub iv_length: U16,
}

pub const SECURITY_FOOTER_SIZE: usize = 16;
const _: () = assert!(size_of::<SecurityFooter>() == SECURITY_FOOTER_SIZE);
