// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! SWUP on-flash layout.
//!
//! All multi-byte fields are little-endian and all named offsets are 32-bit
//! aligned. The header is a byte-oriented structure with fixed field offsets;
//! the few records that are read as a unit are defined as unaligned
//! `zerocopy` structs.

use crate::types::{
    AES_GCM_IV_SIZE, AES_GCM_TAG_SIZE, AES_KEY_SIZE, ECC_PUBLIC_KEY_SIZE, ECDSA_SIGNATURE_SIZE,
    SHA256_SIZE,
};
use core::mem::size_of;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// `b"SWUP"` read as a little-endian word. Shared with the package build
/// tooling.
pub const SWUP_HEADER_MAGIC: u32 = 0x5055_5753;

/// The only header layout revision this SBM understands.
pub const SUPPORTED_LAYOUT_VERSION: u32 = 0x0000_0125;

/// Number of update blocks a single SWUP may carry.
pub const SUPPORTED_EUBS: u16 = 1;

/// Deprecated flash-counter records are not supported.
pub const SUPPORTED_FLASH_COUNTERS: u32 = 0;

/// Expected field count encoded in the top byte of EUB version numbers.
pub const SUPPORTED_VERSION_SIZE: u32 = 1;

/// Hardware SKU accepted by this SBM build.
pub const SUPPORTED_HW_SKU: u32 = 0x0000_0001;

/* Header preamble. */
pub const SWUP_OFFSET_HEADER_PREAMBLE_MAGIC: usize = 0x00; /* 4 bytes */
pub const SWUP_OFFSET_HEADER_LAYOUT_VERSION: usize = 0x04; /* 4 bytes */
pub const SWUP_OFFSET_HEADER_SWUP_CAPABILITY_FLAGS: usize = 0x08; /* 4 bytes */
pub const SWUP_OFFSET_HEADER_EUB_CAPABILITY_FLAGS: usize = 0x0c; /* 4 bytes */
pub const SWUP_OFFSET_HEADER_LENGTH_OF_SWUP: usize = 0x10; /* 4 bytes */
pub const SWUP_OFFSET_HEADER_NUM_EUBS: usize = 0x14; /* 2 bytes */
/* 2 bytes padding, 4 bytes max_bs (unused) */

/* Header layout block. */
pub const SWUP_OFFSET_HEADER_FOOTER_LENGTH: usize = 0x1c; /* 2 bytes */
/* 2 bytes padding */
pub const SWUP_OFFSET_HEADER_EUB_CLEAR_START: usize = 0x20; /* 2 bytes */
pub const SWUP_OFFSET_HEADER_EUB_ENCRYPTED_START: usize = 0x22; /* 2 bytes */
pub const SWUP_OFFSET_HEADER_EPILOGUE_START: usize = 0x24; /* 2 bytes */
pub const SWUP_OFFSET_HEADER_FIRST_EUB_START: usize = 0x26; /* 2 bytes */

/* Header identity. */
pub const SWUP_OFFSET_HEADER_RANDOM: usize = 0x28; /* 4 bytes */
pub const SWUP_OFFSET_HEADER_UPDATE_KEY: usize = 0x2c; /* 64 bytes */
pub const SWUP_OFFSET_HEADER_SECURITY_WORLD_UUID: usize = 0x6c; /* 16 bytes */
pub const SWUP_OFFSET_HEADER_SECURITY_WORLD_ITERATION: usize = 0x7c; /* 2 bytes */
pub const SWUP_OFFSET_HEADER_UPDATE_UUID: usize = 0x7e; /* 16 bytes */
/* 20 bytes timestamp, 16 bytes source device UUID (unused) */

/// Offset of the optional element list, before any alignment padding.
pub const SWUP_OFFSET_HEADER_OPTIONAL_ELEMENTS: usize = 0xb4;

/// Offset of the first header optional element. With no flash-counter
/// records the list needs only 32-bit alignment, which 0xb4 already has.
pub fn swup_first_oe(update_records: u32) -> usize {
    debug_assert_eq!(update_records, SUPPORTED_FLASH_COUNTERS);
    (SWUP_OFFSET_HEADER_OPTIONAL_ELEMENTS + 3) & !3
}

/* Header epilogue, relative to `epilogue_start`. */
pub const SWUP_OFFSET_HEADER_EPILOGUE_HASH: usize = 0x00; /* 32 bytes */
pub const SWUP_OFFSET_HEADER_EPILOGUE_SIGNATURE: usize = 0x20; /* 64 bytes */
pub const SWUP_OFFSET_HEADER_EPILOGUE_CHECKSUM: usize = 0x60; /* 2 bytes */
/* 2 bytes of padding */
pub const SWUP_EPILOGUE_SIZE: usize = 0x64;

/* Footer, relative to `total_length - SWUP_FOOTER_SIZE`. */
pub const SWUP_OFFSET_FOOTER_HASH: usize = 0x00; /* 32 bytes */
pub const SWUP_OFFSET_FOOTER_SIGNATURE: usize = 0x20; /* 64 bytes */
pub const SWUP_OFFSET_FOOTER_CHECKSUM: usize = 0x60; /* 2 bytes */
/* 2 bytes of padding */
pub const SWUP_OFFSET_FOOTER_RANDOM: usize = 0x64; /* 4 bytes */
pub const SWUP_FOOTER_SIZE: usize = 0x68;

/* EUB clear-details record, relative to its start. */
pub const SWUP_OFFSET_EUB_CLEAR_CONTENT: usize = 0x00; /* 2 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_PARAMETERS: usize = 0x02; /* 2 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_CAPABILITY_FLAGS: usize = 0x04; /* 4 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_PAYLOAD_START: usize = 0x08; /* 4 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_PAYLOAD_LENGTH: usize = 0x0c; /* 4 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_HW_SKU: usize = 0x10; /* 4 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_CHECKSUM: usize = 0x14; /* 2 bytes */
/* 2 bytes of padding */
pub const SWUP_OFFSET_EUB_CLEAR_HASH: usize = 0x18; /* 32 bytes */
pub const SWUP_OFFSET_EUB_CLEAR_OPTIONAL_ELEMENTS: usize = 0x38;
pub const SWUP_EUB_CLEAR_SIZE: usize = 0x38;

/// EUB content type: software update.
pub const EUB_CONTENT_SW_UPDATE: u16 = 0;

/// EUB parameter: update targets the master module.
pub const EUB_PARAM_MASTER_MODULE: u16 = 1;

/* SWUP capability word. */
pub const SWUP_CAP_ENC_MODE_MASK: u32 = 0xf; /* Bits 0-3: encryption mode. */
pub const SWUP_CAP_ENC_MODE_NONE: u32 = 0;
pub const SWUP_CAP_ENC_MODE_ECIES_AES_GCM: u32 = 1;
pub const SWUP_CAP_CIPHER_LAYOUT_MASK: u32 = 0xe0; /* Bits 5-7: cipher fields layout. */
pub const SWUP_CAP_HEAD_FOOT_CIPHER: u32 = 0x20;
pub const SWUP_CAP_OVERALL_CIPHER: u32 = 0x40;
pub const SWUP_CAP_ALT_CIPHER: u32 = 0x80;
pub const SWUP_CAP_CIPHER_SUITE_MASK: u32 = 0xfff00; /* Bits 8-19: cipher suite. */
pub const SWUP_CAP_SHA_256: u32 = 0x100;
pub const SWUP_CAP_SHA_256_ECDSA_P_256: u32 = 0x200;
pub const SWUP_CAP_OPTIONAL_CIPHER_FIELDS: u32 = 0x80000;
pub const SWUP_CAP_FLASH_COUNTERS_MASK: u32 = 0xf00_0000; /* Bits 24-27. */
pub const SWUP_CAP_FLASH_COUNTERS_SHIFT: u32 = 24;
pub const SWUP_CAP_VERSION_SIZE_MASK: u32 = 0xf000_0000; /* Bits 28-31. */
pub const SWUP_CAP_VERSION_SIZE_SHIFT: u32 = 28;
pub const SWUP_CAP_RESERVED: u32 = 0xff_fc10; /* Bits 4, 10-23. */

/// Number of deprecated update-status records encoded in a SWUP capability
/// word.
pub fn swup_update_status_records(cap: u32) -> u32 {
    (cap & SWUP_CAP_FLASH_COUNTERS_MASK) >> SWUP_CAP_FLASH_COUNTERS_SHIFT
}

/* Capability word common to the SWUP EUB summary and each EUB. */
pub const COMMON_CAP_ENC_MODE_MASK: u32 = 0xff; /* Bits 0-7: encryption mode. */
pub const COMMON_CAP_ENC_MODE_NONE: u32 = 0;
pub const COMMON_CAP_ENC_MODE_AES_GCM_128: u32 = 1;
pub const COMMON_CAP_ADV_ENC_OPTIONS_MASK: u32 = 0xf00; /* Bits 8-11: reserved. */
pub const COMMON_CAP_CIPHER_LAYOUT_MASK: u32 = 0x7000; /* Bits 12-14. */
pub const COMMON_CAP_FIXED_CIPHER_FIELDS: u32 = 0x1000;
pub const COMMON_CAP_OPTIONAL_CIPHER_FIELDS: u32 = 0x2000;
pub const COMMON_CAP_ALT_CIPHER_FIELDS: u32 = 0x4000;
pub const COMMON_CAP_PU_MASK: u32 = 0xf0_0000; /* Pre-launch checking flags. */
pub const COMMON_CAP_SINGLE_PU_SIG: u32 = 0x10_0000;
pub const COMMON_CAP_MULTIPLE_PU_SIG: u32 = 0x20_0000;
pub const COMMON_CAP_SINGLE_PU_HASH: u32 = 0x40_0000;
pub const COMMON_CAP_MULTIPLE_PU_HASH: u32 = 0x80_0000;
pub const COMMON_CAP_RESERVED: u32 = 0xff0f_8ffe;

/* Optional element tags. */
/// Node carries an ECC P-256 public key and AES-GCM tag.
pub const OE_TAG_AES_GCM_HEADER: u16 = 0x0001;
/// Node carries an EUB version number.
pub const OE_TAG_VERSION_NUMBER: u16 = 0x8001;

/// Terminates every TLV list.
pub const TLV_END_MARKER: u16 = 0xffff;

/// Offsets to the variably-placed header objects, read as a unit from the
/// SWUP header. Field order matches the on-flash layout block.
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SwupLayout {
    /// Offset to EUB clear details.
    pub eub_clear_details_start: U16,
    /// Offset to EUB encrypted details, or zero if the package is clear.
    pub eub_encrypted_details_start: U16,
    /// Offset to the SWUP epilogue object.
    pub epilogue_start: U16,
    /// Offset of the first EUB payload.
    pub first_eub_start: U16,
}

const _: () = assert!(size_of::<SwupLayout>() == 8);

/// AES-GCM encryption header carried as a header optional element. Used to
/// unwrap the EUB encrypted-details record.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct AesGcmHeader {
    /// Ephemeral ECIES public key.
    pub key: [u8; ECC_PUBLIC_KEY_SIZE],
    /// Tag over the encrypted-details ciphertext.
    pub tag: [u8; AES_GCM_TAG_SIZE],
}

const _: () = assert!(size_of::<AesGcmHeader>() == 80);

/// Decrypted AES-GCM-128 encryption record: the key material protecting one
/// EUB payload.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SeerAesGcm128 {
    pub key: [u8; AES_KEY_SIZE],
    pub iv: [u8; AES_GCM_IV_SIZE],
    pub tag: [u8; AES_GCM_TAG_SIZE],
}

const _: () = assert!(size_of::<SeerAesGcm128>() == 48);

/// Plaintext size of the EUB encrypted-details record: one encryption record
/// per EUB followed by a signature over the records.
pub const EUB_ENCRYPTED_DETAILS_SIZE: usize =
    size_of::<SeerAesGcm128>() + ECDSA_SIGNATURE_SIZE;

/* hash + signature + checksum + pad, then a random word in the footer */
const _: () = assert!(SWUP_EPILOGUE_SIZE == SHA256_SIZE + ECDSA_SIGNATURE_SIZE + 4);
const _: () = assert!(SWUP_FOOTER_SIZE == SWUP_EPILOGUE_SIZE + 4);
