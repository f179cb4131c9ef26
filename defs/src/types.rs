// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

/// Size of a raw NIST P-256 public key: X coordinate followed by Y
/// coordinate, no SEC1 tag byte.
pub const ECC_PUBLIC_KEY_SIZE: usize = 64;

/// Size of a raw NIST P-256 private scalar.
pub const ECC_PRIVATE_KEY_SIZE: usize = 32;

/// Size of a raw ECDSA P-256 signature: `r` followed by `s`.
pub const ECDSA_SIGNATURE_SIZE: usize = 64;

/// Size of a SHA-256 digest.
pub const SHA256_SIZE: usize = 32;

/// Size of an AES-128 key.
pub const AES_KEY_SIZE: usize = 16;

/// Size of an AES-GCM initialisation vector as carried in update packages.
pub const AES_GCM_IV_SIZE: usize = 16;

/// Size of an AES-GCM authentication tag.
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Size of a binary UUID.
pub const UUID_SIZE: usize = 16;

pub type Hash = [u8; SHA256_SIZE];
pub type Signature = [u8; ECDSA_SIGNATURE_SIZE];
pub type EccPublicKey = [u8; ECC_PUBLIC_KEY_SIZE];
pub type EccPrivateKey = [u8; ECC_PRIVATE_KEY_SIZE];
pub type AesKey = [u8; AES_KEY_SIZE];
pub type AesGcmIv = [u8; AES_GCM_IV_SIZE];
pub type AesTag = [u8; AES_GCM_TAG_SIZE];
pub type UuidBytes = [u8; UUID_SIZE];

/// Pairs of random words in on-flash structures must match each other and
/// must not look like erased or zeroed flash.
pub fn random_word_invalid(r: u32) -> bool {
    r == 0 || r == u32::MAX
}

/// A binary UUID must not look like erased or zeroed flash either.
pub fn uuid_bytes_valid(uuid: &UuidBytes) -> bool {
    uuid.iter().any(|&b| b != 0x00) && uuid.iter().any(|&b| b != 0xff)
}
