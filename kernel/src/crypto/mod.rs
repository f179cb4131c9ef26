// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Crypto wrappers.
//!
//! The primitives themselves come from the RustCrypto crates; these modules
//! pin the parameterisations used by the update format (AES-128-GCM with
//! 16-byte IVs, SHA-256, ECDSA/ECDH on NIST P-256) and add the chunked
//! decryption state the streaming installer needs.

pub mod aes_gcm;
pub mod checksum;
pub mod ecdsa;
pub mod ecies;
pub mod sha256;
