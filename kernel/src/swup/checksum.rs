// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Single-pass checksum and hash over a slot-resident byte range.
//!
//! Validation needs both figures over the same spans; computing them in
//! one streaming pass keeps the flash traffic down and the buffer small.

use crate::crypto::checksum::checksum;
use crate::error::MemError;
use crate::mem::{MemoryMap, MemorySlot};
use sbmdefs::Hash;
use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64;

/// Compute the additive checksum and SHA-256 of `bytes` bytes starting at
/// `start` within a slot.
pub fn checksum_and_hash(
    mem: &MemoryMap<'_>,
    slot: &MemorySlot,
    start: usize,
    bytes: usize,
) -> Result<(u16, Hash), MemError> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut hasher = Sha256::new();
    let mut sum = 0u16;

    let mut offset = start;
    let mut remaining = bytes;
    while remaining > 0 {
        let chunk = remaining.min(CHUNK_SIZE);
        mem.read(slot, offset, &mut buffer[..chunk])?;
        hasher.update(&buffer[..chunk]);
        sum = checksum(sum, &buffer[..chunk]);
        offset += chunk;
        remaining -= chunk;
    }

    Ok((sum, hasher.finalize().into()))
}
