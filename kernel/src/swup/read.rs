// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Policed reads from a SWUP in an update slot.
//!
//! Every read is bounded by the SWUP's own length once that has been
//! established. On any failure the destination is filled with 0xff, which
//! reads as erased flash and therefore fails the magic and end-marker
//! checks downstream instead of being interpreted as data.

use crate::mem::{MemoryMap, MemorySlot};
use sbmdefs::UuidBytes;

#[derive(Clone, Copy, Debug)]
pub struct SwupReader<'m> {
    mem: &'m MemoryMap<'m>,
    slot: &'m MemorySlot,
    max_offset: usize,
}

impl<'m> SwupReader<'m> {
    /// A reader bounded by the slot size, until the SWUP's length field
    /// has been read and policed.
    pub fn new(mem: &'m MemoryMap<'m>, slot: &'m MemorySlot) -> Self {
        Self {
            mem,
            slot,
            max_offset: slot.size.saturating_sub(1),
        }
    }

    pub fn mem(&self) -> &'m MemoryMap<'m> {
        self.mem
    }

    pub fn slot(&self) -> &'m MemorySlot {
        self.slot
    }

    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// Tighten the read bound once the SWUP length is known.
    pub fn set_max_offset(&mut self, max_offset: usize) {
        self.max_offset = max_offset;
    }

    /// Read bytes, 0xff-filling the destination on any failure.
    pub fn read(&self, offset: usize, dst: &mut [u8]) {
        if offset > self.max_offset || self.mem.read(self.slot, offset, dst).is_err() {
            log::error!(
                "swup read out of range or failed (slot \"{}\", offset {:#x}, bytes {:#x})",
                self.slot.name,
                offset,
                dst.len()
            );
            dst.fill(0xff);
        }
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        let mut bytes = [0u8; 2];
        self.read(offset, &mut bytes);
        u16::from_le_bytes(bytes)
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        self.read(offset, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    pub fn read_uuid(&self, offset: usize) -> UuidBytes {
        let mut bytes = [0u8; 16];
        self.read(offset, &mut bytes);
        bytes
    }
}
