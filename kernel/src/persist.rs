// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Boot-persistent and ephemeral state.
//!
//! On hardware [`SbmPersistent`] lives in the SBM-reserved persistent RAM
//! block: it survives across secure API calls (but not across resets) and
//! is inaccessible to the application. [`EphemeralBuffers`] holds the
//! boot-time working memory, zero-wiped immediately before the application
//! is launched.

use crate::swup::SwupStatus;
use sbmdefs::{MemorySlotId, UuidBytes, PIEM_HEADER_SIZE};

/// Largest provisioned data block the SBM supports.
pub const PDB_MAX_SIZE: usize = 4096;

/// Largest secure-API input structure; the gate stages caller input here
/// before dereferencing anything inside it.
pub const API_INPUT_MAX_SIZE: usize = 128;

/// Caller input staging area, aligned for any input structure.
#[derive(Debug)]
#[repr(align(8))]
pub struct ApiInputBuffer(pub [u8; API_INPUT_MAX_SIZE]);

/// The single owner of all state that must survive between secure API
/// calls.
#[derive(Debug)]
pub struct SbmPersistent {
    /// Status of the most recent update examination or install.
    pub last_status: SwupStatus,
    /// UUID of the most recently installed update.
    pub last_installed_uuid: UuidBytes,
    /// Update slot targeted by the slot-write API; `None` until first use.
    pub active_update_slot: Option<MemorySlotId>,
    /// Write cursor within the active update slot.
    pub update_write_index: u32,
    /// Minimum write unit captured at `updateSlotBeginWrite`; zero when no
    /// write sequence is open.
    pub update_write_size: u32,
    /// The chunked crypto state is a singleton; nested use is a bug.
    pub ecies_busy: bool,
    /// Cached copy of the installed-module header slot.
    pub cached_muh: [u8; PIEM_HEADER_SIZE],
    /// Whether `cached_muh` reflects the app-status slot contents.
    pub muh_cached: bool,
    /// Plaintext copy of an encrypted PDB, materialised on demand and
    /// wiped before control leaves the SBM.
    pub plaintext_pdb: [u8; PDB_MAX_SIZE],
    /// Secure API input staging.
    pub api_input: ApiInputBuffer,
    /// Boot time in microseconds, captured when the boot timer stops.
    pub boot_time_us: u32,
}

impl SbmPersistent {
    pub const fn new() -> Self {
        Self {
            last_status: SwupStatus::Initial,
            last_installed_uuid: [0; 16],
            active_update_slot: None,
            update_write_index: 0,
            update_write_size: 0,
            ecies_busy: false,
            cached_muh: [0xff; PIEM_HEADER_SIZE],
            muh_cached: false,
            plaintext_pdb: [0; PDB_MAX_SIZE],
            api_input: ApiInputBuffer([0; API_INPUT_MAX_SIZE]),
            boot_time_us: 0,
        }
    }

    /// Drop the cached module header so the next access rereads flash.
    pub fn purge_cached_muh(&mut self) {
        self.cached_muh.fill(0xff);
        self.muh_cached = false;
    }

    /// Wipe the plaintext PDB copy.
    pub fn clear_plaintext_pdb(&mut self) {
        for byte in self.plaintext_pdb.iter_mut() {
            // SAFETY: writing through a valid reference.
            unsafe { core::ptr::write_volatile(byte, 0) };
        }
    }
}

impl Default for SbmPersistent {
    fn default() -> Self {
        Self::new()
    }
}

/// Boot-time working buffers. Never referenced after launch and effaced
/// beforehand.
#[derive(Debug)]
pub struct EphemeralBuffers {
    /// Plaintext staging for one decrypted payload block.
    pub plain_eub: [u8; PIEM_HEADER_SIZE],
    /// Ciphertext staging for one payload block.
    pub cipher_text: [u8; PIEM_HEADER_SIZE],
    /// Plaintext staging for the EUB encrypted-details record.
    pub plain_seer: [u8; PIEM_HEADER_SIZE],
    /// The IAVVCS being fabricated during an install.
    pub iavvcs: [u8; PIEM_HEADER_SIZE],
}

impl EphemeralBuffers {
    pub const fn new() -> Self {
        Self {
            plain_eub: [0; PIEM_HEADER_SIZE],
            cipher_text: [0; PIEM_HEADER_SIZE],
            plain_seer: [0; PIEM_HEADER_SIZE],
            iavvcs: [0; PIEM_HEADER_SIZE],
        }
    }

    /// Zero-fill everything before handing control to the application.
    pub fn wipe(&mut self) {
        let buffers = [
            &mut self.plain_eub,
            &mut self.cipher_text,
            &mut self.plain_seer,
            &mut self.iavvcs,
        ];
        for buffer in buffers {
            for byte in buffer.iter_mut() {
                // SAFETY: writing through a valid reference.
                unsafe { core::ptr::write_volatile(byte, 0) };
            }
        }
    }
}

impl Default for EphemeralBuffers {
    fn default() -> Self {
        Self::new()
    }
}
