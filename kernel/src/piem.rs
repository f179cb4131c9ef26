// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Installed-image integrity checking.
//!
//! The IAVVCS in the app-status slot carries the installed UUID and a copy
//! of the module footer. Verification recreates the module header exactly
//! as it looked inside the update package (everything after the fixed
//! prefix zeroed), then recomputes the integrity chain over the header,
//! the image body in the exec slot, and the footer's version number, and
//! checks it against the footer's hash and signature.

use crate::hal::Hal;
use crate::oem::OemHooks;
use crate::Sbm;
use sbmdefs::{
    random_word_invalid, uuid_bytes_valid, IavvcsCapFlags, PiemFooter, PiemHeader, SbmExecInfo,
    EXPECTED_IAVVCS_CAPABILITY, PIEM_EXEC_INFO_OFFSET, PIEM_EXPECTED_STATUS, PIEM_FIELD_RESERVED,
    PIEM_FOOTER_HASHED_SIZE, PIEM_FOOTER_SIZE, PIEM_HEADER_PREFIX_SIZE, PIEM_HEADER_SIZE,
};
use sha2::{Digest, Sha256};
use zerocopy::IntoBytes;

const READ_CHUNK: usize = 128;

fn iavvcs_sane(header: &PiemHeader, exec_info: &SbmExecInfo) -> bool {
    if header.module_status.get() != PIEM_EXPECTED_STATUS {
        log::info!("module_status {:#x}", header.module_status.get());
        return false;
    }

    let footer = &exec_info.installed_muf;

    if random_word_invalid(header.header_random.get()) {
        log::info!("bogus header random {:#x}", header.header_random.get());
        return false;
    }
    if header.field_presence & PIEM_FIELD_RESERVED != 0 {
        log::info!("field presence {:#x}", header.field_presence);
        return false;
    }
    if header.num_signatures != 1 {
        log::info!("bogus num signatures {:#x}", header.num_signatures);
        return false;
    }
    if usize::from(header.footer_length.get()) != PIEM_FOOTER_SIZE {
        log::info!("footer length {:#x}", header.footer_length.get());
        return false;
    }
    if header.header_random.get() != footer.footer_random.get() {
        log::info!(
            "footer random {:#x} expected {:#x}",
            footer.footer_random.get(),
            header.header_random.get()
        );
        return false;
    }
    if !uuid_bytes_valid(&exec_info.installed_uuid) {
        log::info!("installed UUID is invalid");
        return false;
    }

    // An old-style module header without the execution info is not
    // bootable. Reserved capability bits must be clear.
    let flags = IavvcsCapFlags::from_bits(exec_info.capability_flags.get());
    if exec_info.capability_indicator.get() != EXPECTED_IAVVCS_CAPABILITY
        || !flags.is_some_and(|f| f.contains(IavvcsCapFlags::MUF_SUPPLIED))
    {
        log::info!(
            "IAVVCS capability indicator/flags: {:#x}/{:#x}",
            exec_info.capability_indicator.get(),
            exec_info.capability_flags.get()
        );
        return false;
    }

    true
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Establish the validity of the module in the exec slot against the
    /// IAVVCS persisted in the app-status slot.
    pub fn executable_slot_module_valid(&mut self) -> bool {
        if self.read_iavvcs().is_err() {
            return false;
        }
        let (header, exec_info) = self.cached_iavvcs();
        if !iavvcs_sane(&header, &exec_info) {
            return false;
        }

        let footer: PiemFooter = exec_info.installed_muf;
        let footer_offset = header.footer_offset.get() as usize;
        let Some(body_length) = footer_offset.checked_sub(PIEM_HEADER_SIZE) else {
            return false;
        };
        if body_length > self.mem.exec_slot.size {
            return false;
        }

        // Recreate the header as it was hashed inside the SWUP: the fixed
        // prefix followed by zeros, before the SBM wrote its own records
        // over the reserved area.
        self.work.plain_eub[..PIEM_HEADER_PREFIX_SIZE].copy_from_slice(header.as_bytes());
        self.work.plain_eub[PIEM_HEADER_PREFIX_SIZE..].fill(0);

        let mem = self.mem;
        let mut hasher = Sha256::new();
        let mut sum = 0u16;
        hasher.update(&self.work.plain_eub[..PIEM_HEADER_SIZE]);
        sum = crate::crypto::checksum::checksum(sum, &self.work.plain_eub[..PIEM_HEADER_SIZE]);

        // The image body, streamed out of the exec slot.
        let mut buffer = [0u8; READ_CHUNK];
        let mut offset = 0usize;
        while offset < body_length {
            let chunk = (body_length - offset).min(READ_CHUNK);
            if mem.read(&mem.exec_slot, offset, &mut buffer[..chunk]).is_err() {
                log::info!("module body unreadable");
                return false;
            }
            hasher.update(&buffer[..chunk]);
            sum = crate::crypto::checksum::checksum(sum, &buffer[..chunk]);
            offset += chunk;
        }

        // The footer up to, but not including, its own hash.
        let footer_bytes = footer.as_bytes();
        hasher.update(&footer_bytes[..PIEM_FOOTER_HASHED_SIZE]);
        sum = crate::crypto::checksum::checksum(sum, &footer_bytes[..PIEM_FOOTER_HASHED_SIZE]);

        if cfg!(feature = "boot-integrity-checksum") {
            if sum != footer.block_cs.get() {
                log::info!(
                    "module footer checksum calculated {sum:#x} expected {:#x}",
                    footer.block_cs.get()
                );
                return false;
            }
            return true;
        }

        let hash: [u8; 32] = hasher.finalize().into();
        if hash != footer.block_hash {
            log::info!("module block hash mismatch");
            return false;
        }

        // Signature check with the power-up validation key.
        let Ok(pu_key) = self.datastore().and_then(|ds| {
            let slot = ds.swup_key_slot(sbmdefs::KEY_PURPOSE_PU_VALIDATION)?;
            let key = ds.public_key(slot)?;
            Ok(key)
        }) else {
            log::info!("module block signature key not found");
            return false;
        };
        if crate::crypto::ecdsa::verify(&pu_key, &hash, &footer.block_sig).is_err() {
            log::info!("module block signature verification failed");
            return false;
        }

        true
    }
}

// The typed views come straight off the cached slot bytes; keep the
// offsets honest.
const _: () = assert!(PIEM_EXEC_INFO_OFFSET == PIEM_HEADER_PREFIX_SIZE);
