// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! SWUP installation.
//!
//! Preconditions: all three validation phases passed, and the caller holds
//! the matched key instance and the SWUP's read bound. The EUB payload is
//! stream-decrypted in bounded blocks and programmed page-wise into the
//! exec slot; the IAVVCS is fabricated in RAM and committed last. Once the
//! target slots have been erased, any failure leaves the device bricked:
//! there is no abort path, only a fresh install.

use super::read::SwupReader;
use super::tlv;
use crate::crypto::ecies::{self, ChunkedDecrypt};
use crate::crypto::{ecdsa, sha256::sha256};
use crate::hal::Hal;
use crate::mem::MemorySlot;
use crate::oem::OemHooks;
use crate::Sbm;
use sbmdefs::{
    swup_first_oe, swup_update_status_records, AesGcmHeader, PiemFooter, SeerAesGcm128,
    SwupLayout, ECDSA_SIGNATURE_SIZE, EXPECTED_IAVVCS_CAPABILITY, KEY_CATEGORY_PRIVATE,
    KEY_PURPOSE_OEM_VALIDATION, OE_TAG_AES_GCM_HEADER, PIEM_EXEC_INFO_OFFSET, PIEM_FOOTER_SIZE,
    PIEM_HEADER_PREFIX_SIZE, PIEM_HEADER_SIZE, SBM_EXEC_INFO_SIZE,
    SWUP_OFFSET_EUB_CLEAR_PAYLOAD_LENGTH, SWUP_OFFSET_EUB_CLEAR_PAYLOAD_START,
    SWUP_OFFSET_HEADER_EUB_CLEAR_START, SWUP_OFFSET_HEADER_NUM_EUBS,
    SWUP_OFFSET_HEADER_SWUP_CAPABILITY_FLAGS, SWUP_OFFSET_HEADER_UPDATE_UUID,
};
use uuid::Uuid;
use zerocopy::{FromBytes, IntoBytes};

/// Size of one streaming decrypt block. The first block is exactly the
/// module header.
const MAX_DECRYPT_SIZE: usize = PIEM_HEADER_SIZE;

/// Outcome of an installation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallStatus {
    /// Installed; boot-time verification still to run.
    Success,
    /// Installed and verified against the staged IAVVCS during install.
    SuccessVerified,
    /// Not installed; the exec slot is intact.
    Failure,
    /// Not installed, and the exec slot has been erased.
    Bricked,
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Decrypt, verify and install the SWUP from `update_slot` into the
    /// app-status and exec slots.
    pub fn install_module(
        &mut self,
        update_slot: &MemorySlot,
        max_offset: usize,
        key_instance: u8,
    ) -> InstallStatus {
        let mem = self.mem;
        let mut reader = SwupReader::new(mem, update_slot);
        reader.set_max_offset(max_offset);

        let mut layout_bytes = [0u8; 8];
        reader.read(SWUP_OFFSET_HEADER_EUB_CLEAR_START, &mut layout_bytes);
        let layout = SwupLayout::read_from_bytes(&layout_bytes).unwrap();
        let num_eubs = reader.read_u16(SWUP_OFFSET_HEADER_NUM_EUBS);

        // Pull the key material out of the datastore up front: the OEM
        // validation public key, and the private device-update key of the
        // instance matched during validation.
        let Ok((validation_key, update_private)) = self.datastore().and_then(|ds| {
            let osvks = ds.swup_key_slot(KEY_PURPOSE_OEM_VALIDATION)?;
            let validation_key = ds.public_key(osvks)?;
            let duks = ds.find_update_key_slot(key_instance, KEY_CATEGORY_PRIVATE)?;
            let update_private = ds.private_key(duks)?;
            Ok((validation_key, update_private))
        }) else {
            log::error!("update/validation key lookup failed");
            return InstallStatus::Failure;
        };

        // Locate the AES-GCM header among the SWUP optional elements.
        let swup_caps = reader.read_u32(SWUP_OFFSET_HEADER_SWUP_CAPABILITY_FLAGS);
        let swup_oe = swup_first_oe(swup_update_status_records(swup_caps));
        let Some(oe_size) =
            usize::from(layout.eub_clear_details_start.get()).checked_sub(swup_oe)
        else {
            return InstallStatus::Failure;
        };
        let Some((gcm_offset, _)) =
            tlv::find_node(&reader, swup_oe, oe_size, OE_TAG_AES_GCM_HEADER)
        else {
            log::error!("has no AES-GCM header");
            return InstallStatus::Failure;
        };
        let mut gcm_header_bytes = [0u8; 80];
        reader.read(gcm_offset, &mut gcm_header_bytes);
        let gcm_header = AesGcmHeader::read_from_bytes(&gcm_header_bytes).unwrap();

        // Ciphertext and plaintext of the encrypted details are the same
        // size.
        let Some(eubed_size) = usize::from(layout.epilogue_start.get())
            .checked_sub(usize::from(layout.eub_encrypted_details_start.get()))
        else {
            return InstallStatus::Failure;
        };
        if eubed_size > MAX_DECRYPT_SIZE || eubed_size < ECDSA_SIGNATURE_SIZE {
            log::error!("EUB encrypted details too large: {eubed_size:#x}");
            return InstallStatus::Failure;
        }

        // Unwrap the encrypted-details record with the ECIES-derived key.
        if self.persist.ecies_busy {
            log::error!("chunked crypto state busy");
            return InstallStatus::Failure;
        }
        let seer_buf = &mut self.work.plain_seer[..eubed_size];
        reader.read(
            usize::from(layout.eub_encrypted_details_start.get()),
            seer_buf,
        );
        if ecies::decrypt(
            &update_private,
            &gcm_header.key,
            &[],
            seer_buf,
            &gcm_header.tag,
        )
        .is_err()
        {
            log::error!("EUB encrypted details decrypt failed");
            return InstallStatus::Failure;
        }

        // The plaintext is the encryption record followed by a signature
        // over it.
        let digest = sha256(&seer_buf[..eubed_size - ECDSA_SIGNATURE_SIZE]);
        let mut signature = [0u8; ECDSA_SIGNATURE_SIZE];
        signature.copy_from_slice(&seer_buf[eubed_size - ECDSA_SIGNATURE_SIZE..]);
        if ecdsa::verify(&validation_key, &digest, &signature).is_err() {
            log::error!("EUB encrypted details signature verification failed");
            return InstallStatus::Failure;
        }
        let seer = SeerAesGcm128::read_from_bytes(
            &self.work.plain_seer[..core::mem::size_of::<SeerAesGcm128>()],
        )
        .unwrap();

        // A single EUB is all the layout supports; the loop shape matches
        // the on-flash structure regardless.
        for eub_idx in 0..usize::from(num_eubs) {
            let eub_clear = usize::from(layout.eub_clear_details_start.get());
            let mut payload_start =
                reader.read_u32(eub_clear + SWUP_OFFSET_EUB_CLEAR_PAYLOAD_START) as usize;
            let mut payload_length =
                reader.read_u32(eub_clear + SWUP_OFFSET_EUB_CLEAR_PAYLOAD_LENGTH) as usize;

            // The binary and footer land in the exec slot; the header is
            // re-fabricated into the app-status slot.
            let Some(exec_length) = payload_length.checked_sub(PIEM_HEADER_SIZE) else {
                log::error!("EUB {eub_idx} abnormal payload length {payload_length:#x}");
                return InstallStatus::Failure;
            };
            if exec_length > mem.exec_slot.size || exec_length < PIEM_FOOTER_SIZE {
                log::error!("EUB {eub_idx} abnormal payload length {payload_length:#x}");
                return InstallStatus::Failure;
            }

            // Point of no return: erase the IAVVCS, then the exec slot.
            if let Err(err) = mem.erase(&mem.app_status_slot, 0, PIEM_HEADER_SIZE) {
                log::error!("failed to erase module header slot: {err:?}");
                return InstallStatus::Bricked;
            }
            if let Err(err) = mem.erase(&mem.exec_slot, 0, exec_length) {
                log::error!("failed to erase exec slot: {err:?}");
                return InstallStatus::Bricked;
            }
            self.persist.purge_cached_muh();

            // Stream-decrypt the payload in bounded blocks: block zero is
            // the module header and stays in RAM for the IAVVCS, the rest
            // is programmed to the exec slot as it appears.
            self.persist.ecies_busy = true;
            let mut decrypt = ChunkedDecrypt::begin(&seer.key, &seer.iv);
            self.work.iavvcs.fill(0);

            let mut exec_slot_offset = 0usize;
            let mut block_no = 0u32;
            while payload_length > 0 {
                let block_size = payload_length.min(MAX_DECRYPT_SIZE);
                let cipher = &mut self.work.cipher_text[..block_size];
                reader.read(payload_start, cipher);

                let plain = &mut self.work.plain_eub[..block_size];
                if decrypt.update(cipher, plain).is_err() {
                    self.persist.ecies_busy = false;
                    log::error!("EUB {eub_idx} chunked decrypt failed");
                    return InstallStatus::Bricked;
                }

                if block_no == 0 {
                    // The module header: goes into the IAVVCS staging
                    // buffer, not to flash.
                    self.work.iavvcs[..PIEM_HEADER_PREFIX_SIZE]
                        .copy_from_slice(&plain[..PIEM_HEADER_PREFIX_SIZE]);
                } else if let Err(err) = mem.program(&mem.exec_slot, exec_slot_offset, plain) {
                    self.persist.ecies_busy = false;
                    log::error!("EUB {eub_idx} block {block_no:#x} copy to flash failed: {err:?}");
                    return InstallStatus::Bricked;
                } else {
                    exec_slot_offset += block_size;
                }

                payload_start += block_size;
                payload_length -= block_size;
                block_no += 1;
            }

            // Finish the decryption and police the tag against the
            // encryption record.
            let finish = decrypt.finish(&seer.tag);
            self.persist.ecies_busy = false;
            if finish.is_err() {
                log::error!("EUB {eub_idx} authentication tag mismatch");
                return InstallStatus::Bricked;
            }

            // Finish populating the IAVVCS.
            let update_uuid = reader.read_uuid(SWUP_OFFSET_HEADER_UPDATE_UUID);
            let footer_offset =
                u32::from_le_bytes(self.work.iavvcs[4..8].try_into().unwrap()) as usize;
            let Some(footer_in_exec) = footer_offset.checked_sub(PIEM_HEADER_SIZE) else {
                log::error!("EUB {eub_idx} module footer offset invalid");
                return InstallStatus::Bricked;
            };
            let mut footer_bytes = [0u8; PIEM_FOOTER_SIZE];
            if mem
                .read(&mem.exec_slot, footer_in_exec, &mut footer_bytes)
                .is_err()
            {
                log::error!("EUB {eub_idx} module footer unreadable");
                return InstallStatus::Bricked;
            }
            let installed_muf = PiemFooter::read_from_bytes(&footer_bytes).unwrap();

            {
                let info = &mut self.work.iavvcs
                    [PIEM_EXEC_INFO_OFFSET..PIEM_EXEC_INFO_OFFSET + SBM_EXEC_INFO_SIZE];
                info[..16].copy_from_slice(&update_uuid);
                info[16..18].copy_from_slice(&EXPECTED_IAVVCS_CAPABILITY.to_le_bytes());
                info[18..20].copy_from_slice(&sbmdefs::IavvcsCapFlags::MUF_SUPPLIED.bits().to_le_bytes());
                info[20..20 + PIEM_FOOTER_SIZE].copy_from_slice(installed_muf.as_bytes());
            }

            // Commit the IAVVCS to the app-status slot.
            if mem
                .program(
                    &mem.app_status_slot,
                    0,
                    &self.work.iavvcs[..PIEM_HEADER_PREFIX_SIZE + SBM_EXEC_INFO_SIZE],
                )
                .is_err()
            {
                log::error!("IAVVCS copy to flash failed");
                return InstallStatus::Bricked;
            }
            self.persist.purge_cached_muh();
            self.persist.last_installed_uuid = update_uuid;

            log::info!(
                "installed update {}",
                Uuid::from_bytes(update_uuid)
            );

            // The freshly installed module should agree with the version
            // declared in the EUB details.
            let installed = self.piem_version();
            let declared = self.eub_version(update_slot);
            if installed != declared {
                log::error!(
                    "EUB {eub_idx} version {declared:#x} but installed module version is {installed:#x}"
                );
            }
        }

        // Verification during install only happens for clear payloads on
        // removable media; encrypted installs verify at boot.
        InstallStatus::Success
    }
}
