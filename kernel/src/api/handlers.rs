// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Secure API service implementations.
//!
//! Every handler revalidates each pointer carried inside its input
//! structure against the application's permitted regions, in the
//! appropriate direction, before touching it. The result code written
//! through the gate-validated output buffer uses the stable taxonomy in
//! `sbmdefs`.

use super::appmem::{app_copy_in, app_copy_out, app_read, app_write};
use super::args::*;
use super::write_result;
use crate::hal::Hal;
use crate::mem::{MemorySlot, SlotKind};
use crate::oem::OemHooks;
use crate::Sbm;
use sbmdefs::{
    key_algorithm, key_category, key_curve, slot_purpose, AppInfoRecord, DispatchCode,
    CERT_LEVEL_DEVICE, CERT_LEVEL_MASK, ECC_PRIVATE_KEY_SIZE, ECC_PUBLIC_KEY_SIZE,
    ECDSA_SIGNATURE_SIZE, KEY_ALGORITHM_MASK, KEY_CATEGORY_MASK, KEY_CURVE_MASK,
    MEMORY_SLOT_ID_INVALID, SECURE_API_ERR_BUFFER_LOCATION_INVALID,
    SECURE_API_ERR_BUFFER_SIZE_INVALID, SECURE_API_ERR_COMMAND_FAILED,
    SECURE_API_ERR_SLOT_TYPE_MISMATCH, SECURE_API_RETURN_SUCCESS, SLOT_PURPOSE_IDENTITY_CERT,
    SLOT_PURPOSE_IDENTITY_KEY, SLOT_PURPOSE_MASK, SLOT_PURPOSE_TRUST_ANCHOR_KEY,
    SLOT_PURPOSE_UPDATE_KEY, UUID_SIZE,
};
use zerocopy::IntoBytes;

/// Version string reported through `getSBMInformation`.
const SBM_VERSION: &str = concat!("SBM ", env!("CARGO_PKG_VERSION"));

/// `strnlen(field, len - 1) + 1`: how many bytes of a fixed textual field
/// to hand to the application.
fn str_field_len(field: &[u8]) -> usize {
    field[..field.len() - 1]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(field.len() - 1)
        + 1
}

impl<'a, H: Hal, O: OemHooks> Sbm<'a, H, O> {
    fn default_init_active_update_slot(&mut self) {
        // The persistent block is zero-initialised, so the default cannot
        // be applied at the definition.
        if self.persist.active_update_slot.is_none() {
            if let Some(first) = self.mem.update_slots.first() {
                self.persist.active_update_slot = Some(first.id);
            }
        }
    }

    fn active_update_slot(&self) -> Option<&'a MemorySlot> {
        self.mem.update_slot_by_id(self.persist.active_update_slot?)
    }

    pub(super) fn api_get_number_of_device_certificates(&mut self, out: *mut u8) -> DispatchCode {
        let usage: u16 = self.input();
        let result = match self.datastore() {
            Ok(ds) => ds.count(
                SLOT_PURPOSE_IDENTITY_CERT | CERT_LEVEL_DEVICE,
                usage,
                SLOT_PURPOSE_MASK | CERT_LEVEL_MASK,
            ),
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_slot_number_of_device_certificate(&mut self, out: *mut u8) -> DispatchCode {
        let args: SlotNumberOfDeviceCertificateArgs = self.input();
        let result = match self.datastore() {
            Ok(ds) => ds
                .find(
                    SLOT_PURPOSE_IDENTITY_CERT | CERT_LEVEL_DEVICE,
                    args.usage,
                    args.instance,
                    SLOT_PURPOSE_MASK | CERT_LEVEL_MASK,
                )
                .unwrap_or_else(|err| err.code()),
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_x509_certificate_from_slot(&mut self, out: *mut u8) -> DispatchCode {
        let args: GetX509CertificateFromSlotArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.cert_len as usize, core::mem::size_of::<u16>(), true) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        if args.buf.is_null() {
            // Deliver the required size on the next, properly formed call.
            app_write(&perms, args.cert_len, 0u16);
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        if !perms.check_app_ram(args.buf as usize, usize::from(args.len), true) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let mut cert_len = 0u16;
        let result = match self.datastore() {
            Ok(ds) => {
                // SAFETY: the destination range was checked as writable
                // application RAM above.
                let buf =
                    unsafe { core::slice::from_raw_parts_mut(args.buf, usize::from(args.len)) };
                match ds.copy_data(args.slot as i8, buf, &mut cert_len) {
                    Ok(()) => SECURE_API_RETURN_SUCCESS,
                    Err(err) => err.code(),
                }
            }
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        if result == SECURE_API_RETURN_SUCCESS || result == SECURE_API_ERR_BUFFER_SIZE_INVALID {
            app_write(&perms, args.cert_len, cert_len);
        }
        write_result(out, result)
    }

    pub(super) fn api_get_parent_of_certificate(&mut self, out: *mut u8) -> DispatchCode {
        let slot: i8 = self.input();
        let result = match self.datastore() {
            Ok(ds) => ds.parent(slot).unwrap_or_else(|err| err.code()),
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_number_of_keys(&mut self, out: *mut u8) -> DispatchCode {
        let args: NumberOfKeysArgs = self.input();
        let result = match slot_purpose(args.key_type) {
            SLOT_PURPOSE_IDENTITY_KEY | SLOT_PURPOSE_TRUST_ANCHOR_KEY | SLOT_PURPOSE_UPDATE_KEY => {
                match self.datastore() {
                    Ok(ds) => {
                        let mut mask = SLOT_PURPOSE_MASK;
                        if key_category(args.key_type) != 0 {
                            mask |= KEY_CATEGORY_MASK;
                        }
                        if key_algorithm(args.key_type) != 0 {
                            mask |= KEY_ALGORITHM_MASK;
                        }
                        if key_curve(args.key_type) != 0 {
                            mask |= KEY_CURVE_MASK;
                        }
                        ds.count(args.key_type, args.key_usage, mask)
                    }
                    Err(_) => SECURE_API_ERR_COMMAND_FAILED,
                }
            }
            _ => 0,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_slot_number_of_key(&mut self, out: *mut u8) -> DispatchCode {
        let args: SlotNumberOfKeyArgs = self.input();
        let result = match slot_purpose(args.key_type) {
            SLOT_PURPOSE_IDENTITY_KEY | SLOT_PURPOSE_TRUST_ANCHOR_KEY | SLOT_PURPOSE_UPDATE_KEY => {
                match self.datastore() {
                    Ok(ds) => {
                        let mut mask = SLOT_PURPOSE_MASK | KEY_CATEGORY_MASK;
                        if key_algorithm(args.key_type) != 0 {
                            mask |= KEY_ALGORITHM_MASK;
                        }
                        if key_curve(args.key_type) != 0 {
                            mask |= KEY_CURVE_MASK;
                        }
                        ds.find(args.key_type, args.key_usage, args.instance, mask)
                            .unwrap_or_else(|err| err.code())
                    }
                    Err(_) => SECURE_API_ERR_COMMAND_FAILED,
                }
            }
            _ => SECURE_API_ERR_SLOT_TYPE_MISMATCH,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_slot_number_of_key_for_certificate(&mut self, out: *mut u8) -> DispatchCode {
        let args: SlotNumberOfKeyForCertificateArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.key_type as usize, core::mem::size_of::<u16>(), true) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        let result = match self.datastore() {
            Ok(ds) => match ds.find_cert_key(args.slot) {
                Ok((slot, key_type)) => {
                    app_write(&perms, args.key_type, key_type);
                    slot
                }
                Err(err) => err.code(),
            },
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_details_of_key(&mut self, out: *mut u8) -> DispatchCode {
        let args: DetailsOfKeyArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.key_type as usize, core::mem::size_of::<u16>(), true)
            || !perms.check_app_ram(args.key_usage as usize, core::mem::size_of::<u16>(), true)
            || !perms.check_app_ram(args.public_key as usize, ECC_PUBLIC_KEY_SIZE, true)
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let result = match self.datastore() {
            Ok(ds) => match ds.key_details(args.slot) {
                Ok((key_type, key_usage, public_key)) => {
                    app_write(&perms, args.key_type, key_type);
                    app_write(&perms, args.key_usage, key_usage);
                    app_copy_out(&perms, args.public_key, public_key);
                    SECURE_API_RETURN_SUCCESS
                }
                Err(err) => err.code(),
            },
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_sign_using_key(&mut self, out: *mut u8) -> DispatchCode {
        let args: SignUsingKeyArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_rom(args.hash as usize, usize::from(args.hlen))
            || !perms.check_app_ram(args.sig_len as usize, core::mem::size_of::<u16>(), true)
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        if args.sig.is_null() {
            app_write(&perms, args.sig_len, 0u16);
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        let Some(supplied_sig_len) = app_read(&perms, args.sig_len) else {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        };
        if !perms.check_app_ram(args.sig as usize, usize::from(supplied_sig_len), true) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let mut hash = [0u8; 64];
        let hash_len = usize::from(args.hlen).min(hash.len());
        if app_copy_in(&perms, args.hash, &mut hash[..hash_len]).is_none() {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let mut signature = [0u8; ECDSA_SIGNATURE_SIZE];
        let mut sig_len = supplied_sig_len;
        let result = match self.datastore() {
            Ok(ds) => {
                let capped = usize::from(supplied_sig_len).min(ECDSA_SIGNATURE_SIZE);
                match ds.sign(args.slot, &hash[..hash_len], &mut signature[..capped], &mut sig_len)
                {
                    Ok(()) => {
                        app_copy_out(&perms, args.sig, &signature);
                        SECURE_API_RETURN_SUCCESS
                    }
                    Err(err) => err.code(),
                }
            }
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        app_write(&perms, args.sig_len, sig_len);
        write_result(out, result)
    }

    pub(super) fn api_verify_using_key(&mut self, out: *mut u8) -> DispatchCode {
        let args: VerifyUsingKeyArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_rom(args.hash as usize, usize::from(args.hlen))
            || !perms.check_app_rom(args.sig as usize, usize::from(args.slen))
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let mut hash = [0u8; 64];
        let hash_len = usize::from(args.hlen).min(hash.len());
        let mut sig = [0u8; ECDSA_SIGNATURE_SIZE];
        let sig_len = usize::from(args.slen).min(sig.len());
        if app_copy_in(&perms, args.hash, &mut hash[..hash_len]).is_none()
            || app_copy_in(&perms, args.sig, &mut sig[..sig_len]).is_none()
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let result = match self.datastore() {
            Ok(ds) => match ds.verify(args.slot, &hash[..hash_len], &sig[..sig_len]) {
                Ok(()) => SECURE_API_RETURN_SUCCESS,
                Err(err) => err.code(),
            },
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_generate_shared_secret(&mut self, out: *mut u8) -> DispatchCode {
        let args: GenerateSharedSecretArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_rom(args.public_key as usize, ECC_PUBLIC_KEY_SIZE)
            || !perms.check_app_ram(args.shared_secret as usize, ECC_PRIVATE_KEY_SIZE, true)
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let mut public_key = [0u8; ECC_PUBLIC_KEY_SIZE];
        if app_copy_in(&perms, args.public_key, &mut public_key).is_none() {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        let mut secret = [0u8; ECC_PRIVATE_KEY_SIZE];
        let result = match self.datastore() {
            Ok(ds) => match ds.shared_secret(args.slot, &public_key, &mut secret) {
                Ok(()) => {
                    app_copy_out(&perms, args.shared_secret, &secret);
                    SECURE_API_RETURN_SUCCESS
                }
                Err(err) => err.code(),
            },
            Err(_) => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_get_sbm_information(&mut self, out: *mut u8) -> DispatchCode {
        let args: GetSbmInformationArgs = self.input();
        let perms = self.perms;

        // The string length pointers first.
        let length_ptrs = [
            args.sbm_ver_length,
            args.sbm_build_time_length,
            args.provisioned_ver_length,
            args.provisioned_time_length,
            args.provisioning_machine_length,
        ];
        for ptr in length_ptrs {
            if !perms.check_app_ram(ptr as usize, core::mem::size_of::<u32>(), true) {
                return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
            }
        }

        // Then the string buffers, at their supplied lengths.
        let supplied = [
            app_read(&perms, args.sbm_ver_length),
            app_read(&perms, args.sbm_build_time_length),
            app_read(&perms, args.provisioned_ver_length),
            app_read(&perms, args.provisioned_time_length),
            app_read(&perms, args.provisioning_machine_length),
        ];
        let buffers = [
            args.sbm_ver,
            args.sbm_build_time,
            args.provisioned_ver,
            args.provisioned_time,
            args.provisioning_machine,
        ];
        let mut lengths = [0u32; 5];
        for (index, (ptr, len)) in buffers.iter().zip(supplied.iter()).enumerate() {
            let Some(len) = *len else {
                return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
            };
            if !perms.check_app_ram(*ptr as usize, len as usize, true) {
                return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
            }
            lengths[index] = len;
        }

        // For each field: always report the required length, copy the data
        // when the supplied buffer is big enough, and track any shortfall.
        let mut size_increase = false;
        let mut fill = |dst: *mut u8, len_ptr: *mut u32, supplied: u32, src: &[u8]| {
            let desired = src.len() as u32;
            app_write(&perms, len_ptr, desired);
            if desired <= supplied {
                app_copy_out(&perms, dst, src);
            } else {
                size_increase = true;
            }
        };

        let mut version = [0u8; 16];
        version[..SBM_VERSION.len()].copy_from_slice(SBM_VERSION.as_bytes());
        fill(
            args.sbm_ver,
            args.sbm_ver_length,
            lengths[0],
            &version[..SBM_VERSION.len() + 1],
        );

        // The build time is not embedded in this image: an empty string
        // with a zero length, which the caller may print regardless.
        app_write(&perms, args.sbm_build_time_length, 0u32);
        app_copy_out(&perms, args.sbm_build_time, &[0u8]);

        let details = self.datastore().ok().and_then(|ds| ds.provisioning_details());
        match details {
            Some(details) => {
                fill(
                    args.provisioned_ver,
                    args.provisioned_ver_length,
                    lengths[2],
                    &details.context_uuid_iteration
                        [..str_field_len(&details.context_uuid_iteration)],
                );
                fill(
                    args.provisioned_time,
                    args.provisioned_time_length,
                    lengths[3],
                    &details.date_time[..str_field_len(&details.date_time)],
                );
                fill(
                    args.provisioning_machine,
                    args.provisioning_machine_length,
                    lengths[4],
                    &details.machine_uuid[..str_field_len(&details.machine_uuid)],
                );
            }
            None => {
                // No provisioning details: empty strings, zero lengths.
                for (ptr, len_ptr) in [
                    (args.provisioned_ver, args.provisioned_ver_length),
                    (args.provisioned_time, args.provisioned_time_length),
                    (args.provisioning_machine, args.provisioning_machine_length),
                ] {
                    app_copy_out(&perms, ptr, &[0u8]);
                    app_write(&perms, len_ptr, 0u32);
                }
            }
        }

        let result = if size_increase {
            SECURE_API_ERR_BUFFER_SIZE_INVALID
        } else {
            SECURE_API_RETURN_SUCCESS
        };
        write_result(out, result)
    }

    pub(super) fn api_get_update_info(&mut self, out: *mut u8) -> DispatchCode {
        let args: GetUpdateInfoArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.status as usize, core::mem::size_of::<u32>(), true)
            || !perms.check_app_ram(args.uuid_length as usize, core::mem::size_of::<u16>(), true)
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        let Some(buf_len) = app_read(&perms, args.uuid_length) else {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        };
        if !perms.check_app_ram(args.uuid as usize, usize::from(buf_len), true) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        app_write(&perms, args.uuid_length, UUID_SIZE as u16);
        if usize::from(buf_len) < UUID_SIZE {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        }

        let status = self.last_status().code();
        let uuid = self.last_installed_uuid();
        app_write(&perms, args.status, status);
        app_copy_out(&perms, args.uuid, &uuid);
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }

    pub(super) fn api_get_application_info(&mut self, out: *mut u8) -> DispatchCode {
        let args: GetApplicationInfoArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.num_apps as usize, core::mem::size_of::<u32>(), true)
            || !perms.check_app_ram(
                args.app_info_records_length as usize,
                core::mem::size_of::<u32>(),
                true,
            )
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }
        let Some(records_length) = app_read(&perms, args.app_info_records_length) else {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        };
        if !perms.check_app_ram(
            args.app_info_records as usize,
            records_length as usize,
            true,
        ) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        // Only the master application exists.
        app_write(&perms, args.num_apps, 1u32);
        if core::mem::size_of::<AppInfoRecord>() as u32 > records_length {
            return DispatchCode::InBufSizeError;
        }

        match self.executable_module_info() {
            Some(record) => {
                app_copy_out(&perms, args.app_info_records.cast::<u8>(), record.as_bytes());
                write_result(out, SECURE_API_RETURN_SUCCESS)
            }
            None => write_result(out, SECURE_API_ERR_COMMAND_FAILED),
        }
    }

    pub(super) fn api_get_update_slot_info(&mut self, out: *mut u8) -> DispatchCode {
        let args: GetUpdateSlotInfoArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.update_slot_id as usize, core::mem::size_of::<u32>(), true)
            || !perms.check_app_ram(args.start_address as usize, core::mem::size_of::<u32>(), true)
            || !perms.check_app_ram(args.slot_size as usize, core::mem::size_of::<u32>(), true)
        {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        self.default_init_active_update_slot();
        match self.active_update_slot() {
            Some(slot) => {
                app_write(&perms, args.update_slot_id, slot.id);
                app_write(&perms, args.start_address, slot.start as u32);
                app_write(&perms, args.slot_size, slot.size as u32);
            }
            None => {
                app_write(&perms, args.update_slot_id, MEMORY_SLOT_ID_INVALID);
                app_write(&perms, args.start_address, u32::MAX);
                app_write(&perms, args.slot_size, 0u32);
            }
        }
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }

    pub(super) fn api_check_update_slot(&mut self, out: *mut u8) -> DispatchCode {
        self.default_init_active_update_slot();
        let result = match self.active_update_slot() {
            Some(slot) => {
                if self.can_install_update(slot) {
                    SECURE_API_RETURN_SUCCESS
                } else {
                    SECURE_API_ERR_COMMAND_FAILED
                }
            }
            None => SECURE_API_ERR_COMMAND_FAILED,
        };
        write_result(out, result)
    }

    pub(super) fn api_install_update(&mut self, out: *mut u8) -> DispatchCode {
        self.default_init_active_update_slot();
        if let Some(slot) = self.active_update_slot() {
            if self.can_install_update(slot) {
                // The update is valid: reset and let the boot path install
                // it. Tidy-up before the reset belongs here.
                self.hal.reset();
            }
        }
        // Update not valid, or the reset did not take; tell the caller.
        write_result(out, SECURE_API_ERR_COMMAND_FAILED)
    }

    pub(super) fn api_update_slot_begin_write(&mut self, out: *mut u8) -> DispatchCode {
        let args: UpdateSlotBeginWriteArgs = self.input();
        let perms = self.perms;

        if !perms.check_app_ram(args.write_size as usize, core::mem::size_of::<u32>(), true) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        self.default_init_active_update_slot();
        let Some(slot) = self.active_update_slot() else {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        };

        if self.mem.erase(slot, 0, slot.size).is_err() {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        }
        let Ok(write_size) = self.mem.min_write_size(slot) else {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        };

        self.persist.update_write_size = write_size as u32;
        self.persist.update_write_index = 0;
        app_write(&perms, args.write_size, write_size as u32);
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }

    pub(super) fn api_update_slot_write(&mut self, out: *mut u8) -> DispatchCode {
        let args: UpdateSlotWriteArgs = self.input();
        let perms = self.perms;

        // A successful updateSlotBeginWrite must precede writes.
        let write_size = self.persist.update_write_size;
        let Some(slot) = self.active_update_slot() else {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        };
        if write_size == 0 {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        }

        let index = self.persist.update_write_index;
        let bytes = args.bytes;
        if bytes == 0
            || bytes % write_size != 0
            || bytes as usize > slot.size - index as usize
        {
            return write_result(out, SECURE_API_ERR_BUFFER_SIZE_INVALID);
        }
        if !perms.check_app_ram(args.buffer as usize, bytes as usize, false) {
            return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
        }

        // SAFETY: the source range was checked against the reserved
        // regions above; the application guarantees it is readable.
        let src = unsafe { core::slice::from_raw_parts(args.buffer, bytes as usize) };
        if self.mem.program(slot, index as usize, src).is_err() {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        }

        self.persist.update_write_index = index + bytes;
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }

    pub(super) fn api_update_slot_end_write(&mut self, out: *mut u8) -> DispatchCode {
        // Prevent any further writes until the next begin.
        self.persist.update_write_size = 0;
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }

    pub(super) fn api_set_active_update_slot(&mut self, out: *mut u8) -> DispatchCode {
        let args: SetActiveUpdateSlotArgs = self.input();

        let Some(slot) = self.mem.update_slot_by_id(args.slot_id) else {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        };
        if slot.kind != SlotKind::Update {
            return write_result(out, SECURE_API_ERR_COMMAND_FAILED);
        }

        self.persist.active_update_slot = Some(slot.id);
        // Abort any write sequence in progress.
        self.persist.update_write_index = 0;
        self.persist.update_write_size = 0;
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }

    pub(super) fn api_get_sbm_performance(&mut self, out: *mut u8) -> DispatchCode {
        let args: GetSbmPerformanceArgs = self.input();
        let perms = self.perms;

        let ptrs = [
            args.boot_time,
            args.sbm_size,
            args.pd_size,
            args.watchdog_period,
            args.watchdog_max_period,
            args.watchdog_max_activity_start,
            args.watchdog_max_activity_end,
            args.sbm_stack_size,
            args.sbm_stack_used,
        ];
        for ptr in ptrs {
            if !perms.check_app_ram(ptr as usize, core::mem::size_of::<u32>(), true) {
                return write_result(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
            }
        }

        let (sbm_size, pd_size) = self.calculate_sizes();
        app_write(&perms, args.boot_time, self.persist.boot_time_us);
        app_write(&perms, args.sbm_size, sbm_size);
        app_write(&perms, args.pd_size, pd_size);
        // The rest are unused for now.
        for ptr in &ptrs[3..] {
            app_write(&perms, *ptr, 0u32);
        }
        write_result(out, SECURE_API_RETURN_SUCCESS)
    }
}
