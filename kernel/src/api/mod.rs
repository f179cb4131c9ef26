// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Secure API call gate.
//!
//! Post-launch, the application reaches the SBM through a single routing
//! function. The gate validates the function number, both buffer lengths
//! and both buffer locations, rejects overlap, then stages a copy of the
//! input structure in SBM-owned memory before any pointer inside it is
//! dereferenced. That copy defeats the TOCTOU where an application
//! interrupt handler rewrites an indirect pointer after it was checked.

mod appmem;
pub mod args;
mod handlers;

use crate::hal::Hal;
use crate::logging;
use crate::oem::OemHooks;
use crate::persist::API_INPUT_MAX_SIZE;
use crate::Sbm;
use args::*;
use core::mem::size_of;
use sbmdefs::DispatchCode;

/// Input and output buffers of an entry may overlap.
const ATTR_OVERLAP: u16 = 1;

struct ApiEntry {
    in_len: usize,
    out_len: usize,
    attr: u16,
}

const fn entry(in_len: usize, out_len: usize) -> ApiEntry {
    ApiEntry {
        in_len,
        out_len,
        attr: 0,
    }
}

/// Expected buffer lengths per function number. Indexed by the stable
/// function numbering in `sbmdefs`.
const API_TABLE: [ApiEntry; 22] = [
    entry(size_of::<u16>(), 1),                                    // getNumberOfDeviceCertificates
    entry(size_of::<SlotNumberOfDeviceCertificateArgs>(), 1),      // getSlotNumberOfDeviceCertificate
    entry(size_of::<GetX509CertificateFromSlotArgs>(), 1),         // getX509CertificateFromSlot
    entry(size_of::<i8>(), 1),                                     // getParentOfCertificate
    entry(size_of::<NumberOfKeysArgs>(), 1),                       // getNumberOfKeys
    entry(size_of::<SlotNumberOfKeyArgs>(), 1),                    // getSlotNumberOfKey
    entry(size_of::<SlotNumberOfKeyForCertificateArgs>(), 1),      // getSlotNumberOfKeyForCertificate
    entry(size_of::<DetailsOfKeyArgs>(), 1),                       // getDetailsOfKey
    entry(size_of::<SignUsingKeyArgs>(), 1),                       // signUsingKey
    entry(size_of::<VerifyUsingKeyArgs>(), 1),                     // verifyUsingKey
    entry(size_of::<GenerateSharedSecretArgs>(), 1),               // generateSharedSecret
    entry(size_of::<GetSbmInformationArgs>(), 1),                  // getSBMInformation
    entry(size_of::<GetUpdateInfoArgs>(), 1),                      // getUpdateInfo
    entry(size_of::<GetApplicationInfoArgs>(), 1),                 // getApplicationInfo
    entry(size_of::<GetUpdateSlotInfoArgs>(), 1),                  // getUpdateSlotInfo
    entry(0, 1),                                                   // checkUpdateSlot
    entry(0, 1),                                                   // installUpdate
    entry(size_of::<UpdateSlotBeginWriteArgs>(), 1),               // updateSlotBeginWrite
    entry(size_of::<UpdateSlotWriteArgs>(), 1),                    // updateSlotWrite
    entry(0, 1),                                                   // updateSlotEndWrite
    entry(size_of::<SetActiveUpdateSlotArgs>(), 1),                // setActiveUpdateSlot
    entry(size_of::<GetSbmPerformanceArgs>(), 1),                  // getSBMPerformance
];

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// The secure API routing function. The return value is the dispatch
    /// status; per-service results are written through `out_buf`.
    pub fn secure_api(
        &mut self,
        fidx: u32,
        in_buf: *const u8,
        in_len: u32,
        out_buf: *mut u8,
        out_len: u32,
    ) -> i32 {
        self.dispatch(fidx, in_buf, in_len, out_buf, out_len) as i32
    }

    fn dispatch(
        &mut self,
        fidx: u32,
        in_buf: *const u8,
        in_len: u32,
        out_buf: *mut u8,
        out_len: u32,
    ) -> DispatchCode {
        let Some(entry) = API_TABLE.get(fidx as usize) else {
            return DispatchCode::MissingFunction;
        };

        let in_len = in_len as usize;
        let out_len = out_len as usize;

        if entry.in_len != in_len {
            return DispatchCode::InBufSizeError;
        }
        if in_len > 0 && !self.perms.check_app_rom(in_buf as usize, in_len) {
            return DispatchCode::InBufMissing;
        }
        if entry.out_len != out_len {
            return DispatchCode::OutBufSizeError;
        }
        if out_len > 0 && !self.perms.check_app_ram(out_buf as usize, out_len, true) {
            return DispatchCode::OutBufMissing;
        }
        if in_len > 0 && out_len > 0 && entry.attr & ATTR_OVERLAP == 0 {
            let in_addr = in_buf as usize;
            let out_addr = out_buf as usize;
            if (in_addr <= out_addr && out_addr < in_addr + in_len)
                || (out_addr <= in_addr && in_addr < out_addr + out_len)
            {
                return DispatchCode::BufOverlap;
            }
        }

        // The HAL serial port was quiesced when the application booted and
        // may have been reprogrammed since; never log from API context.
        logging::disable();

        let encrypted = matches!(self.pdb_encrypted(), Ok(true));
        if encrypted && self.verify_and_decrypt_pdb().is_err() {
            return DispatchCode::EdpDecryptError;
        }

        // Stage a private copy of the input structure before any pointer
        // inside it is dereferenced.
        if in_len > API_INPUT_MAX_SIZE {
            if encrypted {
                self.clear_plaintext_pdb();
            }
            return DispatchCode::InBufSizeError;
        }
        if in_len > 0 {
            // SAFETY: the range was checked against the reserved regions
            // above and fits the staging buffer; the application
            // guarantees its own pointer is readable.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    in_buf,
                    self.persist.api_input.0.as_mut_ptr(),
                    in_len,
                );
            }
        }

        let ret = match fidx {
            sbmdefs::API_GET_NUMBER_OF_DEVICE_CERTIFICATES => {
                self.api_get_number_of_device_certificates(out_buf)
            }
            sbmdefs::API_GET_SLOT_NUMBER_OF_DEVICE_CERTIFICATE => {
                self.api_get_slot_number_of_device_certificate(out_buf)
            }
            sbmdefs::API_GET_X509_CERTIFICATE_FROM_SLOT => {
                self.api_get_x509_certificate_from_slot(out_buf)
            }
            sbmdefs::API_GET_PARENT_OF_CERTIFICATE => self.api_get_parent_of_certificate(out_buf),
            sbmdefs::API_GET_NUMBER_OF_KEYS => self.api_get_number_of_keys(out_buf),
            sbmdefs::API_GET_SLOT_NUMBER_OF_KEY => self.api_get_slot_number_of_key(out_buf),
            sbmdefs::API_GET_SLOT_NUMBER_OF_KEY_FOR_CERTIFICATE => {
                self.api_get_slot_number_of_key_for_certificate(out_buf)
            }
            sbmdefs::API_GET_DETAILS_OF_KEY => self.api_get_details_of_key(out_buf),
            sbmdefs::API_SIGN_USING_KEY => self.api_sign_using_key(out_buf),
            sbmdefs::API_VERIFY_USING_KEY => self.api_verify_using_key(out_buf),
            sbmdefs::API_GENERATE_SHARED_SECRET => self.api_generate_shared_secret(out_buf),
            sbmdefs::API_GET_SBM_INFORMATION => self.api_get_sbm_information(out_buf),
            sbmdefs::API_GET_UPDATE_INFO => self.api_get_update_info(out_buf),
            sbmdefs::API_GET_APPLICATION_INFO => self.api_get_application_info(out_buf),
            sbmdefs::API_GET_UPDATE_SLOT_INFO => self.api_get_update_slot_info(out_buf),
            sbmdefs::API_CHECK_UPDATE_SLOT => self.api_check_update_slot(out_buf),
            sbmdefs::API_INSTALL_UPDATE => self.api_install_update(out_buf),
            sbmdefs::API_UPDATE_SLOT_BEGIN_WRITE => self.api_update_slot_begin_write(out_buf),
            sbmdefs::API_UPDATE_SLOT_WRITE => self.api_update_slot_write(out_buf),
            sbmdefs::API_UPDATE_SLOT_END_WRITE => self.api_update_slot_end_write(out_buf),
            sbmdefs::API_SET_ACTIVE_UPDATE_SLOT => self.api_set_active_update_slot(out_buf),
            sbmdefs::API_GET_SBM_PERFORMANCE => self.api_get_sbm_performance(out_buf),
            _ => DispatchCode::UnimplementedFunction,
        };

        if encrypted {
            self.clear_plaintext_pdb();
        }
        ret
    }

    /// The staged copy of the caller's input structure.
    pub(crate) fn input<T: Copy>(&self) -> T {
        // SAFETY: the gate staged at least `size_of::<T>()` bytes, policed
        // against the table entry, into a buffer aligned for any input
        // structure.
        unsafe { *self.persist.api_input.0.as_ptr().cast::<T>() }
    }
}

/// Write a service result through the gate-validated output buffer.
pub(crate) fn write_result(out_buf: *mut u8, code: i8) -> DispatchCode {
    // SAFETY: the gate confirmed `out_buf` addresses writable application
    // memory of the expected length before dispatching.
    unsafe { out_buf.cast::<i8>().write_unaligned(code) };
    DispatchCode::Ok
}
