// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Secure API gate and service behaviour, called the way an application
//! would call through the access pointer.

mod common;

use common::*;
use core::mem::size_of;
use sbm::api::args::*;
use sbmdefs::*;

const UUID_A: [u8; 16] = [0xa1; 16];
const BODY_LEN: usize = 8192;

/// Call the gate with a typed input structure and a one-byte result.
fn call<T>(rig: &mut TestRig, fidx: u32, args: &T) -> (i32, i8) {
    let mut out: i8 = -99;
    let mut sbm = rig.sbm();
    let ret = sbm.secure_api(
        fidx,
        core::ptr::from_ref(args).cast(),
        size_of::<T>() as u32,
        (&mut out as *mut i8).cast(),
        1,
    );
    (ret, out)
}

fn call_no_input(rig: &mut TestRig, fidx: u32) -> (i32, i8) {
    let mut out: i8 = -99;
    let mut sbm = rig.sbm();
    let ret = sbm.secure_api(
        fidx,
        core::ptr::null(),
        0,
        (&mut out as *mut i8).cast(),
        1,
    );
    (ret, out)
}

fn booted_rig() -> TestRig {
    let swup = build_swup(UUID_A, 0x0100_0001, BODY_LEN);
    let mut rig = TestRig::new(&[&swup.image]);
    rig.sbm().boot().unwrap();
    rig
}

#[test]
fn gate_rejects_bad_function_and_lengths() {
    let mut rig = booted_rig();

    let (ret, _) = call_no_input(&mut rig, 999);
    assert_eq!(ret, DispatchCode::MissingFunction as i32);

    // Wrong input length.
    let mut out: i8 = 0;
    let usage: u16 = 0;
    let mut sbm = rig.sbm();
    let ret = sbm.secure_api(
        API_GET_NUMBER_OF_DEVICE_CERTIFICATES,
        core::ptr::from_ref(&usage).cast(),
        1, // expected 2
        (&mut out as *mut i8).cast(),
        1,
    );
    assert_eq!(ret, DispatchCode::InBufSizeError as i32);

    // Wrong output length.
    let ret = sbm.secure_api(
        API_GET_NUMBER_OF_DEVICE_CERTIFICATES,
        core::ptr::from_ref(&usage).cast(),
        2,
        (&mut out as *mut i8).cast(),
        4,
    );
    assert_eq!(ret, DispatchCode::OutBufSizeError as i32);
}

#[test]
fn gate_rejects_overlapping_buffers() {
    let mut rig = booted_rig();
    let mut sbm = rig.sbm();

    let mut shared: i8 = 0;
    let ptr = &mut shared as *mut i8;
    let ret = sbm.secure_api(
        API_GET_PARENT_OF_CERTIFICATE,
        ptr.cast_const().cast(),
        1,
        ptr.cast(),
        1,
    );
    assert_eq!(ret, DispatchCode::BufOverlap as i32);
}

#[test]
fn gate_rejects_buffers_in_sbm_reserved_memory() {
    let mut rig = booted_rig();
    let persist_addr = rig.persist_addr();

    // An input buffer inside the persistent RAM block never reaches a
    // handler.
    let mut out: i8 = 0;
    let mut sbm = rig.sbm();
    let ret = sbm.secure_api(
        API_GET_NUMBER_OF_DEVICE_CERTIFICATES,
        persist_addr as *const u8,
        2,
        (&mut out as *mut i8).cast(),
        1,
    );
    assert_eq!(ret, DispatchCode::InBufMissing as i32);
    drop(sbm);

    // A pointer hidden inside an otherwise valid input structure is
    // caught by the handler's own checks.
    let mut cert_len: u16 = 0;
    let args = GetX509CertificateFromSlotArgs {
        slot: 2,
        buf: persist_addr as *mut u8,
        len: 64,
        cert_len: &mut cert_len,
    };
    let (ret, out) = call(&mut rig, API_GET_X509_CERTIFICATE_FROM_SLOT, &args);
    assert_eq!(ret, DispatchCode::Ok as i32);
    assert_eq!(out, SECURE_API_ERR_BUFFER_LOCATION_INVALID);
}

#[test]
fn certificate_services_work_end_to_end() {
    let mut rig = booted_rig();

    let usage: u16 = 0;
    let (ret, count) = call(&mut rig, API_GET_NUMBER_OF_DEVICE_CERTIFICATES, &usage);
    assert_eq!(ret, 0);
    assert_eq!(count, 1);

    let args = SlotNumberOfDeviceCertificateArgs {
        usage: 0x0005,
        instance: 0,
    };
    let (ret, slot) = call(&mut rig, API_GET_SLOT_NUMBER_OF_DEVICE_CERTIFICATE, &args);
    assert_eq!(ret, 0);
    assert_eq!(slot, 2);

    // Copy the certificate out.
    let mut buf = [0u8; 64];
    let mut cert_len: u16 = 0;
    let args = GetX509CertificateFromSlotArgs {
        slot: 2,
        buf: buf.as_mut_ptr(),
        len: buf.len() as u16,
        cert_len: &mut cert_len,
    };
    let (ret, out) = call(&mut rig, API_GET_X509_CERTIFICATE_FROM_SLOT, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(
        &buf[..cert_len as usize],
        b"test device certificate der bytes"
    );

    // An undersized buffer reports the required length.
    let mut small = [0u8; 4];
    let mut need: u16 = 0;
    let args = GetX509CertificateFromSlotArgs {
        slot: 2,
        buf: small.as_mut_ptr(),
        len: small.len() as u16,
        cert_len: &mut need,
    };
    let (_, out) = call(&mut rig, API_GET_X509_CERTIFICATE_FROM_SLOT, &args);
    assert_eq!(out, SECURE_API_ERR_BUFFER_SIZE_INVALID);
    assert_eq!(need, 33);

    let parent: i8 = 2;
    let (ret, out) = call(&mut rig, API_GET_PARENT_OF_CERTIFICATE, &parent);
    assert_eq!(ret, 0);
    assert_eq!(out, 2);
}

#[test]
fn key_services_sign_verify_and_derive() {
    let mut rig = booted_rig();

    // The certificate's key slot.
    let mut key_type: u16 = 0;
    let args = SlotNumberOfKeyForCertificateArgs {
        slot: 2,
        key_type: &mut key_type,
    };
    let (ret, key_slot) = call(&mut rig, API_GET_SLOT_NUMBER_OF_KEY_FOR_CERTIFICATE, &args);
    assert_eq!(ret, 0);
    assert_eq!(key_slot, 3);
    assert_eq!(key_type & KEY_CATEGORY_MASK, KEY_CATEGORY_PAIR);

    // Key details yield the public key.
    let mut kt: u16 = 0;
    let mut ku: u16 = 0;
    let mut public_key = [0u8; ECC_PUBLIC_KEY_SIZE];
    let args = DetailsOfKeyArgs {
        slot: 3,
        key_type: &mut kt,
        key_usage: &mut ku,
        public_key: public_key.as_mut_ptr(),
    };
    let (ret, out) = call(&mut rig, API_GET_DETAILS_OF_KEY, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(ku, 0x0005);

    // Sign a digest with the identity key, verify through the API too.
    let digest = sbm::crypto::sha256::sha256(b"application supplied digest");
    let mut signature = [0u8; ECDSA_SIGNATURE_SIZE];
    let mut sig_len: u16 = signature.len() as u16;
    let args = SignUsingKeyArgs {
        slot: 3,
        hash: digest.as_ptr(),
        hlen: digest.len() as u16,
        sig: signature.as_mut_ptr(),
        sig_len: &mut sig_len,
    };
    let (ret, out) = call(&mut rig, API_SIGN_USING_KEY, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(sig_len, 64);

    let args = VerifyUsingKeyArgs {
        slot: 3,
        hash: digest.as_ptr(),
        hlen: digest.len() as u16,
        sig: signature.as_ptr(),
        slen: signature.len() as u16,
    };
    let (ret, out) = call(&mut rig, API_VERIFY_USING_KEY, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    // A shared secret against a peer key agrees with a local derivation.
    let peer_private: EccPrivateKey = [0x66; 32];
    let peer_public = sbm::crypto::ecdsa::public_key_of(&peer_private).unwrap();
    let mut secret = [0u8; ECC_PRIVATE_KEY_SIZE];
    let args = GenerateSharedSecretArgs {
        slot: 3,
        public_key: peer_public.as_ptr(),
        shared_secret: secret.as_mut_ptr(),
    };
    let (ret, out) = call(&mut rig, API_GENERATE_SHARED_SECRET, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    let mut expected = [0u8; 32];
    let identity_public = sbm::crypto::ecdsa::public_key_of(&IDENTITY_PRIVATE).unwrap();
    sbm::crypto::ecdsa::shared_secret(&peer_private, &identity_public, &mut expected).unwrap();
    assert_eq!(secret, expected);
}

#[test]
fn update_info_reflects_the_last_install() {
    let mut rig = booted_rig();

    let mut status: u32 = 0;
    let mut uuid = [0u8; 16];
    let mut uuid_length: u16 = 16;
    let args = GetUpdateInfoArgs {
        status: &mut status,
        uuid: uuid.as_mut_ptr(),
        uuid_length: &mut uuid_length,
    };
    let (ret, out) = call(&mut rig, API_GET_UPDATE_INFO, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    // Installed during this boot.
    assert_eq!(status, 2);
    assert_eq!(uuid, UUID_A);
    assert_eq!(uuid_length, 16);
}

#[test]
fn application_info_describes_the_installed_image() {
    let mut rig = booted_rig();

    let mut num_apps: u32 = 0;
    let mut record = AppInfoRecord::default();
    let mut records_length: u32 = size_of::<AppInfoRecord>() as u32;
    let args = GetApplicationInfoArgs {
        num_apps: &mut num_apps,
        app_info_records: &mut record,
        app_info_records_length: &mut records_length,
    };
    let (ret, out) = call(&mut rig, API_GET_APPLICATION_INFO, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(num_apps, 1);
    assert_eq!(record.app_version.get(), 0x0100_0001);
    assert_eq!(record.start_addr.get(), EXEC_START as u32);
    assert_eq!(record.end_addr.get(), (EXEC_START + BODY_LEN - 1) as u32);
}

#[test]
fn sbm_information_reports_sizes_and_strings() {
    let mut rig = booted_rig();

    let mut ver = [0u8; SECURE_API_SBM_VER_STR_SIZE];
    let mut ver_len: u32 = ver.len() as u32;
    let mut build = [0u8; SECURE_API_SBM_TIME_STR_SIZE];
    let mut build_len: u32 = build.len() as u32;
    let mut pver = [0u8; SECURE_API_PROV_VER_STR_SIZE];
    let mut pver_len: u32 = pver.len() as u32;
    let mut ptime = [0u8; SECURE_API_PROV_TIME_STR_SIZE];
    let mut ptime_len: u32 = ptime.len() as u32;
    let mut pmach = [0u8; SECURE_API_PROV_MACH_STR_SIZE];
    let mut pmach_len: u32 = pmach.len() as u32;

    let args = GetSbmInformationArgs {
        sbm_ver: ver.as_mut_ptr(),
        sbm_ver_length: &mut ver_len,
        sbm_build_time: build.as_mut_ptr(),
        sbm_build_time_length: &mut build_len,
        provisioned_ver: pver.as_mut_ptr(),
        provisioned_ver_length: &mut pver_len,
        provisioned_time: ptime.as_mut_ptr(),
        provisioned_time_length: &mut ptime_len,
        provisioning_machine: pmach.as_mut_ptr(),
        provisioning_machine_length: &mut pmach_len,
    };
    let (ret, out) = call(&mut rig, API_GET_SBM_INFORMATION, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    assert!(ver.starts_with(b"SBM "));
    assert_eq!(build_len, 0);
    assert!(pver.starts_with(b"51515151-iter-003"));
    assert!(ptime.starts_with(b"2026/07/01 12:00:00"));
    assert!(pmach.starts_with(b"prov-rig"));

    // A too-small version buffer reports the required size instead.
    let mut tiny = [0u8; 2];
    let mut tiny_len: u32 = tiny.len() as u32;
    let args = GetSbmInformationArgs {
        sbm_ver: tiny.as_mut_ptr(),
        sbm_ver_length: &mut tiny_len,
        sbm_build_time: build.as_mut_ptr(),
        sbm_build_time_length: &mut build_len,
        provisioned_ver: pver.as_mut_ptr(),
        provisioned_ver_length: &mut pver_len,
        provisioned_time: ptime.as_mut_ptr(),
        provisioned_time_length: &mut ptime_len,
        provisioning_machine: pmach.as_mut_ptr(),
        provisioning_machine_length: &mut pmach_len,
    };
    let (_, out) = call(&mut rig, API_GET_SBM_INFORMATION, &args);
    assert_eq!(out, SECURE_API_ERR_BUFFER_SIZE_INVALID);
    assert!(tiny_len > 2);
}

#[test]
fn update_slot_write_round_trips_and_stages_an_update() {
    let mut rig = booted_rig();

    // Aim the write API at the second update slot.
    let args = SetActiveUpdateSlotArgs { slot_id: 11 };
    let (ret, out) = call(&mut rig, API_SET_ACTIVE_UPDATE_SLOT, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    let mut slot_id: u32 = 0;
    let mut start: u32 = 0;
    let mut size: u32 = 0;
    let args = GetUpdateSlotInfoArgs {
        update_slot_id: &mut slot_id,
        start_address: &mut start,
        slot_size: &mut size,
    };
    let (ret, out) = call(&mut rig, API_GET_UPDATE_SLOT_INFO, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(slot_id, 11);
    assert_eq!(start, UPDATE1_START as u32);
    assert_eq!(size, UPDATE_SIZE as u32);

    // Begin a write sequence: the slot is erased and the minimum write
    // unit is reported.
    let mut write_size: u32 = 0;
    let args = UpdateSlotBeginWriteArgs {
        write_size: &mut write_size,
    };
    let (ret, out) = call(&mut rig, API_UPDATE_SLOT_BEGIN_WRITE, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(write_size as usize, PAGE_SIZE);

    // Stream a fresh, newer package in write-unit multiples.
    let swup = build_swup([0xb2; 16], 0x0100_0002, BODY_LEN);
    let mut staged = swup.image.clone();
    staged.resize(staged.len().div_ceil(PAGE_SIZE) * PAGE_SIZE, 0xff);
    for chunk in staged.chunks(4 * PAGE_SIZE) {
        let args = UpdateSlotWriteArgs {
            buffer: chunk.as_ptr(),
            bytes: chunk.len() as u32,
        };
        let (ret, out) = call(&mut rig, API_UPDATE_SLOT_WRITE, &args);
        assert_eq!(ret, 0);
        assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    }

    let (ret, out) = call_no_input(&mut rig, API_UPDATE_SLOT_END_WRITE);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    // Writes after the end of the sequence are refused.
    let args = UpdateSlotWriteArgs {
        buffer: staged.as_ptr(),
        bytes: PAGE_SIZE as u32,
    };
    let (_, out) = call(&mut rig, API_UPDATE_SLOT_WRITE, &args);
    assert_eq!(out, SECURE_API_ERR_COMMAND_FAILED);

    // The slot contents round-tripped exactly.
    let written = rig.slot_bytes(&rig.map.update_slots[1], 0, swup.image.len());
    assert_eq!(written, swup.image);

    // The staged package is valid and wanted: checkUpdateSlot says go,
    // and installUpdate asks the HAL for a reset.
    let (ret, out) = call_no_input(&mut rig, API_CHECK_UPDATE_SLOT);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    let hal = rig.hal;
    let (ret, out) = call_no_input(&mut rig, API_INSTALL_UPDATE);
    assert_eq!(ret, 0);
    assert!(hal.reset_requested.get());
    // The simulated reset returns, so the gate reports failure.
    assert_eq!(out, SECURE_API_ERR_COMMAND_FAILED);
}

#[test]
fn misaligned_write_sizes_are_refused() {
    let mut rig = booted_rig();

    let mut write_size: u32 = 0;
    let args = UpdateSlotBeginWriteArgs {
        write_size: &mut write_size,
    };
    let (_, out) = call(&mut rig, API_UPDATE_SLOT_BEGIN_WRITE, &args);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);

    let data = [0u8; 100];
    let args = UpdateSlotWriteArgs {
        buffer: data.as_ptr(),
        bytes: data.len() as u32, // not a write-unit multiple
    };
    let (_, out) = call(&mut rig, API_UPDATE_SLOT_WRITE, &args);
    assert_eq!(out, SECURE_API_ERR_BUFFER_SIZE_INVALID);
}

#[test]
fn performance_figures_are_reported() {
    let mut rig = booted_rig();

    let mut boot_time: u32 = 0;
    let mut sbm_size: u32 = 0;
    let mut pd_size: u32 = 0;
    let mut zeros = [0u32; 6];
    let [z0, z1, z2, z3, z4, z5] = &mut zeros;
    let args = GetSbmPerformanceArgs {
        boot_time: &mut boot_time,
        sbm_size: &mut sbm_size,
        pd_size: &mut pd_size,
        watchdog_period: z0,
        watchdog_max_period: z1,
        watchdog_max_activity_start: z2,
        watchdog_max_activity_end: z3,
        sbm_stack_size: z4,
        sbm_stack_used: z5,
    };
    let (ret, out) = call(&mut rig, API_GET_SBM_PERFORMANCE, &args);
    assert_eq!(ret, 0);
    assert_eq!(out, SECURE_API_RETURN_SUCCESS);
    assert_eq!(sbm_size, PD_OFFSET as u32);
    assert!(pd_size > 0);
}
