// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Shared test support: a simulated platform, a provisioned flash image,
//! and builders that fabricate PDBs and SWUPs the way the provisioning and
//! packaging tools do.

// Each integration test binary uses its own slice of this module.
#![allow(dead_code)]

use sbm::boot::MAX_UPDATE_SLOTS;
use sbm::buffer_check::{AppPermissions, MemRegionDesc};
use sbm::crypto::checksum::checksum;
use sbm::crypto::sha256::{sha256, sha256_chunked};
use sbm::crypto::{aes_gcm, ecdsa, ecies};
use sbm::hal::{Hal, UNIQUE_ID_SIZE};
use sbm::mem::{MemoryDeviceEntry, MemoryMap, MemorySlot, MemorySubregion, RamDevice, SlotKind};
use sbm::oem::{BootStage, OemHooks};
use sbm::persist::{EphemeralBuffers, SbmPersistent};
use sbm::{BootPolicy, Sbm};
use sbmdefs::*;
use std::cell::{Cell, RefCell};

/* Flash floorplan used by every test. */
pub const PAGE_SIZE: usize = 256;
pub const ERASE_SIZE: usize = 1024;
pub const FLASH_SIZE: usize = 0x40000;
pub const SBM_START: usize = 0x0000;
pub const SBM_SIZE: usize = 0x4000;
pub const PD_OFFSET: usize = 0x2000;
pub const APP_STATUS_START: usize = 0x4000;
pub const EXEC_START: usize = 0x4400;
pub const EXEC_SIZE: usize = 0xc000;
pub const UPDATE0_START: usize = 0x10400;
pub const UPDATE1_START: usize = 0x20400;
pub const UPDATE_SIZE: usize = 0x10000;

/* Fixed key material: the "provisioned" secrets of the simulated device. */
pub const DEVICE_UPDATE_PRIVATE: EccPrivateKey = [0x2a; 32];
pub const OEM_VALIDATION_PRIVATE: EccPrivateKey = [0x4c; 32];
pub const PU_VALIDATION_PRIVATE: EccPrivateKey = [0x5e; 32];
pub const IDENTITY_PRIVATE: EccPrivateKey = [0x63; 32];
pub const EPHEMERAL_PRIVATE: EccPrivateKey = [0x71; 32];

pub const WORLD_UUID: UuidBytes = [0x51; 16];
pub const WORLD_ITERATION: u16 = 3;
pub const DEVICE_UID: [u8; UNIQUE_ID_SIZE] = [0xd1; UNIQUE_ID_SIZE];
pub const PPD_CONTEXT_SEED: [u8; 4] = [0xc0, 0xff, 0xee, 0x42];

/// EUB payload key material; normally random per package.
pub const EUB_KEY: AesKey = [0x11; 16];
pub const EUB_IV: AesGcmIv = [0x22; 16];

/// The simulated board: records everything the SBM asks of it.
#[derive(Debug, Default)]
pub struct SimHal {
    pub reset_requested: Cell<bool>,
    pub launched_at: Cell<Option<usize>>,
    pub led_toggles: Cell<u32>,
    pub lockdown: Cell<u32>,
}

impl Hal for SimHal {
    fn device_unique_id(&self, id: &mut [u8; UNIQUE_ID_SIZE]) {
        *id = DEVICE_UID;
    }

    fn led_toggle(&self) {
        self.led_toggles.set(self.led_toggles.get() + 1);
    }

    fn reset(&self) {
        self.reset_requested.set(true);
    }

    fn lockdown_level(&self) -> u32 {
        self.lockdown.get()
    }

    fn raise_lockdown(&self) {
        self.lockdown.set(self.lockdown.get() + 1);
    }

    fn run_application(&self, start_address: usize) {
        self.launched_at.set(Some(start_address));
    }
}

/// OEM hooks that keep the stage trail for assertions.
#[derive(Debug, Default)]
pub struct RecordingOem {
    pub stages: RefCell<Vec<BootStage>>,
}

impl OemHooks for RecordingOem {
    fn boot_status(&self, stage: BootStage) {
        self.stages.borrow_mut().push(stage);
    }
}

fn tlv_node(out: &mut Vec<u8>, tag: u16, value: &[u8]) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn tlv_end(out: &mut Vec<u8>) {
    out.extend_from_slice(&TLV_END_MARKER.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
}

struct PdbSlot {
    sh_type: u16,
    usage: u16,
    payload: Vec<u8>,
    parent_id: u16,
    key_slot: u8,
}

/// Build a provisioned data block the way the provisioning tool would:
/// summary and details records, a device certificate with its identity
/// key, and the three SWUP-handling keys.
pub fn build_pdb() -> Vec<u8> {
    let mut slots = Vec::new();

    // Slot 0: provisioning summary.
    let mut summary = Vec::new();
    summary.extend_from_slice(&WORLD_UUID);
    summary.extend_from_slice(&WORLD_ITERATION.to_le_bytes());
    summary.extend_from_slice(&[0, 0]);
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_PROVISION_INFO | PROVISIONING_SUMMARY,
        usage: 0,
        payload: summary,
        parent_id: 0,
        key_slot: 0,
    });

    // Slot 1: provisioning details.
    let mut details = vec![0u8; PROVISIONING_DETAILS_SIZE];
    details[..17].copy_from_slice(b"51515151-iter-003");
    details[40..59].copy_from_slice(b"2026/07/01 12:00:00");
    details[60..68].copy_from_slice(b"prov-rig");
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_PROVISION_INFO | PROVISIONING_DETAILS,
        usage: 0,
        payload: details,
        parent_id: 0,
        key_slot: 0,
    });

    // Slot 2: device certificate, keyed from slot 3.
    let mut cert = Vec::new();
    tlv_node(&mut cert, TLV_X509_CERTIFICATE, b"test device certificate der bytes");
    tlv_end(&mut cert);
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_IDENTITY_CERT | CERT_LEVEL_DEVICE,
        usage: 0x0005,
        payload: cert,
        parent_id: 2,
        key_slot: 3,
    });

    // Slot 3: device identity key pair.
    let identity_public = ecdsa::public_key_of(&IDENTITY_PRIVATE).unwrap();
    let mut identity = Vec::new();
    tlv_node(&mut identity, TLV_IMMEDIATE_PUBLIC_KEY, &identity_public);
    tlv_node(&mut identity, TLV_IMMEDIATE_PRIVATE_KEY, &IDENTITY_PRIVATE);
    tlv_end(&mut identity);
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_IDENTITY_KEY
            | KEY_CATEGORY_PAIR
            | ECC_KEY_NIST_P256
            | ECC_KEY_CURVE_PURE_256_V1,
        usage: 0x0005,
        payload: identity,
        parent_id: 0,
        key_slot: 0,
    });

    // Slot 4: device update key pair (ECIES unwrap).
    let update_public = ecdsa::public_key_of(&DEVICE_UPDATE_PRIVATE).unwrap();
    let mut update = Vec::new();
    tlv_node(&mut update, TLV_IMMEDIATE_PUBLIC_KEY, &update_public);
    tlv_node(&mut update, TLV_IMMEDIATE_PRIVATE_KEY, &DEVICE_UPDATE_PRIVATE);
    tlv_end(&mut update);
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_UPDATE_KEY | KEY_CATEGORY_PAIR,
        usage: u16::from(KEY_PURPOSE_DEVICE_UPDATE),
        payload: update,
        parent_id: 0,
        key_slot: 0,
    });

    // Slot 5: OEM validation public key.
    let validation_public = ecdsa::public_key_of(&OEM_VALIDATION_PRIVATE).unwrap();
    let mut validation = Vec::new();
    tlv_node(&mut validation, TLV_IMMEDIATE_PUBLIC_KEY, &validation_public);
    tlv_end(&mut validation);
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_UPDATE_KEY | KEY_CATEGORY_PUBLIC,
        usage: u16::from(KEY_PURPOSE_OEM_VALIDATION),
        payload: validation,
        parent_id: 0,
        key_slot: 0,
    });

    // Slot 6: power-up validation public key.
    let pu_public = ecdsa::public_key_of(&PU_VALIDATION_PRIVATE).unwrap();
    let mut pu = Vec::new();
    tlv_node(&mut pu, TLV_IMMEDIATE_PUBLIC_KEY, &pu_public);
    tlv_end(&mut pu);
    slots.push(PdbSlot {
        sh_type: SLOT_PURPOSE_UPDATE_KEY | KEY_CATEGORY_PUBLIC,
        usage: u16::from(KEY_PURPOSE_PU_VALIDATION),
        payload: pu,
        parent_id: 0,
        key_slot: 0,
    });

    // Lay the block out: PSR, slot header table, payloads.
    let header_table = PSR_SIZE + slots.len() * SLOT_HEADER_SIZE;
    let mut payload_cursor = (header_table + 3) & !3;
    let mut buf = vec![0u8; 0x2000];

    for (index, slot) in slots.iter().enumerate() {
        let base = PSR_SIZE + index * SLOT_HEADER_SIZE;
        buf[base..base + 2].copy_from_slice(&slot.sh_type.to_le_bytes());
        buf[base + 2] = 0; // device index
        buf[base + 4..base + 8].copy_from_slice(&(payload_cursor as u32).to_le_bytes());
        buf[base + 8..base + 10].copy_from_slice(&(slot.payload.len() as u16).to_le_bytes());
        if slot_purpose(slot.sh_type) == SLOT_PURPOSE_IDENTITY_CERT {
            buf[base + 10..base + 12].copy_from_slice(&slot.usage.to_le_bytes());
            buf[base + 12..base + 14].copy_from_slice(&slot.parent_id.to_le_bytes());
            buf[base + 15] = slot.key_slot;
        } else {
            buf[base + 10..base + 12].copy_from_slice(&slot.usage.to_le_bytes());
        }
        buf[payload_cursor..payload_cursor + slot.payload.len()].copy_from_slice(&slot.payload);
        payload_cursor += (slot.payload.len() + 3) & !3;
    }

    let length = payload_cursor as u32;
    buf[0..2].copy_from_slice(&PSR_PRESENT.to_le_bytes());
    buf[4..20].copy_from_slice(&[0x77; PPD_SEED_SIZE]); // pd_pc_seed
    buf[52..56].copy_from_slice(&0u32.to_le_bytes()); // capability: plaintext
    buf[56..60].copy_from_slice(&length.to_le_bytes());
    buf[60..62].copy_from_slice(&(slots.len() as u16).to_le_bytes());
    buf[64..68].copy_from_slice(&(PSR_SIZE as u32).to_le_bytes());

    // Provisioned-data hash: seed, context random, device unique id, then
    // the PSR from the capability word to the end of the block.
    let hash = sha256_chunked([
        &buf[4..20],
        &PPD_CONTEXT_SEED[..],
        &DEVICE_UID[..],
        &buf[PSR_CAPABILITY_OFFSET..length as usize],
    ]);
    buf[20..52].copy_from_slice(&hash);

    buf.truncate(payload_cursor);
    buf
}

/// A built update package plus the figures tests want to poke at.
pub struct BuiltSwup {
    pub image: Vec<u8>,
    pub header_random: u32,
    pub epilogue_start: usize,
    pub first_eub_start: usize,
    pub payload_length: usize,
}

/// Build a complete, correctly signed and encrypted SWUP carrying one
/// module of `body_len` bytes.
pub fn build_swup(update_uuid: UuidBytes, version: u32, body_len: usize) -> BuiltSwup {
    build_swup_with(update_uuid, version, body_len, 0x0102_0304)
}

pub fn build_swup_with(
    update_uuid: UuidBytes,
    version: u32,
    body_len: usize,
    header_random: u32,
) -> BuiltSwup {
    assert_eq!(body_len % 4, 0);

    // The module: padded header, body, footer.
    let mut piem = vec![0u8; PIEM_HEADER_SIZE];
    let footer_offset = (PIEM_HEADER_SIZE + body_len) as u32;
    piem[0..4].copy_from_slice(&PIEM_EXPECTED_STATUS.to_le_bytes());
    piem[4..8].copy_from_slice(&footer_offset.to_le_bytes());
    piem[8..12].copy_from_slice(&header_random.to_le_bytes());
    piem[12] = 0; // field_presence
    piem[13] = 1; // num_signatures
    piem[14..16].copy_from_slice(&(PIEM_FOOTER_SIZE as u16).to_le_bytes());

    let body: Vec<u8> = (0..body_len).map(|i| (i as u8).wrapping_mul(13)).collect();
    piem.extend_from_slice(&body);

    let block_hash = sha256_chunked([&piem[..], &version.to_le_bytes()[..]]);
    let mut block_cs = checksum(0, &piem);
    block_cs = checksum(block_cs, &version.to_le_bytes());
    let mut block_sig = [0u8; 64];
    ecdsa::sign(&PU_VALIDATION_PRIVATE, &block_hash, &mut block_sig).unwrap();

    let mut footer = Vec::new();
    footer.extend_from_slice(&version.to_le_bytes());
    footer.extend_from_slice(&block_hash);
    footer.extend_from_slice(&block_sig);
    footer.extend_from_slice(&block_cs.to_le_bytes());
    footer.extend_from_slice(&[0, 0]); // pad
    footer.extend_from_slice(&header_random.to_le_bytes());
    assert_eq!(footer.len(), PIEM_FOOTER_SIZE);
    piem.extend_from_slice(&footer);

    // Encrypt the payload under the per-package EUB key.
    let mut payload = piem;
    let payload_length = payload.len();
    let eub_tag = aes_gcm::encrypt(&EUB_KEY, &EUB_IV, &[], &mut payload).unwrap();

    // The encryption record, signed then ECIES-wrapped to the device
    // update key.
    let mut seer = Vec::new();
    seer.extend_from_slice(&EUB_KEY);
    seer.extend_from_slice(&EUB_IV);
    seer.extend_from_slice(&eub_tag);
    let seer_hash = sha256(&seer);
    let mut seer_sig = [0u8; 64];
    ecdsa::sign(&OEM_VALIDATION_PRIVATE, &seer_hash, &mut seer_sig).unwrap();
    seer.extend_from_slice(&seer_sig);
    assert_eq!(seer.len(), EUB_ENCRYPTED_DETAILS_SIZE);

    let update_public = ecdsa::public_key_of(&DEVICE_UPDATE_PRIVATE).unwrap();
    let ephemeral_public = ecdsa::public_key_of(&EPHEMERAL_PRIVATE).unwrap();
    let mut encrypted_details = seer;
    let ecies_tag =
        ecies::encrypt(&EPHEMERAL_PRIVATE, &update_public, &[], &mut encrypted_details).unwrap();

    // Header optional elements: the AES-GCM header, then the terminator.
    let mut header_oes = Vec::new();
    let mut gcm_header = Vec::new();
    gcm_header.extend_from_slice(&ephemeral_public);
    gcm_header.extend_from_slice(&ecies_tag);
    tlv_node(&mut header_oes, OE_TAG_AES_GCM_HEADER, &gcm_header);
    header_oes.extend_from_slice(&TLV_END_MARKER.to_le_bytes());
    header_oes.extend_from_slice(&4u16.to_le_bytes());

    let oe_offset = swup_first_oe(0);
    let eub_clear_start = oe_offset + header_oes.len();

    // EUB clear details: fixed record, version element, terminator. The
    // terminator's value position is where the encrypted details begin.
    let eub_oe_len = 8 + 4;
    let encrypted_details_start = eub_clear_start + SWUP_EUB_CLEAR_SIZE + eub_oe_len;
    let epilogue_start = encrypted_details_start + EUB_ENCRYPTED_DETAILS_SIZE;
    let first_eub_start = epilogue_start + SWUP_EPILOGUE_SIZE;
    let total_length = first_eub_start + payload_length + SWUP_FOOTER_SIZE;

    let mut image = vec![0u8; total_length];

    image[0x00..0x04].copy_from_slice(&SWUP_HEADER_MAGIC.to_le_bytes());
    image[0x04..0x08].copy_from_slice(&SUPPORTED_LAYOUT_VERSION.to_le_bytes());
    let swup_caps: u32 = SWUP_CAP_ENC_MODE_ECIES_AES_GCM
        | SWUP_CAP_HEAD_FOOT_CIPHER
        | SWUP_CAP_SHA_256_ECDSA_P_256
        | (SUPPORTED_VERSION_SIZE << SWUP_CAP_VERSION_SIZE_SHIFT);
    image[0x08..0x0c].copy_from_slice(&swup_caps.to_le_bytes());
    let eub_caps: u32 = COMMON_CAP_ENC_MODE_AES_GCM_128
        | COMMON_CAP_FIXED_CIPHER_FIELDS
        | COMMON_CAP_SINGLE_PU_SIG
        | COMMON_CAP_SINGLE_PU_HASH;
    image[0x0c..0x10].copy_from_slice(&eub_caps.to_le_bytes());
    image[0x10..0x14].copy_from_slice(&(total_length as u32).to_le_bytes());
    image[0x14..0x16].copy_from_slice(&1u16.to_le_bytes());
    image[0x1c..0x1e].copy_from_slice(&(SWUP_FOOTER_SIZE as u16).to_le_bytes());
    image[0x20..0x22].copy_from_slice(&(eub_clear_start as u16).to_le_bytes());
    image[0x22..0x24].copy_from_slice(&(encrypted_details_start as u16).to_le_bytes());
    image[0x24..0x26].copy_from_slice(&(epilogue_start as u16).to_le_bytes());
    image[0x26..0x28].copy_from_slice(&(first_eub_start as u16).to_le_bytes());
    image[0x28..0x2c].copy_from_slice(&header_random.to_le_bytes());
    let update_public = ecdsa::public_key_of(&DEVICE_UPDATE_PRIVATE).unwrap();
    image[0x2c..0x6c].copy_from_slice(&update_public);
    image[0x6c..0x7c].copy_from_slice(&WORLD_UUID);
    image[0x7c..0x7e].copy_from_slice(&WORLD_ITERATION.to_le_bytes());
    image[0x7e..0x8e].copy_from_slice(&update_uuid);

    image[oe_offset..oe_offset + header_oes.len()].copy_from_slice(&header_oes);

    // EUB clear details.
    let cd = eub_clear_start;
    image[cd..cd + 2].copy_from_slice(&EUB_CONTENT_SW_UPDATE.to_le_bytes());
    image[cd + 2..cd + 4].copy_from_slice(&EUB_PARAM_MASTER_MODULE.to_le_bytes());
    image[cd + 4..cd + 8].copy_from_slice(&eub_caps.to_le_bytes());
    image[cd + 8..cd + 12].copy_from_slice(&(first_eub_start as u32).to_le_bytes());
    image[cd + 12..cd + 16].copy_from_slice(&(payload_length as u32).to_le_bytes());
    image[cd + 16..cd + 20].copy_from_slice(&SUPPORTED_HW_SKU.to_le_bytes());
    let payload_cs = checksum(0, &payload);
    image[cd + 20..cd + 22].copy_from_slice(&payload_cs.to_le_bytes());
    let payload_hash = sha256(&payload);
    image[cd + 24..cd + 56].copy_from_slice(&payload_hash);
    // Version element and terminator.
    let oe = cd + SWUP_EUB_CLEAR_SIZE;
    image[oe..oe + 2].copy_from_slice(&OE_TAG_VERSION_NUMBER.to_le_bytes());
    image[oe + 2..oe + 4].copy_from_slice(&4u16.to_le_bytes());
    image[oe + 4..oe + 8].copy_from_slice(&version.to_le_bytes());
    image[oe + 8..oe + 10].copy_from_slice(&TLV_END_MARKER.to_le_bytes());
    image[oe + 10..oe + 12].copy_from_slice(&4u16.to_le_bytes());

    image[encrypted_details_start..encrypted_details_start + EUB_ENCRYPTED_DETAILS_SIZE]
        .copy_from_slice(&encrypted_details);

    // Epilogue: checksum, hash and signature over everything before it.
    let (epilogue_cs, epilogue_hash) = {
        let covered = &image[..epilogue_start];
        (checksum(0, covered), sha256(covered))
    };
    let mut epilogue_sig = [0u8; 64];
    ecdsa::sign(&OEM_VALIDATION_PRIVATE, &epilogue_hash, &mut epilogue_sig).unwrap();
    image[epilogue_start..epilogue_start + 32].copy_from_slice(&epilogue_hash);
    image[epilogue_start + 32..epilogue_start + 96].copy_from_slice(&epilogue_sig);
    image[epilogue_start + 96..epilogue_start + 98].copy_from_slice(&epilogue_cs.to_le_bytes());

    image[first_eub_start..first_eub_start + payload_length].copy_from_slice(&payload);

    // Footer: transport integrity figures plus the matching random word.
    let footer_start = total_length - SWUP_FOOTER_SIZE;
    let (footer_cs, footer_hash) = {
        let covered = &image[..footer_start];
        (checksum(0, covered), sha256(covered))
    };
    image[footer_start..footer_start + 32].copy_from_slice(&footer_hash);
    image[footer_start + 96..footer_start + 98].copy_from_slice(&footer_cs.to_le_bytes());
    image[footer_start + 0x64..footer_start + 0x68].copy_from_slice(&header_random.to_le_bytes());

    BuiltSwup {
        image,
        header_random,
        epilogue_start,
        first_eub_start,
        payload_length,
    }
}

/// One simulated device with its memory map, permissions, persistent and
/// ephemeral state, all leaked to 'static so tests can wire an [`Sbm`] up
/// without lifetime gymnastics.
pub struct TestRig {
    pub map: &'static MemoryMap<'static>,
    pub hal: &'static SimHal,
    pub oem: &'static RecordingOem,
    pub perms: AppPermissions<'static>,
    pub policy: BootPolicy,
    persist: &'static mut SbmPersistent,
    work: &'static mut EphemeralBuffers,
    flash_base: usize,
}

impl TestRig {
    /// A rig with provisioning in place and the given images in the update
    /// slots.
    pub fn new(swups: &[&[u8]]) -> Self {
        assert!(swups.len() <= 2);

        let mut flash = vec![0xffu8; FLASH_SIZE];
        let pdb = build_pdb();
        flash[PD_OFFSET..PD_OFFSET + pdb.len()].copy_from_slice(&pdb);
        for (index, swup) in swups.iter().enumerate() {
            let start = if index == 0 { UPDATE0_START } else { UPDATE1_START };
            flash[start..start + swup.len()].copy_from_slice(swup);
        }

        let flash_base = flash.as_ptr() as usize;
        let device: &'static RamDevice<Vec<u8>> =
            Box::leak(Box::new(RamDevice::new(flash, PAGE_SIZE)));

        let devices: &'static [MemoryDeviceEntry<'static>] = Box::leak(Box::new([
            MemoryDeviceEntry {
                name: "soc-flash",
                removable: false,
                driver: device,
            },
        ]));
        let subregions: &'static [MemorySubregion] = Box::leak(Box::new([MemorySubregion {
            device: 0,
            start: 0,
            end: FLASH_SIZE - 1,
            erase_size: ERASE_SIZE,
            min_write_size: PAGE_SIZE,
            erase_value: 0xff,
        }]));
        let update_slots: &'static [MemorySlot] = Box::leak(Box::new([
            MemorySlot {
                name: "update0",
                id: 10,
                kind: SlotKind::Update,
                device: 0,
                start: UPDATE0_START,
                size: UPDATE_SIZE,
                prevent_erase: false,
            },
            MemorySlot {
                name: "update1",
                id: 11,
                kind: SlotKind::Update,
                device: 0,
                start: UPDATE1_START,
                size: UPDATE_SIZE,
                prevent_erase: false,
            },
        ]));

        let map: &'static MemoryMap<'static> = Box::leak(Box::new(MemoryMap {
            devices,
            subregions,
            sbm_slot: MemorySlot {
                name: "sbm",
                id: 0,
                kind: SlotKind::Sbm,
                device: 0,
                start: SBM_START,
                size: SBM_SIZE,
                prevent_erase: true,
            },
            app_status_slot: MemorySlot {
                name: "app_status",
                id: 1,
                kind: SlotKind::AppStatus,
                device: 0,
                start: APP_STATUS_START,
                size: ERASE_SIZE,
                prevent_erase: false,
            },
            exec_slot: MemorySlot {
                name: "exec",
                id: 2,
                kind: SlotKind::Exec,
                device: 0,
                start: EXEC_START,
                size: EXEC_SIZE,
                prevent_erase: false,
            },
            update_slots,
            pd_offset: PD_OFFSET,
        }));

        let persist: &'static mut SbmPersistent = Box::leak(Box::new(SbmPersistent::new()));
        let work: &'static mut EphemeralBuffers = Box::leak(Box::new(EphemeralBuffers::new()));

        // Reserved regions mirror the linked layout: the SBM code flash
        // (which contains the secure-API window), the app-status flash,
        // and the persistent RAM block actually backing this rig.
        let persist_addr = core::ptr::from_ref(&*persist) as usize;
        let reserved_rom: &'static [MemRegionDesc] = Box::leak(Box::new([
            MemRegionDesc::new(flash_base + SBM_START, flash_base + SBM_START + SBM_SIZE - 1),
            MemRegionDesc::new(
                flash_base + APP_STATUS_START,
                flash_base + APP_STATUS_START + ERASE_SIZE - 1,
            ),
        ]));
        let reserved_ram: &'static [MemRegionDesc] = Box::leak(Box::new([MemRegionDesc::new(
            persist_addr,
            persist_addr + core::mem::size_of::<SbmPersistent>() - 1,
        )]));

        let perms = AppPermissions {
            reserved_rom,
            reserved_ram,
            firewall: None,
        };

        let policy = BootPolicy {
            ppd_context_seed: PPD_CONTEXT_SEED,
            ..BootPolicy::default()
        };

        Self {
            map,
            hal: Box::leak(Box::new(SimHal::default())),
            oem: Box::leak(Box::new(RecordingOem::default())),
            perms,
            policy,
            persist,
            work,
            flash_base,
        }
    }

    /// An SBM instance over this rig; models one pass through reset (the
    /// persistent RAM block is not cleared).
    pub fn sbm(&mut self) -> Sbm<'_, SimHal, RecordingOem> {
        Sbm::new(
            self.map,
            self.hal,
            self.oem,
            self.perms,
            self.policy,
            &mut *self.persist,
            &mut *self.work,
        )
    }

    /// Clear boot-persistent state, as a reset would.
    pub fn reset_persistent(&mut self) {
        *self.persist = SbmPersistent::new();
    }

    /// Address of the persistent RAM block, for buffer-check probing.
    pub fn persist_addr(&self) -> usize {
        core::ptr::from_ref(&*self.persist) as usize
    }

    pub fn flash_base(&self) -> usize {
        self.flash_base
    }

    /// Read raw bytes out of a slot for assertions.
    pub fn slot_bytes(&self, slot: &MemorySlot, offset: usize, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.map.read(slot, offset, &mut buf).unwrap();
        buf
    }

    /// Patch raw bytes in an update slot (page-granular read-modify-write),
    /// used to corrupt packages after validation.
    pub fn patch_slot(&self, slot: &MemorySlot, offset: usize, patch: impl Fn(&mut u8)) {
        let page_start = offset - (offset % PAGE_SIZE);
        let mut page = self.slot_bytes(slot, page_start, PAGE_SIZE);
        patch(&mut page[offset % PAGE_SIZE]);
        self.map.program(slot, page_start, &page).unwrap();
    }
}

// Keep the selector-array bound honest against the rig's two slots.
const _: () = assert!(MAX_UPDATE_SLOTS >= 2);
