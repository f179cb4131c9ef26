// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! SWUP validation pipeline.
//!
//! Three phases, cheapest first so a bad package is rejected with minimal
//! boot-time cost: simple layout and identity checks, then the header
//! checksum/hash/signature, then the per-EUB payload integrity. Each phase
//! bails with a distinct error code.

use super::checksum::checksum_and_hash;
use super::read::SwupReader;
use super::tlv;
use super::{SwupError, SwupMetadata, SwupProbe, SwupStatus};
use crate::datastore::Datastore;
use crate::hal::Hal;
use crate::mem::MemorySlot;
use crate::oem::OemHooks;
use crate::Sbm;
use sbmdefs::{
    random_word_invalid, swup_first_oe, swup_update_status_records, uuid_bytes_valid, Hash,
    Signature, SwupLayout, UuidBytes, COMMON_CAP_ADV_ENC_OPTIONS_MASK,
    COMMON_CAP_CIPHER_LAYOUT_MASK, COMMON_CAP_ENC_MODE_AES_GCM_128, COMMON_CAP_ENC_MODE_MASK,
    COMMON_CAP_FIXED_CIPHER_FIELDS, COMMON_CAP_PU_MASK, COMMON_CAP_RESERVED,
    COMMON_CAP_SINGLE_PU_HASH, COMMON_CAP_SINGLE_PU_SIG, ECC_PUBLIC_KEY_SIZE,
    EUB_CONTENT_SW_UPDATE, EUB_PARAM_MASTER_MODULE, KEY_CATEGORY_PUBLIC,
    KEY_PURPOSE_OEM_VALIDATION, OE_TAG_AES_GCM_HEADER, OE_TAG_VERSION_NUMBER, PIEM_FOOTER_SIZE,
    PIEM_HEADER_SIZE, SHA256_SIZE, SUPPORTED_EUBS, SUPPORTED_FLASH_COUNTERS, SUPPORTED_HW_SKU,
    SUPPORTED_LAYOUT_VERSION, SUPPORTED_VERSION_SIZE, SWUP_CAP_CIPHER_LAYOUT_MASK,
    SWUP_CAP_CIPHER_SUITE_MASK, SWUP_CAP_ENC_MODE_ECIES_AES_GCM, SWUP_CAP_ENC_MODE_MASK,
    SWUP_CAP_HEAD_FOOT_CIPHER, SWUP_CAP_RESERVED, SWUP_CAP_SHA_256_ECDSA_P_256,
    SWUP_CAP_VERSION_SIZE_MASK, SWUP_CAP_VERSION_SIZE_SHIFT, SWUP_EPILOGUE_SIZE,
    SWUP_EUB_CLEAR_SIZE, SWUP_FOOTER_SIZE, SWUP_HEADER_MAGIC, SWUP_OFFSET_EUB_CLEAR_CAPABILITY_FLAGS,
    SWUP_OFFSET_EUB_CLEAR_CHECKSUM, SWUP_OFFSET_EUB_CLEAR_CONTENT, SWUP_OFFSET_EUB_CLEAR_HASH,
    SWUP_OFFSET_EUB_CLEAR_HW_SKU, SWUP_OFFSET_EUB_CLEAR_OPTIONAL_ELEMENTS,
    SWUP_OFFSET_EUB_CLEAR_PARAMETERS, SWUP_OFFSET_EUB_CLEAR_PAYLOAD_LENGTH,
    SWUP_OFFSET_EUB_CLEAR_PAYLOAD_START, SWUP_OFFSET_HEADER_EPILOGUE_CHECKSUM,
    SWUP_OFFSET_HEADER_EPILOGUE_HASH, SWUP_OFFSET_HEADER_EPILOGUE_SIGNATURE,
    SWUP_OFFSET_HEADER_EUB_CAPABILITY_FLAGS, SWUP_OFFSET_HEADER_EUB_CLEAR_START,
    SWUP_OFFSET_HEADER_FOOTER_LENGTH, SWUP_OFFSET_HEADER_LAYOUT_VERSION,
    SWUP_OFFSET_HEADER_LENGTH_OF_SWUP, SWUP_OFFSET_HEADER_NUM_EUBS,
    SWUP_OFFSET_HEADER_PREAMBLE_MAGIC, SWUP_OFFSET_HEADER_RANDOM,
    SWUP_OFFSET_HEADER_SECURITY_WORLD_ITERATION, SWUP_OFFSET_HEADER_SECURITY_WORLD_UUID,
    SWUP_OFFSET_HEADER_SWUP_CAPABILITY_FLAGS, SWUP_OFFSET_HEADER_UPDATE_KEY,
    SWUP_OFFSET_HEADER_UPDATE_UUID, SWUP_OFFSET_FOOTER_RANDOM, TLV_END_MARKER,
};
use zerocopy::FromBytes;

pub(super) enum SimpleOutcome {
    /// The package is fresh; carry the metadata and the matched update-key
    /// instance forward.
    Fresh(SwupMetadata, u8),
    /// The package's UUID matches the installed image.
    InstalledPrevious,
}

/// Check that the SWUP's update key matches one of the provisioned
/// device-update keys, yielding the matching instance.
pub(super) fn update_key_instance(
    ds: &Datastore<'_>,
    update_key: &[u8; ECC_PUBLIC_KEY_SIZE],
) -> Option<u8> {
    for instance in 0..u8::MAX {
        let slot = ds.find_update_key_slot(instance, KEY_CATEGORY_PUBLIC).ok()?;
        let public = ds.public_key(slot).ok()?;
        if &public == update_key {
            return Some(instance);
        }
    }
    // There is not enough room in the data store for this many update
    // keys; treat it as exhausted.
    None
}

/// Phase A: computationally cheap sanity checks, run first to minimise
/// the cost of rejecting a bad package at boot.
pub(super) fn simple_checks(
    ds: &Datastore<'_>,
    installed_uuid: &UuidBytes,
    reader: &mut SwupReader<'_>,
) -> Result<SimpleOutcome, SwupError> {
    let magic = reader.read_u32(SWUP_OFFSET_HEADER_PREAMBLE_MAGIC);
    if magic != SWUP_HEADER_MAGIC {
        log::error!("header magic {magic:#x} expected {SWUP_HEADER_MAGIC:#x}");
        return Err(SwupError::BadMagic);
    }

    let layout_version = reader.read_u32(SWUP_OFFSET_HEADER_LAYOUT_VERSION);
    if layout_version != SUPPORTED_LAYOUT_VERSION {
        log::error!("layout version {layout_version:#x} expected {SUPPORTED_LAYOUT_VERSION:#x}");
        return Err(SwupError::BadLayout);
    }

    // Test the SWUP capability flags against whatever this SBM can do.
    let swup_caps = reader.read_u32(SWUP_OFFSET_HEADER_SWUP_CAPABILITY_FLAGS);
    if swup_caps & SWUP_CAP_ENC_MODE_MASK != SWUP_CAP_ENC_MODE_ECIES_AES_GCM {
        log::error!("invalid encryption mode {:#x}", swup_caps & SWUP_CAP_ENC_MODE_MASK);
        return Err(SwupError::BadSwupEncMode);
    }
    if swup_caps & SWUP_CAP_CIPHER_LAYOUT_MASK != SWUP_CAP_HEAD_FOOT_CIPHER {
        log::error!("invalid cipher layout {:#x}", swup_caps & SWUP_CAP_CIPHER_LAYOUT_MASK);
        return Err(SwupError::BadSwupCipherLayout);
    }
    if swup_caps & SWUP_CAP_CIPHER_SUITE_MASK != SWUP_CAP_SHA_256_ECDSA_P_256 {
        log::error!("invalid cipher suite {:#x}", swup_caps & SWUP_CAP_CIPHER_SUITE_MASK);
        return Err(SwupError::BadCipherSuite);
    }
    let update_records = swup_update_status_records(swup_caps);
    if update_records != 0 && update_records != SUPPORTED_FLASH_COUNTERS {
        log::error!("invalid number of update status records {update_records:#x}");
        return Err(SwupError::BadCounters);
    }
    let swup_oe_offset = swup_first_oe(update_records);
    if (swup_caps & SWUP_CAP_VERSION_SIZE_MASK) >> SWUP_CAP_VERSION_SIZE_SHIFT
        != SUPPORTED_VERSION_SIZE
    {
        log::error!(
            "invalid version size {:#x}",
            (swup_caps & SWUP_CAP_VERSION_SIZE_MASK) >> SWUP_CAP_VERSION_SIZE_SHIFT
        );
        return Err(SwupError::BadVersion);
    }
    if swup_caps & SWUP_CAP_RESERVED != 0 {
        log::error!("reserved capability bits set {swup_caps:#x}");
        return Err(SwupError::BadReservedCaps);
    }

    // Same discipline for the EUB capability flags.
    let eub_caps = reader.read_u32(SWUP_OFFSET_HEADER_EUB_CAPABILITY_FLAGS);
    if eub_caps & COMMON_CAP_ENC_MODE_MASK != COMMON_CAP_ENC_MODE_AES_GCM_128 {
        log::error!("invalid EUB encryption mode {:#x}", eub_caps & COMMON_CAP_ENC_MODE_MASK);
        return Err(SwupError::BadEubEncMode);
    }
    if eub_caps & COMMON_CAP_ADV_ENC_OPTIONS_MASK != 0 {
        log::error!(
            "invalid EUB advanced encryption options {:#x}",
            eub_caps & COMMON_CAP_ADV_ENC_OPTIONS_MASK
        );
        return Err(SwupError::BadEncOptions);
    }
    if eub_caps & COMMON_CAP_CIPHER_LAYOUT_MASK != COMMON_CAP_FIXED_CIPHER_FIELDS {
        log::error!("invalid cipher fields {:#x}", eub_caps & COMMON_CAP_CIPHER_LAYOUT_MASK);
        return Err(SwupError::BadEubCipherLayout);
    }
    if eub_caps & COMMON_CAP_PU_MASK != COMMON_CAP_SINGLE_PU_SIG | COMMON_CAP_SINGLE_PU_HASH {
        log::error!("invalid pre-launch flags {:#x}", eub_caps & COMMON_CAP_PU_MASK);
        return Err(SwupError::BadSwupEubPu);
    }
    if eub_caps & COMMON_CAP_RESERVED != 0 {
        log::error!("reserved EUB capability bits set {eub_caps:#x}");
        return Err(SwupError::BadCommonReservedCaps);
    }

    // There must be at least one EUB and no more than we support.
    let num_eubs = reader.read_u16(SWUP_OFFSET_HEADER_NUM_EUBS);
    if !(1..=SUPPORTED_EUBS).contains(&num_eubs) {
        log::error!("invalid number of EUBs {num_eubs:#x}");
        return Err(SwupError::BadEubs);
    }

    // Police the length field; the minimum is deducible from the layout.
    let total_length = reader.read_u32(SWUP_OFFSET_HEADER_LENGTH_OF_SWUP);
    let min_length = (swup_oe_offset
        + usize::from(num_eubs) * SWUP_EUB_CLEAR_SIZE
        + SWUP_EPILOGUE_SIZE
        + SWUP_FOOTER_SIZE) as u32;
    if total_length < min_length
        || total_length as usize > reader.slot().size
        || total_length % 4 != 0
    {
        log::error!(
            "length too short, larger than the update slot or not a multiple of 4: {total_length:#x}"
        );
        return Err(SwupError::BadLength);
    }

    // With a reasonable length in hand, bound every subsequent read to the
    // SWUP image.
    reader.set_max_offset(total_length as usize);

    let footer_length = reader.read_u16(SWUP_OFFSET_HEADER_FOOTER_LENGTH);
    if usize::from(footer_length) != SWUP_FOOTER_SIZE {
        log::error!("footer length invalid {footer_length:#x}");
        return Err(SwupError::BadFooterLen);
    }
    let length_of_swup = total_length - u32::from(footer_length);

    let mut layout_bytes = [0u8; 8];
    reader.read(SWUP_OFFSET_HEADER_EUB_CLEAR_START, &mut layout_bytes);
    let layout = SwupLayout::read_from_bytes(&layout_bytes).unwrap();
    let epilogue_span = usize::from(layout.first_eub_start.get())
        .checked_sub(usize::from(layout.epilogue_start.get()));
    if epilogue_span != Some(SWUP_EPILOGUE_SIZE) {
        log::error!(
            "epilogue length apparently invalid: first EUB {:#x} epilogue {:#x}",
            layout.first_eub_start.get(),
            layout.epilogue_start.get()
        );
        return Err(SwupError::BadEpilogueLen);
    }

    // Police the identity.
    let header_random = reader.read_u32(SWUP_OFFSET_HEADER_RANDOM);
    if random_word_invalid(header_random) {
        log::error!("header random invalid {header_random:#x}");
        return Err(SwupError::BadHeaderRandom);
    }
    let footer_random =
        reader.read_u32(length_of_swup as usize + SWUP_OFFSET_FOOTER_RANDOM);
    if random_word_invalid(footer_random) {
        log::error!("footer random invalid {footer_random:#x}");
        return Err(SwupError::BadFooterRandom);
    }
    if header_random != footer_random {
        log::error!(
            "header/footer random mismatch: header {header_random:#x} footer {footer_random:#x}"
        );
        return Err(SwupError::BadRandom);
    }

    if layout.eub_clear_details_start.get() % 4 != 0 {
        return Err(SwupError::BadCdAlignment);
    }
    if layout.eub_encrypted_details_start.get() % 4 != 0 {
        return Err(SwupError::BadEdAlignment);
    }
    if layout.epilogue_start.get() % 4 != 0 {
        return Err(SwupError::BadEpilogueAlignment);
    }
    if layout.first_eub_start.get() % 4 != 0 {
        return Err(SwupError::BadEubAlignment);
    }

    // Police the update UUID. If it matches the installed image then this
    // SWUP must have been installed on a previous boot; no further work.
    let update_uuid = reader.read_uuid(SWUP_OFFSET_HEADER_UPDATE_UUID);
    if !uuid_bytes_valid(&update_uuid) {
        log::error!("invalid update UUID");
        return Err(SwupError::BadStatus);
    }
    if &update_uuid == installed_uuid {
        log::info!("previously installed update found");
        return Ok(SimpleOutcome::InstalledPrevious);
    }

    // The package must come from the same security world as our
    // provisioned data.
    let summary = ds.provisioning_summary().ok_or(SwupError::BadSecurityId)?;
    let world_uuid = reader.read_uuid(SWUP_OFFSET_HEADER_SECURITY_WORLD_UUID);
    if world_uuid != summary.context_uuid {
        log::error!("security ID mismatch");
        return Err(SwupError::BadSecurityId);
    }
    let iteration = reader.read_u16(SWUP_OFFSET_HEADER_SECURITY_WORLD_ITERATION);
    if iteration != summary.iteration.get() {
        log::error!("security iteration mismatch {iteration:#x}");
        return Err(SwupError::BadSecurityIteration);
    }

    // The update key must be one of the provisioned device-update keys.
    let mut update_key = [0u8; ECC_PUBLIC_KEY_SIZE];
    reader.read(SWUP_OFFSET_HEADER_UPDATE_KEY, &mut update_key);
    let key_instance =
        update_key_instance(ds, &update_key).ok_or(SwupError::BadUpdateKey)?;

    // Encrypted EUBs require the AES-GCM header in the optional elements
    // and a populated encrypted-details object.
    let oe_size = usize::from(layout.eub_clear_details_start.get())
        .checked_sub(swup_oe_offset)
        .ok_or(SwupError::BadAesGcm)?;
    if tlv::find_node(reader, swup_oe_offset, oe_size, OE_TAG_AES_GCM_HEADER).is_none() {
        log::error!("has no AES-GCM header");
        return Err(SwupError::BadAesGcm);
    }
    if layout.eub_encrypted_details_start.get() == 0 {
        log::error!("encrypted details start is zero");
        return Err(SwupError::EncryptionConfigInconsistent);
    }

    let metadata = SwupMetadata {
        layout,
        eub_capability_flags: eub_caps,
        num_eubs,
        length_of_swup,
    };
    Ok(SimpleOutcome::Fresh(metadata, key_instance))
}

/// Phase B: checksum, hash, and signature over the whole SWUP header.
pub(super) fn check_header(
    ds: &Datastore<'_>,
    reader: &SwupReader<'_>,
    md: &SwupMetadata,
) -> Result<(), SwupError> {
    let epilogue_start = usize::from(md.layout.epilogue_start.get());

    let (calc_sum, calc_hash) =
        checksum_and_hash(reader.mem(), reader.slot(), 0, epilogue_start)
            .map_err(|_| SwupError::FailedHeaderHash)?;

    let stored_sum = reader.read_u16(epilogue_start + SWUP_OFFSET_HEADER_EPILOGUE_CHECKSUM);
    if calc_sum != stored_sum {
        log::error!("header checksum calculated {calc_sum:#x} expected {stored_sum:#x}");
        return Err(SwupError::BadHeaderChecksum);
    }

    let mut stored_hash: Hash = [0; SHA256_SIZE];
    reader.read(epilogue_start + SWUP_OFFSET_HEADER_EPILOGUE_HASH, &mut stored_hash);
    if stored_hash != calc_hash {
        log::error!("header hash mismatch");
        return Err(SwupError::BadHeaderHash);
    }

    let mut signature: Signature = [0; 64];
    reader.read(
        epilogue_start + SWUP_OFFSET_HEADER_EPILOGUE_SIGNATURE,
        &mut signature,
    );
    let osvks = ds
        .swup_key_slot(KEY_PURPOSE_OEM_VALIDATION)
        .map_err(|_| SwupError::BadValidationKey)?;
    ds.verify(osvks, &calc_hash, &signature).map_err(|err| {
        log::error!("header signature verification failed: {}", err.code());
        SwupError::BadHeaderSignature
    })?;

    // The footer hash and signature only protect the package in
    // transport; validating them here is deliberately left out.

    Ok(())
}

/// Phase C: validate each EUB clear-details record and its payload.
pub(super) fn check_clear_eubs(
    reader: &SwupReader<'_>,
    md: &SwupMetadata,
    exec_slot_size: usize,
) -> Result<(), SwupError> {
    let mut eub_clear_next = usize::from(md.layout.eub_clear_details_start.get());

    // The first EUB's payload must agree with where the header says it is.
    let declared_start =
        reader.read_u32(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_PAYLOAD_START);
    if u32::from(md.layout.first_eub_start.get()) != declared_start {
        log::error!(
            "header says EUB at {:#x}, EUB details says {declared_start:#x}",
            md.layout.first_eub_start.get()
        );
        return Err(SwupError::BadEubStart);
    }

    for eub_idx in 0..usize::from(md.num_eubs) {
        // Software update for the master module is the only content
        // supported at this layout revision.
        let content = reader.read_u16(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_CONTENT);
        if content != EUB_CONTENT_SW_UPDATE {
            log::error!("EUB CD {eub_idx} content {content:#x}");
            return Err(SwupError::BadEubContent);
        }
        let parameters = reader.read_u16(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_PARAMETERS);
        if parameters != EUB_PARAM_MASTER_MODULE {
            log::error!("EUB CD {eub_idx} parameters {parameters:#x}");
            return Err(SwupError::BadEubParameters);
        }

        let caps = reader.read_u32(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_CAPABILITY_FLAGS);
        if caps & COMMON_CAP_ENC_MODE_MASK != COMMON_CAP_ENC_MODE_AES_GCM_128 {
            log::error!("EUB CD {eub_idx} invalid encryption mode {:#x}", caps);
            return Err(SwupError::BadEubCdCap);
        }
        if caps & COMMON_CAP_ADV_ENC_OPTIONS_MASK != 0 {
            log::error!("EUB CD {eub_idx} invalid advanced encryption options {caps:#x}");
            return Err(SwupError::BadEubCdCap);
        }
        if caps & COMMON_CAP_CIPHER_LAYOUT_MASK != COMMON_CAP_FIXED_CIPHER_FIELDS {
            log::error!("EUB CD {eub_idx} invalid cipher fields {caps:#x}");
            return Err(SwupError::BadEubCdCap);
        }
        if caps & COMMON_CAP_PU_MASK != COMMON_CAP_SINGLE_PU_SIG | COMMON_CAP_SINGLE_PU_HASH {
            log::error!("EUB CD {eub_idx} invalid pre-launch flags {caps:#x}");
            return Err(SwupError::BadEubCdPu);
        }
        if caps & COMMON_CAP_RESERVED != 0 {
            log::error!("EUB CD {eub_idx} reserved capability bits {caps:#x}");
            return Err(SwupError::BadEubReserved);
        }
        // The EUB must not need anything the SWUP header did not declare.
        if md.eub_capability_flags & caps != caps {
            log::error!(
                "EUB CD {eub_idx} capability_flags {caps:#x} but SWUP header says {:#x}",
                md.eub_capability_flags
            );
            return Err(SwupError::BadSwupEubCap);
        }

        let hw_sku = reader.read_u32(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_HW_SKU);
        if hw_sku != SUPPORTED_HW_SKU {
            log::error!("EUB CD {eub_idx} bogus hw_sku {hw_sku:#x}");
            return Err(SwupError::BadSku);
        }

        let payload_start =
            reader.read_u32(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_PAYLOAD_START) as usize;
        if payload_start < usize::from(md.layout.first_eub_start.get())
            || payload_start >= md.length_of_swup as usize
            || payload_start % 4 != 0
        {
            log::error!("EUB CD {eub_idx} bogus payload_start {payload_start:#x}");
            return Err(SwupError::BadEubPayload);
        }

        // The payload must hold a module header and footer, and must fit
        // the executable slot once the header is peeled off.
        let payload_length =
            reader.read_u32(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_PAYLOAD_LENGTH) as usize;
        if payload_length < PIEM_HEADER_SIZE + PIEM_FOOTER_SIZE
            || payload_length - PIEM_HEADER_SIZE > exec_slot_size
            || payload_length % 4 != 0
        {
            log::error!("EUB CD {eub_idx} bogus payload_length {payload_length:#x}");
            return Err(SwupError::BadEubPayloadLen);
        }

        let (calc_sum, calc_hash) =
            checksum_and_hash(reader.mem(), reader.slot(), payload_start, payload_length)
                .map_err(|_| SwupError::FailedEubHash)?;

        let stored_sum = reader.read_u16(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_CHECKSUM);
        if calc_sum != stored_sum {
            log::error!(
                "EUB CD {eub_idx} checksum calculated {calc_sum:#x} expected {stored_sum:#x}"
            );
            return Err(SwupError::BadEubChecksum);
        }
        let mut stored_hash: Hash = [0; SHA256_SIZE];
        reader.read(eub_clear_next + SWUP_OFFSET_EUB_CLEAR_HASH, &mut stored_hash);
        if stored_hash != calc_hash {
            log::error!("EUB CD {eub_idx} hash mismatch");
            return Err(SwupError::BadEubHash);
        }

        // The optional elements must be intact: without the terminator we
        // cannot find any subsequent EUB details. An installable module
        // also has to carry its version number here.
        let oe_start = eub_clear_next + SWUP_OFFSET_EUB_CLEAR_OPTIONAL_ELEMENTS;
        if oe_start % 4 != 0 {
            log::error!("EUB CD {eub_idx} optional elements misaligned {oe_start:#x}");
            return Err(SwupError::BadOeAlignment);
        }
        let (version_offset, version_len) =
            tlv::find_node(reader, oe_start, 0, OE_TAG_VERSION_NUMBER)
                .ok_or(SwupError::MissingEubVersion)?;
        if usize::from(version_len) != core::mem::size_of::<u32>() {
            log::error!("EUB CD {eub_idx} version number has wrong size {version_len:#x}");
            return Err(SwupError::BadEubVersionSize);
        }
        let version = reader.read_u32(version_offset);
        if version & 0xff00_0000 != SUPPORTED_VERSION_SIZE << 24 {
            log::error!("EUB CD {eub_idx} has malformed version number {version:#x}");
            return Err(SwupError::MalformedEubVersion);
        }

        // Advance to the next record via the end marker.
        let (next, _) = tlv::find_node(reader, version_offset + 4, 0, TLV_END_MARKER)
            .ok_or(SwupError::EubMissingEndMarker)?;
        eub_clear_next = next;
    }

    // The walk must land exactly on the encrypted details (or the
    // epilogue if the package were clear).
    let expected_end = if md.layout.eub_encrypted_details_start.get() != 0 {
        usize::from(md.layout.eub_encrypted_details_start.get())
    } else {
        usize::from(md.layout.epilogue_start.get())
    };
    if eub_clear_next != expected_end {
        log::error!(
            "end of EUB clear details at {eub_clear_next:#x} but should be at {expected_end:#x}"
        );
        return Err(SwupError::BadEubEnd);
    }

    Ok(())
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Decide whether an update slot holds an installable SWUP. Idempotent
    /// and safe to call both at boot and from the secure API.
    pub fn update_slot_contains_swup(&mut self, update_slot: &MemorySlot) -> SwupProbe {
        log::info!(
            "looking for an application image in update slot \"{}\"",
            update_slot.name
        );

        let mem = self.mem;
        let error_probe = |status: SwupStatus| SwupProbe {
            status,
            max_offset: update_slot.size.saturating_sub(1),
            key_instance: 0,
        };

        if !mem.device_present(update_slot) {
            log::info!(
                "the device containing update slot \"{}\" is not connected",
                update_slot.name
            );
            return error_probe(SwupStatus::Error);
        }

        if self.read_iavvcs().is_err() {
            return error_probe(SwupStatus::ErrorCode(SwupError::MuhReadError));
        }
        let (_, exec_info) = self.cached_iavvcs();
        let installed_uuid = exec_info.installed_uuid;

        let Ok(ds) = self.datastore() else {
            return error_probe(SwupStatus::Error);
        };

        let mut reader = SwupReader::new(mem, update_slot);
        let (md, key_instance) = match simple_checks(&ds, &installed_uuid, &mut reader) {
            Ok(SimpleOutcome::Fresh(md, key_instance)) => (md, key_instance),
            Ok(SimpleOutcome::InstalledPrevious) => {
                return SwupProbe {
                    status: SwupStatus::InstalledPrevious,
                    max_offset: reader.max_offset(),
                    key_instance: 0,
                };
            }
            Err(err) => return error_probe(SwupStatus::ErrorCode(err)),
        };

        if let Err(err) = check_header(&ds, &reader, &md) {
            return error_probe(SwupStatus::ErrorCode(err));
        }
        if let Err(err) = check_clear_eubs(&reader, &md, mem.exec_slot.size) {
            return error_probe(SwupStatus::ErrorCode(err));
        }

        SwupProbe {
            status: SwupStatus::Initial,
            max_offset: reader.max_offset(),
            key_instance,
        }
    }
}
