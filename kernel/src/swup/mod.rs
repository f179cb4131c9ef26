// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Software update package handling.
//!
//! A SWUP sitting in an update slot goes through a three-phase validation
//! pipeline (cheap layout checks, header integrity, per-EUB payload
//! integrity) before the installer will touch it. Validation is idempotent
//! and is invoked both at boot and from the secure API.

mod checksum;
mod install;
mod queue;
mod read;
mod tlv;
mod validate;

pub use checksum::checksum_and_hash;
pub use install::InstallStatus;
pub use queue::SwupSelectorData;
pub use read::SwupReader;

use crate::error::MemError;
use crate::hal::Hal;
use crate::mem::MemorySlot;
use crate::oem::OemHooks;
use crate::{Sbm, VersionPolicy};
use sbmdefs::{
    AppInfoRecord, PiemFooter, PiemHeader, SbmExecInfo, SwupLayout, UuidBytes,
    OE_TAG_VERSION_NUMBER, PIEM_EXEC_INFO_OFFSET, PIEM_HEADER_SIZE,
    SWUP_OFFSET_EUB_CLEAR_OPTIONAL_ELEMENTS, SWUP_OFFSET_HEADER_EUB_CLEAR_START,
};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::FromBytes;

/// Status of a candidate (or previously handled) update, as reported
/// through `getUpdateInfo`. The numeric codes are ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwupStatus {
    /// Unprocessed and installable.
    Initial,
    /// Invalid, reason collapsed.
    Error,
    /// Installed during the current boot.
    InstalledThisBoot,
    /// Installed during a previous boot.
    InstalledPrevious,
    /// Refused because of version rollback.
    ErrorRollback,
    /// Invalid, with the exact reason.
    ErrorCode(SwupError),
}

impl SwupStatus {
    /// The stable numeric status code.
    pub fn code(self) -> u32 {
        match self {
            Self::Initial => 0,
            Self::Error => 1,
            Self::InstalledThisBoot => 2,
            Self::InstalledPrevious => 3,
            Self::ErrorRollback => 4,
            Self::ErrorCode(err) => {
                if cfg!(feature = "extended-errors") {
                    err as u32
                } else {
                    1
                }
            }
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::ErrorRollback | Self::ErrorCode(_))
    }
}

/// The extended validation error taxonomy. Discriminants continue the
/// status numbering and are ABI when extended errors are enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum SwupError {
    BadAesGcm = 5,
    BadCdAlignment = 6,
    BadCipherSuite = 7,
    BadCommonReservedCaps = 8,
    BadCounters = 9,
    BadEdAlignment = 10,
    BadEncOptions = 11,
    BadEpilogueAlignment = 12,
    BadEpilogueLen = 13,
    BadEubAlignment = 14,
    BadEubCdCap = 15,
    BadEubCdPu = 16,
    BadEubChecksum = 17,
    BadEubCipherLayout = 18,
    BadEubContent = 19,
    BadEubEncMode = 20,
    BadEubEnd = 21,
    BadEubHash = 22,
    BadEubParameters = 23,
    BadEubPayload = 24,
    BadEubPayloadLen = 25,
    BadEubReserved = 26,
    BadEubStart = 27,
    BadEubVersionSize = 28,
    BadEubs = 29,
    BadFooterChecksum = 30,
    BadFooterHash = 31,
    BadFooterLen = 32,
    BadFooterRandom = 33,
    BadFooterSignature = 34,
    BadHeaderChecksum = 35,
    BadHeaderHash = 36,
    BadHeaderRandom = 37,
    BadHeaderSignature = 38,
    BadLayout = 39,
    BadLength = 40,
    BadMagic = 41,
    BadOeAlignment = 42,
    BadRandom = 43,
    BadReservedCaps = 44,
    BadSecurityId = 45,
    BadSecurityIteration = 46,
    BadSku = 47,
    BadStatus = 48,
    BadSwupCipherLayout = 49,
    BadSwupEncMode = 50,
    BadSwupEubCap = 51,
    BadSwupEubPu = 52,
    BadTransportationKey = 53,
    BadUpdateKey = 54,
    BadValidationKey = 55,
    BadVersion = 56,
    FailedEubHash = 57,
    FailedFooterHash = 58,
    FailedHeaderHash = 59,
    FailedStatus = 60,
    FailedUpdateKey = 61,
    MalformedEubVersion = 62,
    MissingEubVersion = 63,
    MissingUpdateKey = 64,
    EncryptionConfigInconsistent = 65,
    EubMissingEndMarker = 66,
    MuhReadError = 67,
}

/// Offsets and figures extracted from a SWUP header during the cheap
/// checks, used to deep-dive the objects once basic sanity is confirmed.
#[derive(Clone, Copy, Debug)]
pub struct SwupMetadata {
    pub layout: SwupLayout,
    pub eub_capability_flags: u32,
    pub num_eubs: u16,
    /// Length of the SWUP minus its footer.
    pub length_of_swup: u32,
}

/// Everything the boot orchestrator needs to know about one update slot.
#[derive(Clone, Copy, Debug)]
pub struct SwupProbe {
    pub status: SwupStatus,
    /// Bound for all subsequent reads of this SWUP.
    pub max_offset: usize,
    /// Instance of the provisioned device-update key matching the package.
    pub key_instance: u8,
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Load the installed-module header slot into the persistent cache.
    pub(crate) fn read_iavvcs(&mut self) -> Result<(), MemError> {
        if self.persist.muh_cached {
            return Ok(());
        }
        let mut buf = [0u8; PIEM_HEADER_SIZE];
        self.mem.read(&self.mem.app_status_slot, 0, &mut buf)?;
        self.persist.cached_muh = buf;
        self.persist.muh_cached = true;
        Ok(())
    }

    /// Typed views over the cached IAVVCS.
    pub(crate) fn cached_iavvcs(&self) -> (PiemHeader, SbmExecInfo) {
        let header = PiemHeader::read_from_prefix(&self.persist.cached_muh[..])
            .map(|(header, _)| header)
            .unwrap_or_default();
        let exec_info = SbmExecInfo::read_from_prefix(&self.persist.cached_muh[PIEM_EXEC_INFO_OFFSET..])
            .map(|(info, _)| info)
            .unwrap_or_else(|_| SbmExecInfo {
                installed_uuid: [0xff; 16],
                capability_indicator: 0.into(),
                capability_flags: 0.into(),
                installed_muf: PiemFooter::read_from_bytes(&[0xffu8; 108]).unwrap(),
            });
        (header, exec_info)
    }

    /// Version number of the installed module, from the footer copy in the
    /// IAVVCS.
    pub fn piem_version(&mut self) -> u32 {
        if self.read_iavvcs().is_err() {
            return 0;
        }
        let (_, exec_info) = self.cached_iavvcs();
        exec_info.installed_muf.version_number.get()
    }

    /// Version number declared by the first EUB of the SWUP in an update
    /// slot, or zero if it cannot be located.
    pub fn eub_version(&self, update_slot: &MemorySlot) -> u32 {
        let reader = SwupReader::new(self.mem, update_slot);
        let max_offset = reader.max_offset();

        let eub_clear_start = usize::from(reader.read_u16(SWUP_OFFSET_HEADER_EUB_CLEAR_START));
        if eub_clear_start >= max_offset {
            return 0;
        }

        let Some((value_offset, value_len)) = tlv::find_node(
            &reader,
            eub_clear_start + SWUP_OFFSET_EUB_CLEAR_OPTIONAL_ELEMENTS,
            0,
            OE_TAG_VERSION_NUMBER,
        ) else {
            return 0;
        };
        if usize::from(value_len) != core::mem::size_of::<u32>() {
            return 0;
        }
        reader.read_u32(value_offset)
    }

    /// Whether installing the SWUP in `update_slot` would be a version
    /// rollback under the configured policy.
    pub fn update_version_rollback(&mut self, update_slot: &MemorySlot) -> bool {
        let update = self.eub_version(update_slot);
        let current = self.piem_version();
        match self.policy.version_policy {
            VersionPolicy::None => false,
            VersionPolicy::GreaterEqual => update < current,
            VersionPolicy::Greater => update <= current,
        }
    }

    /// Whether the SWUP in `update_slot` could be installed right now:
    /// valid, fresh, and not a rollback. Used by the secure API.
    pub fn can_install_update(&mut self, update_slot: &MemorySlot) -> bool {
        let probe = self.update_slot_contains_swup(update_slot);
        if probe.status != SwupStatus::Initial {
            return false;
        }

        // The exec slot needs no validity check here: we only run on
        // behalf of an application that was verified before launch.
        !self.update_version_rollback(update_slot)
    }

    /// Record the status collected by `getUpdateInfo`.
    pub fn set_last_status(&mut self, status: SwupStatus) {
        self.persist.last_status = status;
    }

    pub fn last_status(&self) -> SwupStatus {
        self.persist.last_status
    }

    /// UUID of the installed image, from the IAVVCS.
    pub fn last_installed_uuid(&mut self) -> UuidBytes {
        if self.read_iavvcs().is_err() {
            return [0xff; 16];
        }
        let (_, exec_info) = self.cached_iavvcs();
        exec_info.installed_uuid
    }

    /// Describe the installed application for the secure API.
    pub fn executable_module_info(&mut self) -> Option<AppInfoRecord> {
        if self.read_iavvcs().is_err() {
            return None;
        }
        let (header, exec_info) = self.cached_iavvcs();
        let footer_offset = header.footer_offset.get() as usize;
        if footer_offset < PIEM_HEADER_SIZE {
            return None;
        }

        let start = self.mem.exec_slot.start as u32;
        Some(AppInfoRecord {
            app_type: U32::new(0),
            installed: U32::new(1),
            start_addr: U32::new(start),
            end_addr: U32::new(start + (footer_offset - PIEM_HEADER_SIZE) as u32 - 1),
            app_version: exec_info.installed_muf.version_number,
        })
    }
}
