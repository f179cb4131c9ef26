// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Parser for the Provisioned Data Block.
//!
//! [`Pdb::read`] takes the plaintext PDB bytes, verifies the summary record
//! and every slot header once up front, and then offers typed, bounds-checked
//! accessors so that no error checking is needed on the hot paths. Raw
//! pointers never escape this crate.

#![no_std]

mod error;
mod tlv;

pub use error::PdbError;
pub use tlv::{find_node, TlvIter, TlvNode};

use sbmdefs::{
    Psr, SecurityFooter, SlotCert, SlotHeader, SlotUpdateKey, SlotUsage, PDB_MAX_SLOTS,
    PSR_CAPABILITY_OFFSET, PSR_PRESENT, PSR_SIZE, SECURITY_FOOTER_SIZE, SLOT_HEADER_SIZE,
};
use zerocopy::FromBytes;

/// A parsed Provisioned Data Block.
#[derive(Clone, Copy, Debug)]
pub struct Pdb<'a> {
    buf: &'a [u8],
    psr: Psr,
}

impl<'a> Pdb<'a> {
    /// Parse and verify a PDB. All slot headers are checked here so that
    /// the accessors below cannot go out of bounds.
    pub fn read(buf: &'a [u8]) -> Result<Self, PdbError> {
        let psr_bytes = buf.get(..PSR_SIZE).ok_or(PdbError::TooShort)?;
        let psr = Psr::read_from_bytes(psr_bytes).map_err(|_| PdbError::TooShort)?;

        if psr.presence.get() != PSR_PRESENT {
            return Err(PdbError::NotPresent);
        }

        let data_slots = psr.data_slots.get();
        if data_slots == 0 || data_slots > PDB_MAX_SLOTS {
            return Err(PdbError::TooManySlots);
        }

        let table_start = psr.pdsh_offset.get() as usize;
        let table_len = usize::from(data_slots) * SLOT_HEADER_SIZE;
        let table_end = table_start
            .checked_add(table_len)
            .ok_or(PdbError::SlotTableOutOfBounds)?;
        if table_end > buf.len() {
            return Err(PdbError::SlotTableOutOfBounds);
        }

        let pdb = Self { buf, psr };

        // Verify every slot payload lies within the block.
        for slot in 0..usize::from(data_slots) {
            let header = pdb.slot_header_unchecked(slot);
            let start = header.slot_offset.get() as usize;
            let end = start
                .checked_add(usize::from(header.slot_size.get()))
                .ok_or(PdbError::SlotDataOutOfBounds)?;
            if end > buf.len() {
                return Err(PdbError::SlotDataOutOfBounds);
            }
        }

        Ok(pdb)
    }

    pub fn psr(&self) -> &Psr {
        &self.psr
    }

    pub fn num_slots(&self) -> usize {
        usize::from(self.psr.data_slots.get())
    }

    fn slot_header_unchecked(&self, slot: usize) -> SlotHeader {
        let start = self.psr.pdsh_offset.get() as usize + slot * SLOT_HEADER_SIZE;
        // Bounds were established in read().
        SlotHeader::read_from_bytes(&self.buf[start..start + SLOT_HEADER_SIZE]).unwrap()
    }

    /// The common prefix of a slot header.
    pub fn slot_header(&self, slot: usize) -> Result<SlotHeader, PdbError> {
        if slot >= self.num_slots() {
            return Err(PdbError::SlotIndexOutOfRange);
        }
        Ok(self.slot_header_unchecked(slot))
    }

    /// The usage class carried in a certificate or key slot header.
    pub fn slot_usage(&self, slot: usize) -> Result<u16, PdbError> {
        let header = self.slot_header(slot)?;
        let usage = SlotUsage::read_from_bytes(&header.variant).unwrap();
        Ok(usage.usage.get())
    }

    /// The certificate-specific fields of a slot header.
    pub fn slot_cert(&self, slot: usize) -> Result<SlotCert, PdbError> {
        let header = self.slot_header(slot)?;
        Ok(SlotCert::read_from_bytes(&header.variant).unwrap())
    }

    /// The update-key-specific fields of a slot header.
    pub fn slot_update_key(&self, slot: usize) -> Result<SlotUpdateKey, PdbError> {
        let header = self.slot_header(slot)?;
        Ok(SlotUpdateKey::read_from_bytes(&header.variant).unwrap())
    }

    /// A slot's raw payload.
    pub fn slot_data(&self, slot: usize) -> Result<&'a [u8], PdbError> {
        let header = self.slot_header(slot)?;
        let start = header.slot_offset.get() as usize;
        let end = start + usize::from(header.slot_size.get());
        Ok(&self.buf[start..end])
    }

    /// The span of the PSR covered by the provisioned-data hash: from the
    /// capability field for `length - offsetof(capability)` bytes.
    pub fn hashed_tail(&self) -> Result<&'a [u8], PdbError> {
        let length = self.psr.length.get() as usize;
        if length < PSR_CAPABILITY_OFFSET || length > self.buf.len() {
            return Err(PdbError::TooShort);
        }
        Ok(&self.buf[PSR_CAPABILITY_OFFSET..length])
    }
}

/// The security footer of an encrypted PDB, with its trailing variable
/// fields split out.
#[derive(Clone, Copy, Debug)]
pub struct SecurityFooterView<'a> {
    pub footer: SecurityFooter,
    pub mac: &'a [u8],
    pub iv: &'a [u8],
    /// Key reference data: everything after the IV, interpreted by the
    /// hardware crypto setup.
    pub krd: &'a [u8],
}

/// Locate the security footer of a (possibly still encrypted) PDB. Only the
/// summary record prefix must be plaintext for this to work.
pub fn security_footer(buf: &[u8]) -> Result<SecurityFooterView<'_>, PdbError> {
    let psr_bytes = buf.get(..PSR_SIZE).ok_or(PdbError::TooShort)?;
    let psr = Psr::read_from_bytes(psr_bytes).map_err(|_| PdbError::TooShort)?;

    let footer_start = usize::from(psr.pdsf_offset.get());
    let footer_bytes = buf
        .get(footer_start..footer_start + SECURITY_FOOTER_SIZE)
        .ok_or(PdbError::BadSecurityFooter)?;
    let footer = SecurityFooter::read_from_bytes(footer_bytes).unwrap();

    let mac_start = footer_start + SECURITY_FOOTER_SIZE;
    let mac_len = usize::from(footer.mac_length.get());
    let iv_start = mac_start + mac_len;
    let iv_len = usize::from(footer.iv_length.get());
    let krd_start = iv_start + iv_len;

    let mac = buf
        .get(mac_start..iv_start)
        .ok_or(PdbError::BadSecurityFooter)?;
    let iv = buf
        .get(iv_start..krd_start)
        .ok_or(PdbError::BadSecurityFooter)?;
    let krd = buf.get(krd_start..).ok_or(PdbError::BadSecurityFooter)?;

    Ok(SecurityFooterView {
        footer,
        mac,
        iv,
        krd,
    })
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use sbmdefs::{SLOT_PURPOSE_IDENTITY_KEY, SLOT_PURPOSE_PROVISION_INFO};

    fn raw_pdb(slots: &[(u16, u16, u32, u16)]) -> Vec<u8> {
        // Header table immediately after the PSR, payloads wherever the
        // caller pointed them.
        let mut buf = vec![0u8; 4096];
        buf[0..2].copy_from_slice(&PSR_PRESENT.to_le_bytes());
        buf[56..60].copy_from_slice(&4096u32.to_le_bytes());
        buf[60..62].copy_from_slice(&(slots.len() as u16).to_le_bytes());
        buf[64..68].copy_from_slice(&(PSR_SIZE as u32).to_le_bytes());
        for (i, (sh_type, usage, offset, size)) in slots.iter().enumerate() {
            let base = PSR_SIZE + i * SLOT_HEADER_SIZE;
            buf[base..base + 2].copy_from_slice(&sh_type.to_le_bytes());
            buf[base + 4..base + 8].copy_from_slice(&offset.to_le_bytes());
            buf[base + 8..base + 10].copy_from_slice(&size.to_le_bytes());
            buf[base + 10..base + 12].copy_from_slice(&usage.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parses_a_minimal_block() {
        let buf = raw_pdb(&[(SLOT_PURPOSE_PROVISION_INFO, 0, 256, 20)]);
        let pdb = Pdb::read(&buf).unwrap();
        assert_eq!(pdb.num_slots(), 1);
        assert_eq!(pdb.slot_data(0).unwrap().len(), 20);
    }

    #[test]
    fn rejects_missing_presence() {
        let mut buf = raw_pdb(&[(SLOT_PURPOSE_PROVISION_INFO, 0, 256, 20)]);
        buf[0] = 0xff;
        buf[1] = 0xff;
        assert_eq!(Pdb::read(&buf).err(), Some(PdbError::NotPresent));
    }

    #[test]
    fn rejects_payload_beyond_block() {
        let buf = raw_pdb(&[(SLOT_PURPOSE_IDENTITY_KEY, 0, 4090, 32)]);
        assert_eq!(Pdb::read(&buf).err(), Some(PdbError::SlotDataOutOfBounds));
    }

    #[test]
    fn slot_index_is_policed() {
        let buf = raw_pdb(&[(SLOT_PURPOSE_IDENTITY_KEY, 0x400, 256, 64)]);
        let pdb = Pdb::read(&buf).unwrap();
        assert!(matches!(
            pdb.slot_header(1),
            Err(PdbError::SlotIndexOutOfRange)
        ));
        assert_eq!(pdb.slot_usage(0).unwrap(), 0x400);
    }
}
