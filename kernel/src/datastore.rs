// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Provisioned data access.
//!
//! [`Datastore`] navigates a parsed PDB: slot enumeration, certificate and
//! key lookup by purpose/usage/instance, and the signing primitives keyed
//! from slot material. The PDB itself is read-only; when it is stored
//! encrypted, [`Sbm::verify_and_decrypt_pdb`] materialises a plaintext copy
//! in persistent RAM and [`Sbm::clear_plaintext_pdb`] wipes it again before
//! control leaves the SBM.

use crate::crypto::ecdsa;
use crate::error::{DsError, SbmError};
use crate::hal::Hal;
use crate::oem::OemHooks;
use crate::Sbm;
use pdb::{find_node, Pdb};
use sbmdefs::{
    key_category, slot_purpose, slot_subtype, EccPrivateKey, EccPublicKey, PdbCapability,
    ProvisioningDetails, ProvisioningSummary, Psr, ECC_PRIVATE_KEY_SIZE, ECC_PUBLIC_KEY_SIZE,
    ECDSA_SIGNATURE_SIZE, KEY_CATEGORY_PRIVATE, KEY_CATEGORY_PUBLIC, KEY_PURPOSE_DEVICE_UPDATE,
    PROVISIONING_DETAILS, PROVISIONING_SUMMARY, PSR_SIZE, SHA256_SIZE,
    SLOT_PURPOSE_IDENTITY_CERT, SLOT_PURPOSE_IDENTITY_KEY, SLOT_PURPOSE_MASK,
    SLOT_PURPOSE_PROVISION_INFO, SLOT_PURPOSE_TRUST_ANCHOR_KEY, SLOT_PURPOSE_UPDATE_KEY,
    SLOT_SUBTYPE_MASK, TLV_IMMEDIATE_PRIVATE_KEY, TLV_IMMEDIATE_PUBLIC_KEY, TLV_X509_CERTIFICATE,
};
use zerocopy::FromBytes;

/// Slot-level access to provisioned data.
#[derive(Clone, Copy, Debug)]
pub struct Datastore<'d> {
    pdb: Pdb<'d>,
}

impl<'d> Datastore<'d> {
    pub fn new(pdb_bytes: &'d [u8]) -> Result<Self, SbmError> {
        Ok(Self {
            pdb: Pdb::read(pdb_bytes)?,
        })
    }

    pub fn pdb(&self) -> &Pdb<'d> {
        &self.pdb
    }

    /// Whether plausible provisioned data is present: the parser accepted
    /// the block and a provisioning summary slot exists.
    pub fn data_present(&self) -> bool {
        self.provisioning_summary().is_some()
    }

    /// The binary security-world identity written at provisioning time.
    pub fn provisioning_summary(&self) -> Option<ProvisioningSummary> {
        let slot = self
            .find(
                SLOT_PURPOSE_PROVISION_INFO | PROVISIONING_SUMMARY,
                0,
                0,
                SLOT_PURPOSE_MASK | SLOT_SUBTYPE_MASK,
            )
            .ok()?;
        let data = self.slot_data(slot).ok()?;
        ProvisioningSummary::read_from_prefix(data)
            .ok()
            .map(|(summary, _)| summary)
    }

    /// The textual provisioning provenance strings.
    pub fn provisioning_details(&self) -> Option<ProvisioningDetails> {
        let slot = self
            .find(
                SLOT_PURPOSE_PROVISION_INFO | PROVISIONING_DETAILS,
                0,
                0,
                SLOT_PURPOSE_MASK | SLOT_SUBTYPE_MASK,
            )
            .ok()?;
        let data = self.slot_data(slot).ok()?;
        ProvisioningDetails::read_from_prefix(data)
            .ok()
            .map(|(details, _)| details)
    }

    fn matches(&self, slot: usize, s_type: u16, usage: u16, mask: u16) -> bool {
        let Ok(header) = self.pdb.slot_header(slot) else {
            return false;
        };
        if (header.sh_type.get() & mask) != (s_type & mask) {
            return false;
        }
        usage == 0 || self.pdb.slot_usage(slot).is_ok_and(|u| u == usage)
    }

    /// Count slots matching a type under a search mask; zero usage is a
    /// wildcard.
    pub fn count(&self, s_type: u16, usage: u16, mask: u16) -> i8 {
        (0..self.pdb.num_slots())
            .filter(|&slot| self.matches(slot, s_type, usage, mask))
            .count() as i8
    }

    /// Find the `instance`-th slot matching a type under a search mask.
    pub fn find(&self, s_type: u16, usage: u16, instance: u8, mask: u16) -> Result<i8, DsError> {
        let mut seen = 0u8;
        for slot in 0..self.pdb.num_slots() {
            if self.matches(slot, s_type, usage, mask) {
                if seen == instance {
                    return Ok(slot as i8);
                }
                seen += 1;
            }
        }
        Err(DsError::NoMatchingSlot)
    }

    /// A slot's raw payload.
    pub fn slot_data(&self, slot: i8) -> Result<&'d [u8], DsError> {
        if slot < 0 || usize::try_from(slot).unwrap() >= self.pdb.num_slots() {
            return Err(DsError::SlotOutOfRange);
        }
        self.pdb
            .slot_data(slot as usize)
            .map_err(|_| DsError::SlotOutOfRange)
    }

    fn slot_type(&self, slot: i8) -> Result<u16, DsError> {
        if slot < 0 || usize::try_from(slot).unwrap() >= self.pdb.num_slots() {
            return Err(DsError::SlotOutOfRange);
        }
        self.pdb
            .slot_header(slot as usize)
            .map(|h| h.sh_type.get())
            .map_err(|_| DsError::SlotOutOfRange)
    }

    /// Copy the X.509 certificate out of a certificate slot. The required
    /// length is written to `data_len` even when the buffer is too small.
    /// Key slots are refused: keys cannot be copied out.
    pub fn copy_data(
        &self,
        slot: i8,
        buf: &mut [u8],
        data_len: &mut u16,
    ) -> Result<(), DsError> {
        let s_type = self.slot_type(slot)?;
        if slot_purpose(s_type) != SLOT_PURPOSE_IDENTITY_CERT {
            return Err(DsError::SlotTypeMismatch);
        }

        let data = self.slot_data(slot)?;
        let node = find_node(data, TLV_X509_CERTIFICATE).ok_or(DsError::SlotTypeMismatch)?;

        *data_len = node.value.len() as u16;
        if buf.len() < node.value.len() {
            return Err(DsError::BufferSizeInvalid);
        }
        buf[..node.value.len()].copy_from_slice(node.value);
        Ok(())
    }

    /// The parent slot recorded in a certificate header.
    pub fn parent(&self, slot: i8) -> Result<i8, DsError> {
        let s_type = self.slot_type(slot)?;
        if slot_purpose(s_type) != SLOT_PURPOSE_IDENTITY_CERT {
            return Err(DsError::SlotTypeMismatch);
        }
        let cert = self
            .pdb
            .slot_cert(slot as usize)
            .map_err(|_| DsError::SlotOutOfRange)?;
        Ok(cert.parent_id.get() as i8)
    }

    /// The identity-key slot associated with a certificate, and its key
    /// subtype.
    pub fn find_cert_key(&self, cert_slot: i8) -> Result<(i8, u16), DsError> {
        let s_type = self.slot_type(cert_slot)?;

        // A non-certificate slot is the caller's problem; anything beyond
        // that means the provisioned data itself needs trawling.
        if slot_purpose(s_type) != SLOT_PURPOSE_IDENTITY_CERT {
            return Err(DsError::SlotTypeMismatch);
        }

        let cert = self
            .pdb
            .slot_cert(cert_slot as usize)
            .map_err(|_| DsError::SlotOutOfRange)?;
        let key_slot = cert.key_slot as i8;

        let key_type = self.slot_type(key_slot)?;
        if slot_purpose(key_type) != SLOT_PURPOSE_IDENTITY_KEY {
            return Err(DsError::SlotTypeMismatch);
        }

        Ok((key_slot, slot_subtype(key_type)))
    }

    /// Key subtype, usage class and public key of an identity-key slot.
    pub fn key_details(&self, slot: i8) -> Result<(u16, u16, &'d [u8]), DsError> {
        let s_type = self.slot_type(slot)?;
        if slot_purpose(s_type) != SLOT_PURPOSE_IDENTITY_KEY {
            return Err(DsError::SlotTypeMismatch);
        }
        let usage = self
            .pdb
            .slot_usage(slot as usize)
            .map_err(|_| DsError::SlotOutOfRange)?;

        let data = self.slot_data(slot)?;
        let node = find_node(data, TLV_IMMEDIATE_PUBLIC_KEY).ok_or(DsError::SlotTypeMismatch)?;
        Ok((slot_subtype(s_type), usage, node.value))
    }

    /// Extract a key of the requested category from a key-bearing slot.
    fn key(&self, slot: i8, category: u16, tag: u16) -> Result<&'d [u8], DsError> {
        let s_type = self.slot_type(slot)?;
        match slot_purpose(s_type) {
            SLOT_PURPOSE_IDENTITY_KEY
            | SLOT_PURPOSE_TRUST_ANCHOR_KEY
            | SLOT_PURPOSE_UPDATE_KEY => {}
            _ => return Err(DsError::SlotTypeMismatch),
        }
        if key_category(s_type) & category == 0 {
            return Err(DsError::SlotTypeMismatch);
        }
        let data = self.slot_data(slot)?;
        let node = find_node(data, tag).ok_or(DsError::SlotTypeMismatch)?;
        Ok(node.value)
    }

    /// A private key, copied out for the caller.
    pub fn private_key(&self, slot: i8) -> Result<EccPrivateKey, DsError> {
        let value = self.key(slot, KEY_CATEGORY_PRIVATE, TLV_IMMEDIATE_PRIVATE_KEY)?;
        if value.len() < ECC_PRIVATE_KEY_SIZE {
            return Err(DsError::SlotTypeMismatch);
        }
        let mut key = [0u8; ECC_PRIVATE_KEY_SIZE];
        key.copy_from_slice(&value[..ECC_PRIVATE_KEY_SIZE]);
        Ok(key)
    }

    /// A public key, copied out for the caller.
    pub fn public_key(&self, slot: i8) -> Result<EccPublicKey, DsError> {
        let value = self.key(slot, KEY_CATEGORY_PUBLIC, TLV_IMMEDIATE_PUBLIC_KEY)?;
        if value.len() < ECC_PUBLIC_KEY_SIZE {
            return Err(DsError::SlotTypeMismatch);
        }
        let mut key = [0u8; ECC_PUBLIC_KEY_SIZE];
        key.copy_from_slice(&value[..ECC_PUBLIC_KEY_SIZE]);
        Ok(key)
    }

    /// Sign a hash with an identity-key slot's private key. The signature
    /// is always the fixed 64 bytes; `sig_len` reports it.
    pub fn sign(
        &self,
        slot: i8,
        hash: &[u8],
        sig: &mut [u8],
        sig_len: &mut u16,
    ) -> Result<(), DsError> {
        let s_type = self.slot_type(slot)?;
        if slot_purpose(s_type) != SLOT_PURPOSE_IDENTITY_KEY
            || key_category(s_type) & KEY_CATEGORY_PRIVATE == 0
        {
            return Err(DsError::SlotTypeMismatch);
        }
        if hash.len() < SHA256_SIZE {
            return Err(DsError::BufferSizeInvalid);
        }
        if sig.len() < ECDSA_SIGNATURE_SIZE {
            *sig_len = ECDSA_SIGNATURE_SIZE as u16;
            return Err(DsError::BufferSizeInvalid);
        }

        let private = self.private_key(slot)?;
        let mut digest = [0u8; SHA256_SIZE];
        digest.copy_from_slice(&hash[..SHA256_SIZE]);

        let mut signature = [0u8; ECDSA_SIGNATURE_SIZE];
        ecdsa::sign(&private, &digest, &mut signature).map_err(|_| DsError::CommandFailed)?;
        sig[..ECDSA_SIGNATURE_SIZE].copy_from_slice(&signature);
        *sig_len = ECDSA_SIGNATURE_SIZE as u16;
        Ok(())
    }

    /// Verify a signature over a hash with any public-carrying key slot.
    pub fn verify(&self, slot: i8, hash: &[u8], sig: &[u8]) -> Result<(), DsError> {
        let s_type = self.slot_type(slot)?;
        match slot_purpose(s_type) {
            SLOT_PURPOSE_IDENTITY_KEY
            | SLOT_PURPOSE_TRUST_ANCHOR_KEY
            | SLOT_PURPOSE_UPDATE_KEY => {}
            _ => return Err(DsError::SlotTypeMismatch),
        }
        if key_category(s_type) & KEY_CATEGORY_PUBLIC == 0 {
            return Err(DsError::SlotTypeMismatch);
        }
        if hash.len() < SHA256_SIZE || sig.len() < ECDSA_SIGNATURE_SIZE {
            return Err(DsError::BufferSizeInvalid);
        }

        let public = self.public_key(slot)?;
        let mut digest = [0u8; SHA256_SIZE];
        digest.copy_from_slice(&hash[..SHA256_SIZE]);
        let mut signature = [0u8; ECDSA_SIGNATURE_SIZE];
        signature.copy_from_slice(&sig[..ECDSA_SIGNATURE_SIZE]);

        ecdsa::verify(&public, &digest, &signature).map_err(|_| DsError::CommandFailed)
    }

    /// Derive a shared secret from an identity-key slot's private key and
    /// a supplied public key.
    pub fn shared_secret(
        &self,
        slot: i8,
        public_key: &EccPublicKey,
        secret: &mut [u8; ECC_PRIVATE_KEY_SIZE],
    ) -> Result<(), DsError> {
        let s_type = self.slot_type(slot)?;
        if slot_purpose(s_type) != SLOT_PURPOSE_IDENTITY_KEY
            || key_category(s_type) & KEY_CATEGORY_PRIVATE == 0
        {
            return Err(DsError::SlotTypeMismatch);
        }
        let private = self.private_key(slot)?;
        ecdsa::shared_secret(&private, public_key, secret).map_err(|_| DsError::CommandFailed)
    }

    /// Find the slot holding a SWUP-handling key of the given purpose.
    pub fn swup_key_slot(&self, purpose: u8) -> Result<i8, DsError> {
        self.find(
            SLOT_PURPOSE_UPDATE_KEY,
            u16::from(purpose),
            0,
            SLOT_PURPOSE_MASK,
        )
    }

    /// Find the device-update key slot of the given instance and category.
    pub fn find_update_key_slot(&self, instance: u8, category: u16) -> Result<i8, DsError> {
        self.find(
            SLOT_PURPOSE_UPDATE_KEY | category,
            u16::from(KEY_PURPOSE_DEVICE_UPDATE),
            instance,
            SLOT_PURPOSE_MASK | category,
        )
    }

    /// Highest provisioned-data offset in use: the slot payloads may sit
    /// in any order, so scan them all.
    pub fn provisioned_data_size(&self) -> u32 {
        let mut size = 0u32;
        for slot in 0..self.pdb.num_slots() {
            if let Ok(header) = self.pdb.slot_header(slot) {
                let end = header.slot_offset.get() + u32::from(header.slot_size.get());
                size = size.max(end);
            }
        }
        size
    }
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Whether the on-flash PDB is marked encrypted. Only the PSR prefix
    /// is consulted; it stays plaintext either way.
    pub fn pdb_encrypted(&self) -> Result<bool, SbmError> {
        let raw = self.mem.pdb_slice()?;
        let psr_bytes = raw.get(..PSR_SIZE).ok_or(pdb::PdbError::TooShort)?;
        let psr = Psr::read_from_bytes(psr_bytes).map_err(|_| pdb::PdbError::TooShort)?;
        Ok(PdbCapability::from_bits_truncate(psr.capability.get())
            .contains(PdbCapability::ENCRYPTED))
    }

    /// The plaintext PDB bytes: the in-place flash copy, or the decrypted
    /// RAM copy for an encrypted PDB.
    fn pdb_bytes(&self) -> Result<&[u8], SbmError> {
        if self.pdb_encrypted()? {
            Ok(&self.persist.plaintext_pdb)
        } else {
            Ok(self.mem.pdb_slice()?)
        }
    }

    /// Open the datastore over the current plaintext PDB.
    pub fn datastore(&self) -> Result<Datastore<'_>, SbmError> {
        Datastore::new(self.pdb_bytes()?)
    }

    /// Authenticate and decrypt an encrypted PDB into persistent RAM.
    pub fn verify_and_decrypt_pdb(&mut self) -> Result<(), SbmError> {
        let raw = self.mem.pdb_slice()?;

        if !self.pdb_encrypted()? {
            return Err(SbmError::DataStore(DsError::CommandFailed));
        }

        let view = pdb::security_footer(raw)?;
        let start = usize::from(view.footer.encrypted_start_offset.get());
        let end = usize::from(view.footer.encrypted_end_offset.get());
        if end >= self.persist.plaintext_pdb.len() || start > end || end >= raw.len() {
            return Err(SbmError::DataStore(DsError::CommandFailed));
        }

        self.hal.pdb_crypto_setup(view.krd)?;

        // The authenticated span runs from the PSR to the start of the MAC.
        let footer_start = usize::from(
            Psr::read_from_bytes(&raw[..PSR_SIZE])
                .map_err(|_| pdb::PdbError::TooShort)?
                .pdsf_offset
                .get(),
        );
        let mac_start = footer_start + sbmdefs::SECURITY_FOOTER_SIZE;
        if let Err(err) =
            self.hal
                .pdb_crypto_authenticate(&raw[..mac_start], view.krd, view.iv, view.mac)
        {
            self.hal.pdb_crypto_quiesce();
            return Err(err);
        }

        // Plaintext head first, then the decrypted body over it.
        let encrypted_len = end - start + 1;
        self.persist.plaintext_pdb[..start].copy_from_slice(&raw[..start]);
        if let Err(err) = self.hal.pdb_crypto_decrypt(
            &raw[start..=end],
            &mut self.persist.plaintext_pdb[start..start + encrypted_len],
            view.krd,
            view.iv,
        ) {
            self.hal.pdb_crypto_quiesce();
            self.persist.clear_plaintext_pdb();
            return Err(err);
        }
        self.hal.pdb_crypto_quiesce();

        // Keep the security footer visible in the plaintext copy.
        let footer_copy_at = PSR_SIZE + encrypted_len;
        if footer_copy_at + sbmdefs::SECURITY_FOOTER_SIZE <= self.persist.plaintext_pdb.len() {
            self.persist.plaintext_pdb
                [footer_copy_at..footer_copy_at + sbmdefs::SECURITY_FOOTER_SIZE]
                .copy_from_slice(&raw[footer_start..footer_start + sbmdefs::SECURITY_FOOTER_SIZE]);
        }

        Ok(())
    }

    /// Wipe the plaintext PDB copy.
    pub fn clear_plaintext_pdb(&mut self) {
        self.persist.clear_plaintext_pdb();
    }

    /// Recompute the provisioned-data hash and compare it against the one
    /// written at provisioning time.
    #[cfg(feature = "ppd-hash")]
    pub fn datastore_hash_check(&self) -> bool {
        use crate::crypto::sha256::sha256_chunked;
        use crate::hal::UNIQUE_ID_SIZE;

        let Ok(datastore) = self.datastore() else {
            return false;
        };
        let psr = datastore.pdb().psr();
        let Ok(tail) = datastore.pdb().hashed_tail() else {
            return false;
        };

        let mut device_id = [0u8; UNIQUE_ID_SIZE];
        self.hal.device_unique_id(&mut device_id);

        let hash = sha256_chunked([
            &psr.pd_pc_seed[..],
            &self.policy.ppd_context_seed[..],
            &device_id[..],
            tail,
        ]);
        hash == psr.pd_pc_hash
    }

    /// SBM code size and highest provisioned-data offset.
    pub fn calculate_sizes(&self) -> (u32, u32) {
        let sbm_size = (self.mem.sbm_slot.start + self.mem.pd_offset) as u32;
        let pd_size = self
            .datastore()
            .map(|ds| ds.provisioned_data_size())
            .unwrap_or(0);
        (sbm_size, pd_size)
    }
}
