// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! AES-128-GCM with the update format's 16-byte IVs.
//!
//! One-shot operations go through the `aes-gcm` crate. The streaming
//! installer additionally needs an incremental decryption state, which the
//! one-shot AEAD API does not expose; [`ChunkedAesGcm`] composes the same
//! `aes` + `ctr` + `ghash` building blocks to provide it, following the
//! GCM construction for IVs that are not 96 bits (SP 800-38D §7.1).

use crate::error::CryptoError;
use aes::cipher::generic_array::typenum::U16;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::BlockEncrypt;
use aes::Aes128;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{AesGcm, KeyInit};
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr32BE;
use ghash::universal_hash::UniversalHash;
use ghash::GHash;
use sbmdefs::{AesGcmIv, AesKey, AesTag, AES_GCM_TAG_SIZE};

/// AES-128-GCM parameterised for the 16-byte IVs carried in update
/// packages.
type Aes128Gcm16 = AesGcm<Aes128, U16>;

/// One-shot in-place decryption with tag verification.
pub fn decrypt(
    key: &AesKey,
    iv: &AesGcmIv,
    aad: &[u8],
    buffer: &mut [u8],
    tag: &AesTag,
) -> Result<(), CryptoError> {
    let cipher = Aes128Gcm16::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::BadTag)
}

/// One-shot in-place encryption, yielding the tag.
pub fn encrypt(
    key: &AesKey,
    iv: &AesGcmIv,
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<AesTag, CryptoError> {
    let cipher = Aes128Gcm16::new(GenericArray::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, buffer)
        .map_err(|_| CryptoError::OperationFailed)?;
    Ok(tag.into())
}

type Block = GenericArray<u8, U16>;

fn inc32(block: &mut Block) {
    let mut counter = u32::from_be_bytes([block[12], block[13], block[14], block[15]]);
    counter = counter.wrapping_add(1);
    block[12..].copy_from_slice(&counter.to_be_bytes());
}

/// Incremental AES-GCM decryption for payloads larger than any RAM buffer.
///
/// Feed ciphertext with [`update`](Self::update) in any chunk sizes; the
/// computed tag from [`finalize`](Self::finalize) must be compared against
/// the expected one in constant time by the caller.
pub struct ChunkedAesGcm {
    cipher: Ctr32BE<Aes128>,
    ghash: GHash,
    /// `E_K(J0)`, folded into the GHASH output to form the tag.
    tag_mask: Block,
    partial: Block,
    partial_len: usize,
    total_len: u64,
}

impl core::fmt::Debug for ChunkedAesGcm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunkedAesGcm")
            .field("total_len", &self.total_len)
            .finish()
    }
}

impl ChunkedAesGcm {
    pub fn begin_decrypt(key: &AesKey, iv: &AesGcmIv) -> Self {
        let aes = Aes128::new(GenericArray::from_slice(key));

        // Hash subkey H = E_K(0^128).
        let mut h = Block::default();
        aes.encrypt_block(&mut h);
        let ghash = GHash::new(&h);

        // J0 = GHASH_H(IV ‖ pad ‖ 0^64 ‖ [len(IV)]_64) for a non-96-bit IV.
        let mut g = ghash.clone();
        g.update_padded(iv);
        let mut length_block = Block::default();
        length_block[8..].copy_from_slice(&((iv.len() as u64) * 8).to_be_bytes());
        g.update(&[length_block]);
        let j0 = g.finalize();

        let mut tag_mask = j0;
        aes.encrypt_block(&mut tag_mask);

        // The ciphertext keystream starts at inc32(J0).
        let mut counter = j0;
        inc32(&mut counter);
        let cipher = Ctr32BE::<Aes128>::new(GenericArray::from_slice(key), &counter);

        Self {
            cipher,
            ghash,
            tag_mask,
            partial: Block::default(),
            partial_len: 0,
            total_len: 0,
        }
    }

    fn ghash_bytes(&mut self, mut data: &[u8]) {
        if self.partial_len > 0 {
            let take = (16 - self.partial_len).min(data.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&data[..take]);
            self.partial_len += take;
            data = &data[take..];
            if self.partial_len == 16 {
                let block = self.partial;
                self.ghash.update(&[block]);
                self.partial_len = 0;
            }
        }

        let full = data.len() - (data.len() % 16);
        for chunk in data[..full].chunks_exact(16) {
            self.ghash.update(&[Block::clone_from_slice(chunk)]);
        }

        let rest = &data[full..];
        if !rest.is_empty() {
            self.partial[..rest.len()].copy_from_slice(rest);
            self.partial_len = rest.len();
        }
    }

    /// Decrypt one chunk of ciphertext. `plaintext` must be the same
    /// length as `ciphertext`.
    pub fn update(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<(), CryptoError> {
        if plaintext.len() != ciphertext.len() {
            return Err(CryptoError::OperationFailed);
        }
        // The tag authenticates the ciphertext, so hash before decrypting.
        self.ghash_bytes(ciphertext);
        self.total_len += ciphertext.len() as u64;
        plaintext.copy_from_slice(ciphertext);
        self.cipher.apply_keystream(plaintext);
        Ok(())
    }

    /// Complete the operation and produce the authentication tag.
    pub fn finalize(mut self) -> AesTag {
        if self.partial_len > 0 {
            for byte in self.partial[self.partial_len..].iter_mut() {
                *byte = 0;
            }
            let block = self.partial;
            self.ghash.update(&[block]);
        }

        // Length block: no AAD, then the ciphertext length in bits.
        let mut length_block = Block::default();
        length_block[8..].copy_from_slice(&(self.total_len * 8).to_be_bytes());
        self.ghash.update(&[length_block]);

        let mut tag = self.ghash.finalize();
        for (t, m) in tag.iter_mut().zip(self.tag_mask.iter()) {
            *t ^= *m;
        }

        let mut out = [0u8; AES_GCM_TAG_SIZE];
        out.copy_from_slice(&tag);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtle::ConstantTimeEq;

    const KEY: AesKey = [0x11; 16];
    const IV: AesGcmIv = [0x22; 16];

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(7)).collect()
    }

    #[test]
    fn one_shot_round_trip() {
        let mut buffer = sample(100);
        let tag = encrypt(&KEY, &IV, &[], &mut buffer).unwrap();
        decrypt(&KEY, &IV, &[], &mut buffer, &tag).unwrap();
        assert_eq!(buffer, sample(100));
    }

    #[test]
    fn one_shot_detects_tampering() {
        let mut buffer = sample(64);
        let tag = encrypt(&KEY, &IV, &[], &mut buffer).unwrap();
        buffer[10] ^= 1;
        assert!(decrypt(&KEY, &IV, &[], &mut buffer, &tag).is_err());
    }

    #[test]
    fn chunked_decrypt_matches_one_shot() {
        for (len, step) in [(2048usize, 1024usize), (1500, 1024), (100, 7), (48, 48)] {
            let plain = sample(len);
            let mut ciphertext = plain.clone();
            let tag = encrypt(&KEY, &IV, &[], &mut ciphertext).unwrap();

            let mut state = ChunkedAesGcm::begin_decrypt(&KEY, &IV);
            let mut recovered = vec![0u8; len];
            for (ct, pt) in ciphertext.chunks(step).zip(recovered.chunks_mut(step)) {
                state.update(ct, pt).unwrap();
            }
            let computed = state.finalize();

            assert_eq!(recovered, plain);
            assert!(bool::from(computed.ct_eq(&tag)));
        }
    }

    #[test]
    fn chunked_tag_differs_on_corrupt_ciphertext() {
        let plain = sample(2048);
        let mut ciphertext = plain.clone();
        let tag = encrypt(&KEY, &IV, &[], &mut ciphertext).unwrap();
        ciphertext[1033] ^= 0x80;

        let mut state = ChunkedAesGcm::begin_decrypt(&KEY, &IV);
        let mut recovered = vec![0u8; 2048];
        for (ct, pt) in ciphertext.chunks(1024).zip(recovered.chunks_mut(1024)) {
            state.update(ct, pt).unwrap();
        }
        assert!(!bool::from(state.finalize().ct_eq(&tag)));
    }
}
