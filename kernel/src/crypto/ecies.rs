// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! ECIES: ECDH key agreement feeding AES-128-GCM.
//!
//! The shared secret is 256 bits; the AES key is its first half and the IV
//! its second half. The derived material is wiped as soon as the operation
//! completes.

use crate::crypto::aes_gcm::{self, ChunkedAesGcm};
use crate::crypto::ecdsa;
use crate::error::CryptoError;
use sbmdefs::{AesGcmIv, AesKey, AesTag, EccPrivateKey, EccPublicKey, AES_KEY_SIZE};
use subtle::ConstantTimeEq;

/// Derived AES key material. Zeroed on drop.
struct EciesSecret {
    key: AesKey,
    iv: AesGcmIv,
}

impl Drop for EciesSecret {
    fn drop(&mut self) {
        // Wipe through volatile writes so the zeroing is not elided.
        for byte in self.key.iter_mut().chain(self.iv.iter_mut()) {
            // SAFETY: writing through a valid reference.
            unsafe { core::ptr::write_volatile(byte, 0) };
        }
    }
}

fn derive(
    private_key: &EccPrivateKey,
    peer_public: &EccPublicKey,
) -> Result<EciesSecret, CryptoError> {
    let mut shared = [0u8; 32];
    ecdsa::shared_secret(private_key, peer_public, &mut shared)?;

    let mut secret = EciesSecret {
        key: [0; 16],
        iv: [0; 16],
    };
    secret.key.copy_from_slice(&shared[..AES_KEY_SIZE]);
    secret.iv.copy_from_slice(&shared[AES_KEY_SIZE..]);
    for byte in shared.iter_mut() {
        // SAFETY: writing through a valid reference.
        unsafe { core::ptr::write_volatile(byte, 0) };
    }
    Ok(secret)
}

/// Decrypt a bounded ciphertext in place and verify its tag in constant
/// time.
pub fn decrypt(
    private_key: &EccPrivateKey,
    peer_public: &EccPublicKey,
    aad: &[u8],
    buffer: &mut [u8],
    tag: &AesTag,
) -> Result<(), CryptoError> {
    let secret = derive(private_key, peer_public)?;
    aes_gcm::decrypt(&secret.key, &secret.iv, aad, buffer, tag)
}

/// Encrypt a bounded plaintext in place, yielding the tag.
pub fn encrypt(
    private_key: &EccPrivateKey,
    peer_public: &EccPublicKey,
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<AesTag, CryptoError> {
    let secret = derive(private_key, peer_public)?;
    aes_gcm::encrypt(&secret.key, &secret.iv, aad, buffer)
}

/// Constant-time tag comparison.
pub fn tags_match(a: &AesTag, b: &AesTag) -> bool {
    bool::from(a.ct_eq(b))
}

/// Streaming decryption keyed directly by an unwrapped encryption record
/// rather than by ECDH. There is a single chunked crypto state in the
/// system; the installer brackets its use with the persistent busy flag.
#[derive(Debug)]
pub struct ChunkedDecrypt {
    gcm: ChunkedAesGcm,
}

impl ChunkedDecrypt {
    pub fn begin(key: &AesKey, iv: &AesGcmIv) -> Self {
        Self {
            gcm: ChunkedAesGcm::begin_decrypt(key, iv),
        }
    }

    pub fn update(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<(), CryptoError> {
        self.gcm.update(ciphertext, plaintext)
    }

    /// Finish and check the computed tag against the expected one.
    pub fn finish(self, expected_tag: &AesTag) -> Result<(), CryptoError> {
        let tag = self.gcm.finalize();
        if tags_match(&tag, expected_tag) {
            Ok(())
        } else {
            Err(CryptoError::BadTag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_PRIVATE: EccPrivateKey = [0x2a; 32];
    const EPHEMERAL_PRIVATE: EccPrivateKey = [0x4c; 32];

    #[test]
    fn ecies_round_trip() {
        let device_public = ecdsa::public_key_of(&DEVICE_PRIVATE).unwrap();
        let ephemeral_public = ecdsa::public_key_of(&EPHEMERAL_PRIVATE).unwrap();

        // Sender encrypts to the device key with an ephemeral key.
        let mut buffer = *b"seer key material for one eub!!!";
        let tag = encrypt(&EPHEMERAL_PRIVATE, &device_public, &[], &mut buffer).unwrap();

        // Device decrypts with its private key and the ephemeral public.
        decrypt(&DEVICE_PRIVATE, &ephemeral_public, &[], &mut buffer, &tag).unwrap();
        assert_eq!(&buffer, b"seer key material for one eub!!!");
    }

    #[test]
    fn wrong_recipient_fails_the_tag() {
        let device_public = ecdsa::public_key_of(&DEVICE_PRIVATE).unwrap();
        let ephemeral_public = ecdsa::public_key_of(&EPHEMERAL_PRIVATE).unwrap();

        let mut buffer = [0x5au8; 48];
        let tag = encrypt(&EPHEMERAL_PRIVATE, &device_public, &[], &mut buffer).unwrap();

        let wrong_private: EccPrivateKey = [0x77; 32];
        assert!(decrypt(&wrong_private, &ephemeral_public, &[], &mut buffer, &tag).is_err());
    }
}
