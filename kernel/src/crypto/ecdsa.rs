// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! ECDSA and ECDH on NIST P-256 over raw key material.
//!
//! Keys arrive from the provisioned data store as raw byte strings: public
//! keys are X‖Y with no SEC1 tag, private keys are bare scalars,
//! signatures are r‖s. All hashing is done by the callers; only prehash
//! operations appear here.

use crate::error::CryptoError;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature as P256Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::generic_array::GenericArray;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{ecdh, EncodedPoint, FieldBytes, PublicKey, SecretKey};
use sbmdefs::{EccPrivateKey, EccPublicKey, Hash, Signature, ECC_PRIVATE_KEY_SIZE};

fn decode_public(public_key: &EccPublicKey) -> Result<PublicKey, CryptoError> {
    let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(public_key));
    Option::<PublicKey>::from(PublicKey::from_encoded_point(&point)).ok_or(CryptoError::BadKey)
}

/// Verify a raw signature over a precomputed digest.
pub fn verify(public_key: &EccPublicKey, hash: &Hash, sig: &Signature) -> Result<(), CryptoError> {
    let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(public_key));
    let key = VerifyingKey::from_encoded_point(&point).map_err(|_| CryptoError::BadKey)?;
    let sig = P256Signature::from_slice(sig).map_err(|_| CryptoError::BadSignature)?;
    key.verify_prehash(hash, &sig)
        .map_err(|_| CryptoError::BadSignature)
}

/// Sign a precomputed digest, yielding a raw fixed-size signature.
pub fn sign(
    private_key: &EccPrivateKey,
    hash: &Hash,
    sig: &mut Signature,
) -> Result<(), CryptoError> {
    let key =
        SigningKey::from_bytes(FieldBytes::from_slice(private_key)).map_err(|_| CryptoError::BadKey)?;
    let signature: P256Signature = key
        .sign_prehash(hash)
        .map_err(|_| CryptoError::OperationFailed)?;
    sig.copy_from_slice(&signature.to_bytes());
    Ok(())
}

/// ECDH between a provisioned private key and a supplied public key.
pub fn shared_secret(
    private_key: &EccPrivateKey,
    peer_public: &EccPublicKey,
    secret: &mut [u8; ECC_PRIVATE_KEY_SIZE],
) -> Result<(), CryptoError> {
    let private =
        SecretKey::from_bytes(FieldBytes::from_slice(private_key)).map_err(|_| CryptoError::BadKey)?;
    let peer = decode_public(peer_public)?;
    let shared = ecdh::diffie_hellman(private.to_nonzero_scalar(), peer.as_affine());
    secret.copy_from_slice(shared.raw_secret_bytes());
    Ok(())
}

/// Derive the raw public key for a private scalar. Used by the package
/// build support in the tests.
pub fn public_key_of(private_key: &EccPrivateKey) -> Result<EccPublicKey, CryptoError> {
    let private =
        SecretKey::from_bytes(FieldBytes::from_slice(private_key)).map_err(|_| CryptoError::BadKey)?;
    let point = private.public_key().to_encoded_point(false);
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(point.x().ok_or(CryptoError::BadKey)?);
    out[32..].copy_from_slice(point.y().ok_or(CryptoError::BadKey)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256::sha256;

    const PRIVATE: EccPrivateKey = [
        0x3f, 0x49, 0xb1, 0x2a, 0x77, 0x01, 0x5e, 0x02, 0x9f, 0x11, 0x26, 0x47, 0x58, 0x69, 0x7a,
        0x8b, 0x9c, 0xad, 0xbe, 0xcf, 0xd0, 0xe1, 0xf2, 0x03, 0x14, 0x25, 0x36, 0x47, 0x58, 0x69,
        0x7a, 0x0b,
    ];

    #[test]
    fn sign_verify_round_trip() {
        let public = public_key_of(&PRIVATE).unwrap();
        let digest = sha256(b"some signed payload");

        let mut sig = [0u8; 64];
        sign(&PRIVATE, &digest, &mut sig).unwrap();
        verify(&public, &digest, &sig).unwrap();

        let other = sha256(b"a different payload");
        assert!(verify(&public, &other, &sig).is_err());
    }

    #[test]
    fn shared_secret_agrees() {
        let other_private: EccPrivateKey = [0x55; 32];
        let public_a = public_key_of(&PRIVATE).unwrap();
        let public_b = public_key_of(&other_private).unwrap();

        let mut ab = [0u8; 32];
        let mut ba = [0u8; 32];
        shared_secret(&PRIVATE, &public_b, &mut ab).unwrap();
        shared_secret(&other_private, &public_a, &mut ba).unwrap();
        assert_eq!(ab, ba);
        assert_ne!(ab, [0u8; 32]);
    }

    #[test]
    fn garbage_public_keys_are_rejected() {
        let digest = sha256(b"x");
        let sig = [1u8; 64];
        assert!(verify(&[0xffu8; 64], &digest, &sig).is_err());
    }
}
