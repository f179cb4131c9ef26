// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2022-2023 SUSE LLC
//
// Author: Joerg Roedel <jroedel@suse.de>

//! Platform abstraction.
//!
//! The SBM core is generic over this trait; per-SoC integrations supply the
//! serial console, LED, timers, reset, lockdown control, the device unique
//! identifier, the application launch stub, and the opaque hardware crypto
//! used for encrypted provisioned data. Defaults are no-ops so a minimal
//! port only implements what its board wires up.

use crate::error::{CryptoError, SbmError};

/// Size of the device unique identifier folded into the provisioned-data
/// hash.
pub const UNIQUE_ID_SIZE: usize = 12;

/// Byte-oriented console sink used by the logger.
pub trait Console: Sync {
    fn put_byte(&self, ch: u8);
}

pub trait Hal {
    /// Read the device's unique identifier.
    fn device_unique_id(&self, id: &mut [u8; UNIQUE_ID_SIZE]);

    /// Start the boot timer.
    fn boot_timer_start(&self) {}

    /// Stop the boot timer and return the elapsed time in microseconds.
    fn boot_timer_stop(&self) -> u32 {
        0
    }

    /// Toggle the error LED.
    fn led_toggle(&self) {}

    /// Reset the device. Must not return on hardware; the secure API
    /// treats a return as failure.
    fn reset(&self) {}

    /// Current platform lockdown level.
    fn lockdown_level(&self) -> u32 {
        0
    }

    /// Disable debug access and raise the lockdown level.
    fn raise_lockdown(&self) {}

    /// Hand control to the application at the given address. Must not
    /// return on hardware.
    fn run_application(&self, start_address: usize);

    /// Prepare the hardware crypto unit for provisioned-data operations
    /// using the key reference data from the PDB security footer.
    fn pdb_crypto_setup(&self, _krd: &[u8]) -> Result<(), SbmError> {
        Err(SbmError::Crypto(CryptoError::OperationFailed))
    }

    /// Authenticate the PDB ciphertext span against its MAC.
    fn pdb_crypto_authenticate(
        &self,
        _data: &[u8],
        _krd: &[u8],
        _iv: &[u8],
        _mac: &[u8],
    ) -> Result<(), SbmError> {
        Err(SbmError::Crypto(CryptoError::OperationFailed))
    }

    /// Decrypt the PDB ciphertext span into `plaintext`.
    fn pdb_crypto_decrypt(
        &self,
        _ciphertext: &[u8],
        _plaintext: &mut [u8],
        _krd: &[u8],
        _iv: &[u8],
    ) -> Result<(), SbmError> {
        Err(SbmError::Crypto(CryptoError::OperationFailed))
    }

    /// Shut the hardware crypto unit back down.
    fn pdb_crypto_quiesce(&self) {}
}
