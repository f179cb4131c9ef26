// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

use pdb::PdbError;
use sbmdefs::{
    SECURE_API_ERR_API_FAILURE, SECURE_API_ERR_BUFFER_LOCATION_INVALID,
    SECURE_API_ERR_BUFFER_SIZE_INVALID, SECURE_API_ERR_COMMAND_FAILED,
    SECURE_API_ERR_NO_MATCHING_SLOT_FOUND, SECURE_API_ERR_SLOT_OUT_OF_RANGE,
    SECURE_API_ERR_SLOT_TYPE_MISMATCH,
};

/// Result of a memory-abstraction operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemError {
    /// At least part of the range is not erased.
    NotErased,
    /// A verify operation found a mismatch.
    VerifyError,
    /// A read operation failed.
    ReadError,
    /// A program operation failed.
    ProgramError,
    /// An erase operation failed.
    EraseError,
    /// One or more parameters are invalid.
    ParamError,
    /// Bug detected, or the device driver is absent.
    InternalError,
}

/// Datastore failures, carrying the stable secure-API error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsError {
    ApiFailure,
    CommandFailed,
    BufferLocationInvalid,
    BufferSizeInvalid,
    SlotOutOfRange,
    SlotTypeMismatch,
    NoMatchingSlot,
}

impl DsError {
    /// The numeric code returned through the secure API. These values are
    /// ABI and must not change.
    pub fn code(self) -> i8 {
        match self {
            Self::ApiFailure => SECURE_API_ERR_API_FAILURE,
            Self::CommandFailed => SECURE_API_ERR_COMMAND_FAILED,
            Self::BufferLocationInvalid => SECURE_API_ERR_BUFFER_LOCATION_INVALID,
            Self::BufferSizeInvalid => SECURE_API_ERR_BUFFER_SIZE_INVALID,
            Self::SlotOutOfRange => SECURE_API_ERR_SLOT_OUT_OF_RANGE,
            Self::SlotTypeMismatch => SECURE_API_ERR_SLOT_TYPE_MISMATCH,
            Self::NoMatchingSlot => SECURE_API_ERR_NO_MATCHING_SLOT_FOUND,
        }
    }
}

/// A crypto primitive failed or rejected its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// Key or point decoding failed.
    BadKey,
    /// Signature verification failed.
    BadSignature,
    /// Authentication tag mismatch.
    BadTag,
    /// The chunked crypto state is already in use.
    Busy,
    /// Signing or secret derivation failed.
    OperationFailed,
}

/// Top-level error type used throughout the SBM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SbmError {
    Mem(MemError),
    Pdb(PdbError),
    DataStore(DsError),
    Crypto(CryptoError),
}

impl From<MemError> for SbmError {
    fn from(err: MemError) -> Self {
        Self::Mem(err)
    }
}

impl From<PdbError> for SbmError {
    fn from(err: PdbError) -> Self {
        Self::Pdb(err)
    }
}

impl From<DsError> for SbmError {
    fn from(err: DsError) -> Self {
        Self::DataStore(err)
    }
}

impl From<CryptoError> for SbmError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}
