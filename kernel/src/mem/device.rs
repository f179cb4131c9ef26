// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Memory device drivers.
//!
//! Every backing store (on-chip flash, external flash, RAM) exposes the
//! same verbs through [`MemoryDevice`]; the slot layer in [`crate::mem`]
//! translates slot-relative operations into device-absolute ones and never
//! touches a driver directly for bounds it has not checked.

use crate::error::MemError;
use core::cell::UnsafeCell;
use core::fmt;

/// Uniform driver interface over heterogeneous backing devices. Addresses
/// are device-absolute byte offsets; all range checking happens in the
/// slot layer.
pub trait MemoryDevice {
    /// Copy `dst.len()` bytes out of the device.
    fn read(&self, address: usize, dst: &mut [u8]) -> Result<(), MemError>;

    /// Program whole pages. The caller guarantees `address` is
    /// page-aligned and `src.len()` is a multiple of the page size.
    fn program(&self, address: usize, src: &[u8]) -> Result<(), MemError>;

    /// Erase a range. The caller guarantees alignment to the erase unit.
    fn erase(&self, address: usize, size: usize, erase_value: u8) -> Result<(), MemError>;

    /// Program granularity of the device.
    fn page_size(&self) -> usize;

    /// Whether the device is currently connected. Non-removable devices
    /// are always present.
    fn present(&self) -> bool {
        true
    }

    /// Directly-addressable devices can expose their contents; used for
    /// in-place access to the provisioned data block.
    fn mapped(&self) -> Option<&[u8]> {
        None
    }

    /// Devices that lock reads after an erase confirm writability here
    /// instead of letting the slot layer compare byte-for-byte.
    fn confirm_erased(&self, _address: usize, _size: usize) -> Option<Result<(), MemError>> {
        None
    }

    /// Called before a programming sequence; on-chip flash drivers disable
    /// caches here.
    fn prepare_program(&self) {}

    /// Called after a programming sequence, success or not; caches are
    /// re-enabled and flushed here.
    fn finish_program(&self) {}
}

/// A RAM-backed device: the SoC RAM driver on hardware, and the test
/// double everywhere else.
///
/// Interior mutability is required because several slots share one device
/// and all driver verbs take `&self`. The backing buffer must never be
/// mutated while a `mapped()` borrow is alive; the boot flow and the
/// secure API gate access the datastore and the programming verbs strictly
/// in sequence, which upholds this.
pub struct RamDevice<B> {
    buf: UnsafeCell<B>,
    page_size: usize,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RamDevice<B> {
    pub fn new(buf: B, page_size: usize) -> Self {
        Self {
            buf: UnsafeCell::new(buf),
            page_size,
        }
    }

    fn slice(&self) -> &[u8] {
        // SAFETY: see the aliasing contract in the type-level comment; no
        // mutation happens while this shared borrow is alive.
        unsafe { (*self.buf.get()).as_ref() }
    }

    #[allow(clippy::mut_from_ref)]
    fn slice_mut(&self) -> &mut [u8] {
        // SAFETY: single-threaded access discipline per the type-level
        // comment; no other borrow of the buffer is alive during a driver
        // verb.
        unsafe { (*self.buf.get()).as_mut() }
    }
}

impl<B> fmt::Debug for RamDevice<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamDevice")
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> MemoryDevice for RamDevice<B> {
    fn read(&self, address: usize, dst: &mut [u8]) -> Result<(), MemError> {
        let end = address.checked_add(dst.len()).ok_or(MemError::ReadError)?;
        let src = self.slice().get(address..end).ok_or(MemError::ReadError)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn program(&self, address: usize, src: &[u8]) -> Result<(), MemError> {
        let end = address
            .checked_add(src.len())
            .ok_or(MemError::ProgramError)?;
        let dst = self
            .slice_mut()
            .get_mut(address..end)
            .ok_or(MemError::ProgramError)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn erase(&self, address: usize, size: usize, erase_value: u8) -> Result<(), MemError> {
        let end = address.checked_add(size).ok_or(MemError::EraseError)?;
        let dst = self
            .slice_mut()
            .get_mut(address..end)
            .ok_or(MemError::EraseError)?;
        dst.fill(erase_value);
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn mapped(&self) -> Option<&[u8]> {
        Some(self.slice())
    }
}
