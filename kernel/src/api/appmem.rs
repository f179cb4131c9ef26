// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Checked access to application memory.
//!
//! Handlers never dereference an application pointer directly: every
//! access goes through these helpers, which police the range against the
//! SBM-reserved regions first. The application vouches for the validity
//! of its own pointers beyond that, exactly as the call ABI demands.

use crate::buffer_check::AppPermissions;
use core::mem::size_of;

/// Read a scalar the application offered as input. Input data may live in
/// ROM or RAM.
pub(crate) fn app_read<T: Copy>(perms: &AppPermissions<'_>, ptr: *const T) -> Option<T> {
    if !perms.check_app_rom(ptr as usize, size_of::<T>()) {
        return None;
    }
    // SAFETY: the range does not touch SBM-reserved memory and the
    // application guarantees its own pointers point at readable memory.
    Some(unsafe { ptr.read_unaligned() })
}

/// Write a scalar through an application output pointer, which must be in
/// writable application RAM.
pub(crate) fn app_write<T: Copy>(perms: &AppPermissions<'_>, ptr: *mut T, value: T) -> Option<()> {
    if !perms.check_app_ram(ptr as usize, size_of::<T>(), true) {
        return None;
    }
    // SAFETY: range checked above; the application guarantees writable
    // backing for its own pointers.
    unsafe { ptr.write_unaligned(value) };
    Some(())
}

/// Copy bytes out of an application input buffer.
pub(crate) fn app_copy_in(
    perms: &AppPermissions<'_>,
    ptr: *const u8,
    dst: &mut [u8],
) -> Option<()> {
    if !perms.check_app_rom(ptr as usize, dst.len()) {
        return None;
    }
    // SAFETY: range checked above; the destination is an SBM-owned buffer
    // of exactly the checked length.
    unsafe { core::ptr::copy_nonoverlapping(ptr, dst.as_mut_ptr(), dst.len()) };
    Some(())
}

/// Copy bytes into an application output buffer.
pub(crate) fn app_copy_out(perms: &AppPermissions<'_>, ptr: *mut u8, src: &[u8]) -> Option<()> {
    if !perms.check_app_ram(ptr as usize, src.len(), true) {
        return None;
    }
    // SAFETY: range checked above; the source is an SBM-owned buffer of
    // exactly the checked length.
    unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), ptr, src.len()) };
    Some(())
}
