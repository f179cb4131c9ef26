// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Memory abstraction.
//!
//! The device address space is partitioned into named memory devices, each
//! composed of subregions with a uniform erase unit and erase value. Every
//! persistent object lives in exactly one memory slot; all operations here
//! take `(slot, offset-within-slot)` and translate to a device-absolute
//! address under full range checking.

mod device;

pub use device::{MemoryDevice, RamDevice};

use crate::error::MemError;
use core::fmt;
use sbmdefs::MemorySlotId;

/// Size of the bounce buffer used to program partial or misaligned pages.
/// Must be at least as large as any device's page size.
const MAX_PAGE_SIZE: usize = 256;

/// Size of the read-back buffer used by [`MemoryMap::verify`] and
/// [`MemoryMap::verify_erased`].
const VERIFY_BUF_SIZE: usize = 128;

#[repr(align(4))]
struct PageBuffer([u8; MAX_PAGE_SIZE]);

/// What a slot is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    /// SBM code and provisioned data.
    Sbm,
    /// The 1 KiB metadata header of the installed image.
    AppStatus,
    /// The executable body of the installed application.
    Exec,
    /// Staging area for a candidate update package.
    Update,
}

/// A named range of one memory device.
#[derive(Clone, Copy, Debug)]
pub struct MemorySlot {
    pub name: &'static str,
    /// Stable identity exposed through the secure API.
    pub id: MemorySlotId,
    pub kind: SlotKind,
    /// Index into [`MemoryMap::devices`].
    pub device: u8,
    /// Device-absolute start address.
    pub start: usize,
    pub size: usize,
    /// Slots holding the SBM itself reject erasure unconditionally.
    pub prevent_erase: bool,
}

/// A span of one device with uniform erase characteristics.
#[derive(Clone, Copy, Debug)]
pub struct MemorySubregion {
    /// Index into [`MemoryMap::devices`].
    pub device: u8,
    /// First device-absolute address of the subregion.
    pub start: usize,
    /// Last device-absolute address of the subregion.
    pub end: usize,
    pub erase_size: usize,
    /// Smallest unit the device can program.
    pub min_write_size: usize,
    pub erase_value: u8,
}

/// A driver bound to its integration attributes.
pub struct MemoryDeviceEntry<'a> {
    pub name: &'static str,
    pub removable: bool,
    pub driver: &'a dyn MemoryDevice,
}

impl fmt::Debug for MemoryDeviceEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDeviceEntry")
            .field("name", &self.name)
            .field("removable", &self.removable)
            .finish()
    }
}

/// The device, subregion and slot tables of one integration, plus the
/// location of the provisioned data block.
#[derive(Debug)]
pub struct MemoryMap<'a> {
    pub devices: &'a [MemoryDeviceEntry<'a>],
    pub subregions: &'a [MemorySubregion],
    pub sbm_slot: MemorySlot,
    pub app_status_slot: MemorySlot,
    pub exec_slot: MemorySlot,
    /// Update slots in priority order: lower device indices are preferred
    /// on version ties.
    pub update_slots: &'a [MemorySlot],
    /// Offset of the provisioned data block within the SBM slot. Patched
    /// into the image by the provisioning tool.
    pub pd_offset: usize,
}

impl<'a> MemoryMap<'a> {
    fn device_entry(&self, index: u8) -> Result<&MemoryDeviceEntry<'a>, MemError> {
        self.devices
            .get(usize::from(index))
            .ok_or(MemError::InternalError)
    }

    pub fn device_of(&self, slot: &MemorySlot) -> Result<&MemoryDeviceEntry<'a>, MemError> {
        self.device_entry(slot.device)
    }

    /// The subregion containing a device-absolute address.
    pub fn subregion_at(&self, device: u8, address: usize) -> Option<&MemorySubregion> {
        self.subregions
            .iter()
            .find(|s| s.device == device && address >= s.start && address <= s.end)
    }

    /// Check that an address range lies within the device, possibly
    /// spanning several contiguous subregions.
    fn range_within_device(&self, device: u8, address: usize, size: usize) -> bool {
        let Some(last) = address.checked_add(size - 1) else {
            return false;
        };
        let Some(mut current) = self.subregion_at(device, address) else {
            return false;
        };
        loop {
            if last <= current.end {
                return true;
            }
            match self.subregion_at(device, current.end + 1) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Translate a slot-relative range to a device-absolute address,
    /// enforcing the slot and device bounds.
    fn resolve(
        &self,
        slot: &MemorySlot,
        offset: usize,
        size: usize,
    ) -> Result<(&MemoryDeviceEntry<'a>, usize), MemError> {
        if size == 0 {
            return Err(MemError::ParamError);
        }
        let end = offset.checked_add(size).ok_or(MemError::ParamError)?;
        if end > slot.size {
            return Err(MemError::ParamError);
        }
        let address = slot.start.checked_add(offset).ok_or(MemError::ParamError)?;
        if !self.range_within_device(slot.device, address, size) {
            return Err(MemError::ParamError);
        }
        Ok((self.device_entry(slot.device)?, address))
    }

    /// Whether the device backing a slot is currently connected.
    pub fn device_present(&self, slot: &MemorySlot) -> bool {
        match self.device_of(slot) {
            Ok(entry) => !entry.removable || entry.driver.present(),
            Err(_) => false,
        }
    }

    /// Read from a slot. On failure the destination contents are
    /// unspecified.
    pub fn read(&self, slot: &MemorySlot, offset: usize, dst: &mut [u8]) -> Result<(), MemError> {
        let (entry, address) = self.resolve(slot, offset, dst.len())?;
        entry.driver.read(address, dst)
    }

    /// Program one or more pages. `offset` must be page-aligned; a short
    /// tail is padded with the subregion's erase value and programmed as a
    /// final full page. Aligned sources are handed to the driver in
    /// multi-page runs, misaligned ones go through a bounce buffer one
    /// page at a time.
    pub fn program(&self, slot: &MemorySlot, offset: usize, src: &[u8]) -> Result<(), MemError> {
        let (entry, address) = self.resolve(slot, offset, src.len())?;
        let page_size = entry.driver.page_size();
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(MemError::InternalError);
        }
        if address % page_size != 0 {
            return Err(MemError::ParamError);
        }

        let mut page_buffer = PageBuffer([0; MAX_PAGE_SIZE]);
        entry.driver.prepare_program();
        let result =
            self.program_pages(entry, slot.device, address, src, page_size, &mut page_buffer);
        entry.driver.finish_program();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn program_pages(
        &self,
        entry: &MemoryDeviceEntry<'a>,
        device: u8,
        address: usize,
        src: &[u8],
        page_size: usize,
        page_buffer: &mut PageBuffer,
    ) -> Result<(), MemError> {
        let mut offset = 0usize;
        let mut remaining = src.len();

        while remaining >= page_size {
            let (chunk, write_size) = if src.as_ptr().align_offset(4) == 0 {
                // Aligned source: pass as many contiguous whole pages as
                // remain in one driver call.
                let write_size = remaining - (remaining % page_size);
                (&src[offset..offset + write_size], write_size)
            } else {
                page_buffer.0[..page_size].copy_from_slice(&src[offset..offset + page_size]);
                (&page_buffer.0[..page_size], page_size)
            };
            entry.driver.program(address + offset, chunk)?;
            remaining -= write_size;
            offset += write_size;
        }

        if remaining > 0 {
            let erase_value = self
                .subregion_at(device, address + offset)
                .map(|s| s.erase_value)
                .unwrap_or(0xff);
            page_buffer.0[..remaining].copy_from_slice(&src[offset..]);
            page_buffer.0[remaining..page_size].fill(erase_value);
            entry
                .driver
                .program(address + offset, &page_buffer.0[..page_size])?;
        }

        Ok(())
    }

    /// Read back and compare against `src` in bounded chunks.
    pub fn verify(&self, slot: &MemorySlot, offset: usize, src: &[u8]) -> Result<(), MemError> {
        let mut verify_buf = [0u8; VERIFY_BUF_SIZE];
        let mut done = 0usize;
        while done < src.len() {
            let chunk = (src.len() - done).min(VERIFY_BUF_SIZE);
            self.read(slot, offset + done, &mut verify_buf[..chunk])?;
            if verify_buf[..chunk] != src[done..done + chunk] {
                return Err(MemError::VerifyError);
            }
            done += chunk;
        }
        Ok(())
    }

    /// Erase a range of a slot, rounding the start down and the size up to
    /// the erase unit of each subregion touched.
    pub fn erase(&self, slot: &MemorySlot, offset: usize, size: usize) -> Result<(), MemError> {
        if slot.prevent_erase {
            return Err(MemError::ParamError);
        }
        let (entry, address) = self.resolve(slot, offset, size)?;

        let mut cursor = address;
        let end = address + size;
        while cursor < end {
            let subregion = self
                .subregion_at(slot.device, cursor)
                .ok_or(MemError::ParamError)?;
            let unit = subregion.erase_size;
            let aligned_start = cursor - (cursor % unit);
            let span_end = end.min(subregion.end + 1);
            let aligned_len = span_end - aligned_start;
            let aligned_len = aligned_len.div_ceil(unit) * unit;
            entry
                .driver
                .erase(aligned_start, aligned_len, subregion.erase_value)?;
            cursor = aligned_start + aligned_len;
        }
        Ok(())
    }

    /// Confirm that a range reads back as erased. Devices that lock reads
    /// after an erase confirm through the driver instead.
    pub fn verify_erased(
        &self,
        slot: &MemorySlot,
        offset: usize,
        size: usize,
    ) -> Result<(), MemError> {
        let (entry, address) = self.resolve(slot, offset, size)?;
        if let Some(result) = entry.driver.confirm_erased(address, size) {
            return result;
        }

        let mut verify_buf = [0u8; VERIFY_BUF_SIZE];
        let mut done = 0usize;
        while done < size {
            let erase_value = self
                .subregion_at(slot.device, address + done)
                .map(|s| s.erase_value)
                .unwrap_or(0xff);
            let chunk = (size - done).min(VERIFY_BUF_SIZE);
            self.read(slot, offset + done, &mut verify_buf[..chunk])?;
            if verify_buf[..chunk].iter().any(|&b| b != erase_value) {
                return Err(MemError::NotErased);
            }
            done += chunk;
        }
        Ok(())
    }

    /// The smallest programmable unit of the device backing a slot.
    pub fn min_write_size(&self, slot: &MemorySlot) -> Result<usize, MemError> {
        self.subregion_at(slot.device, slot.start)
            .map(|s| s.min_write_size)
            .ok_or(MemError::ParamError)
    }

    /// Look up an update slot by its stable identity.
    pub fn update_slot_by_id(&self, id: MemorySlotId) -> Option<&'a MemorySlot> {
        self.update_slots.iter().find(|slot| slot.id == id)
    }

    /// The provisioned data block, accessed in place on the SBM device.
    pub fn pdb_slice(&self) -> Result<&'a [u8], MemError> {
        let entry = self.device_entry(self.sbm_slot.device)?;
        let mapped = entry.driver.mapped().ok_or(MemError::InternalError)?;
        let start = self
            .sbm_slot
            .start
            .checked_add(self.pd_offset)
            .ok_or(MemError::ParamError)?;
        let end = self.sbm_slot.start + self.sbm_slot.size;
        mapped.get(start..end).ok_or(MemError::ParamError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_map(device: &RamDevice<Vec<u8>>) -> MemoryMap<'_> {
        static SUBREGIONS: &[MemorySubregion] = &[MemorySubregion {
            device: 0,
            start: 0,
            end: 0x3fff,
            erase_size: 512,
            min_write_size: 16,
            erase_value: 0xff,
        }];
        // Leak is fine in tests; the map borrows the device for 'a.
        let entries = Box::leak(Box::new([MemoryDeviceEntry {
            name: "ram",
            removable: false,
            driver: device,
        }]));
        MemoryMap {
            devices: entries,
            subregions: SUBREGIONS,
            sbm_slot: MemorySlot {
                name: "sbm",
                id: 0,
                kind: SlotKind::Sbm,
                device: 0,
                start: 0,
                size: 0x1000,
                prevent_erase: true,
            },
            app_status_slot: MemorySlot {
                name: "app_status",
                id: 1,
                kind: SlotKind::AppStatus,
                device: 0,
                start: 0x1000,
                size: 0x400,
                prevent_erase: false,
            },
            exec_slot: MemorySlot {
                name: "exec",
                id: 2,
                kind: SlotKind::Exec,
                device: 0,
                start: 0x1400,
                size: 0x1400,
                prevent_erase: false,
            },
            update_slots: &[],
            pd_offset: 0x800,
        }
    }

    #[test]
    fn read_round_trips_programmed_data() {
        let device = RamDevice::new(vec![0xffu8; 0x4000], 64);
        let map = test_map(&device);
        let slot = map.exec_slot;

        let data: Vec<u8> = (0..200u32).map(|v| v as u8).collect();
        map.program(&slot, 0, &data).unwrap();

        let mut back = vec![0u8; 200];
        map.read(&slot, 0, &mut back).unwrap();
        assert_eq!(back, data);
        map.verify(&slot, 0, &data).unwrap();
    }

    #[test]
    fn short_tail_is_padded_with_erase_value() {
        let device = RamDevice::new(vec![0u8; 0x4000], 64);
        let map = test_map(&device);
        let slot = map.exec_slot;

        map.program(&slot, 0, &[0xaa; 10]).unwrap();
        let mut back = [0u8; 64];
        map.read(&slot, 0, &mut back).unwrap();
        assert_eq!(&back[..10], &[0xaa; 10]);
        assert_eq!(&back[10..], &[0xff; 54]);
    }

    #[test]
    fn unaligned_program_offset_is_rejected() {
        let device = RamDevice::new(vec![0xffu8; 0x4000], 64);
        let map = test_map(&device);
        assert_eq!(
            map.program(&map.exec_slot, 3, &[0u8; 8]),
            Err(MemError::ParamError)
        );
    }

    #[test]
    fn reads_beyond_the_slot_are_rejected() {
        let device = RamDevice::new(vec![0xffu8; 0x4000], 64);
        let map = test_map(&device);
        let mut buf = [0u8; 32];
        assert_eq!(
            map.read(&map.app_status_slot, 0x400 - 16, &mut buf),
            Err(MemError::ParamError)
        );
    }

    #[test]
    fn erase_is_refused_on_protected_slots() {
        let device = RamDevice::new(vec![0xffu8; 0x4000], 64);
        let map = test_map(&device);
        assert_eq!(map.erase(&map.sbm_slot, 0, 512), Err(MemError::ParamError));
    }

    #[test]
    fn erase_rounds_to_the_erase_unit() {
        let device = RamDevice::new(vec![0u8; 0x4000], 64);
        let map = test_map(&device);
        let slot = map.exec_slot;

        // Erasing a few bytes in the middle of an erase unit wipes the
        // whole unit.
        map.erase(&slot, 520, 8).unwrap();
        map.verify_erased(&slot, 512, 512).unwrap();
        let mut head = [0u8; 4];
        map.read(&slot, 0, &mut head).unwrap();
        assert_eq!(head, [0u8; 4]);
    }

    #[test]
    fn verify_erased_detects_residue() {
        let device = RamDevice::new(vec![0xffu8; 0x4000], 64);
        let map = test_map(&device);
        let slot = map.exec_slot;
        map.program(&slot, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(map.verify_erased(&slot, 0, 64), Err(MemError::NotErased));
    }
}
