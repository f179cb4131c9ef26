// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Update slot selection.
//!
//! With more than one update slot the boot orchestrator probes each one
//! cheaply and orders the candidates by descending version, preferring the
//! lower device index on ties (on-chip flash before external parts). The
//! highest-priority valid candidate is installed first; a plain failure
//! falls through to the next.

use super::SwupStatus;
use crate::hal::Hal;
use crate::oem::OemHooks;
use crate::Sbm;

/// Everything recorded about one update slot during the selection pass.
#[derive(Clone, Copy, Debug)]
pub struct SwupSelectorData {
    /// Index into the memory map's update slot table.
    pub slot_index: usize,
    pub status: SwupStatus,
    pub key_instance: u8,
    pub max_offset: usize,
    pub version: u32,
}

impl<H: Hal, O: OemHooks> Sbm<'_, H, O> {
    /// Probe every update slot and fill `queue` in descending priority
    /// order. `queue` must have one entry per update slot.
    pub fn build_swup_priority_queue(&mut self, queue: &mut [SwupSelectorData]) {
        assert_eq!(queue.len(), self.mem.update_slots.len());

        log::debug!("searching update slots for an image to select");
        let mut entries_ready = 0usize;

        for slot_index in 0..self.mem.update_slots.len() {
            let update_slot = &self.mem.update_slots[slot_index];
            let mut placement = entries_ready;
            entries_ready += 1;

            let probe = self.update_slot_contains_swup(update_slot);
            let mut version = 0u32;

            if matches!(
                probe.status,
                SwupStatus::Initial | SwupStatus::InstalledPrevious
            ) {
                version = self.eub_version(update_slot);
                log::info!(
                    "update slot \"{}\" contains valid image (version {version:#x})",
                    update_slot.name
                );

                // Walk the new entry up past lower-priority ones:
                // descending version, then ascending device index.
                while placement > 0 {
                    let above = &queue[placement - 1];
                    let above_device = self.mem.update_slots[above.slot_index].device;
                    let higher = version > above.version
                        || (version == above.version && update_slot.device < above_device);
                    if !higher {
                        break;
                    }
                    queue[placement] = queue[placement - 1];
                    placement -= 1;
                }
            }

            queue[placement] = SwupSelectorData {
                slot_index,
                status: probe.status,
                key_instance: probe.key_instance,
                max_offset: probe.max_offset,
                version,
            };
        }
    }
}
