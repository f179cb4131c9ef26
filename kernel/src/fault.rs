// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) Microsoft Corporation
//
// Author: Jon Lange <jlange@microsoft.com>

//! Scoped fault traps.
//!
//! Crypto and flash routines run with a recovery point installed so that a
//! bus fault raised mid-operation resumes at a well-defined place instead
//! of taking the device down. The platform's exception vector forwards to
//! [`FaultTrapStack::on_fault`]; acquiring a [`FaultTrapGuard`] installs a
//! recovery handler and dropping it restores the previous one, so
//! installation is push/pop disciplined by construction.

use core::cell::Cell;
use core::fmt;

/// A recovery continuation: invoked from exception context, it must only
/// record the fault and arrange for the interrupted operation to unwind
/// through its error path.
pub type RecoveryFn = fn();

/// The (single) well-known registration point the exception vector
/// consults. At most one recovery handler is active at a time.
pub struct FaultTrapStack {
    current: Cell<Option<RecoveryFn>>,
}

impl FaultTrapStack {
    pub const fn new() -> Self {
        Self {
            current: Cell::new(None),
        }
    }

    /// Install a recovery handler for the duration of the returned guard.
    pub fn push(&self, recover: RecoveryFn) -> FaultTrapGuard<'_> {
        let previous = self.current.replace(Some(recover));
        FaultTrapGuard {
            stack: self,
            previous,
        }
    }

    /// Entered from the platform's fault vector. Runs the active recovery
    /// handler, if any, and reports whether the fault was absorbed.
    pub fn on_fault(&self) -> bool {
        match self.current.get() {
            Some(recover) => {
                recover();
                true
            }
            None => false,
        }
    }

    /// Whether a handler is currently installed.
    pub fn armed(&self) -> bool {
        self.current.get().is_some()
    }
}

impl Default for FaultTrapStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FaultTrapStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultTrapStack")
            .field("armed", &self.armed())
            .finish()
    }
}

/// Keeps a recovery handler installed; restores the previously installed
/// one on drop.
#[derive(Debug)]
pub struct FaultTrapGuard<'a> {
    stack: &'a FaultTrapStack,
    previous: Option<RecoveryFn>,
}

impl Drop for FaultTrapGuard<'_> {
    fn drop(&mut self) {
        self.stack.current.set(self.previous);
    }
}
