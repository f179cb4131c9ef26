// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2022-2023 SUSE LLC
//
// Author: Joerg Roedel <jroedel@suse.de>

//! Console logging through the `log` facade.
//!
//! The logger writes through the HAL console. The serial port is quiesced
//! when the application is launched and may have been reprogrammed by it,
//! so the boot orchestrator disables all logging before launch and the
//! secure API gate keeps it disabled as a safety net.

use crate::hal::Console;
use core::fmt;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record};

/// A [`log::Log`] implementation backed by a HAL console.
pub struct ConsoleLogger {
    name: &'static str,
    console: &'static dyn Console,
}

impl ConsoleLogger {
    pub const fn new(name: &'static str, console: &'static dyn Console) -> Self {
        Self { name, console }
    }
}

impl fmt::Debug for ConsoleLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleLogger")
            .field("name", &self.name)
            .finish()
    }
}

struct ConsoleWriter<'a> {
    console: &'a dyn Console,
}

impl Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.bytes() {
            if ch == b'\n' {
                self.console.put_byte(b'\r');
            }
            self.console.put_byte(ch);
        }
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let mut writer = ConsoleWriter {
            console: self.console,
        };
        // The console is a best-effort debug aid; swallow format errors.
        let _ = writeln!(
            writer,
            "[{}] {}: {}",
            self.name,
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the logger. Called once during early boot.
pub fn init(logger: &'static ConsoleLogger) -> Result<(), log::SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

/// Quiesce all SBM logging. The serial driver is surrendered to the
/// application at launch, so nothing may be written after this.
pub fn disable() {
    log::set_max_level(LevelFilter::Off);
}
