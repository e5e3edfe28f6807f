// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Enablement gate.
//!
//! The bridge is usable only when both the board (device side) and the host
//! (through a vendor control request) ask for it. Changes to either request
//! take effect on the next call to [`EnableGate::update`], which also runs
//! the board hooks.
//!
//! [`EnableGate::update`]: struct.EnableGate.html#method.update

use crate::hil::Board;

use log::info;

/// Combines the device-side and host-side enable requests.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EnableGate {
    device: bool,
    host: bool,
    ignore_host: bool,
    // Last value passed to the board hooks.
    enabled: bool,
}

impl EnableGate {
    /// Creates a gate with both requests off.
    pub const fn new(ignore_host_side_enable: bool) -> Self {
        Self {
            device: false,
            host: false,
            ignore_host: ignore_host_side_enable,
            enabled: false,
        }
    }

    /// Records the board's request.
    pub fn set_device(&mut self, on: bool) {
        self.device = on;
    }

    /// Records the host's request.
    pub fn set_host(&mut self, on: bool) {
        self.host = on;
    }

    /// Returns true iff the host request is not needed.
    pub fn ignores_host(&self) -> bool {
        self.ignore_host
    }

    /// The effective state as of the last `update()`.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The effective state the requests currently call for.
    pub fn requested(&self) -> bool {
        self.device && (self.host || self.ignore_host)
    }

    /// Applies the current requests, running the matching board hook if the
    /// effective state changed.
    ///
    /// Returns the new state on a change.
    pub fn update<B: Board>(&mut self, board: &mut B) -> Option<bool> {
        let enabled = self.requested();
        if enabled == self.enabled {
            return None;
        }
        self.enabled = enabled;
        if enabled {
            info!("usb_spi: enabled");
            board.on_enable();
        } else {
            info!("usb_spi: disabled");
            board.on_disable();
        }
        Some(enabled)
    }
}
