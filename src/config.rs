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

//! Board configuration of the bridge.

use bitflags::bitflags;
use core::cmp::min;
use core::convert::TryFrom;

/// Default capacity of each transfer buffer, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1536;

bitflags! {
    /// Capabilities of an SPI peripheral with respect to USB-SPI.
    pub struct UsbFlags: u16 {
        /// The host may target this peripheral.
        const ENABLED = 1 << 0;

        /// Transactions go through `Board::custom_transaction`.
        const CUSTOM_SPI_DEVICE = 1 << 1;
    }
}

/// One SPI peripheral on the board.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SpiDevice {
    /// Name, for logs.
    pub name: &'static str,

    /// Board-specific chip select line.
    pub chip_select: u16,

    /// USB-SPI capabilities.
    pub flags: UsbFlags,
}

impl SpiDevice {
    /// Returns true iff the host may target this peripheral.
    pub fn usb_enabled(&self) -> bool {
        self.flags.contains(UsbFlags::ENABLED)
    }

    /// Returns true iff this peripheral has a board-specific driver.
    pub fn is_custom(&self) -> bool {
        self.flags.contains(UsbFlags::CUSTOM_SPI_DEVICE)
    }
}

/// Protocol limits and behaviour of one bridge instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// USB interface number the control requests must address.
    pub interface: u16,

    /// Largest write count a transfer may declare.
    pub max_write_count: u16,

    /// Largest read count a transfer may declare.
    pub max_read_count: u16,

    /// Whether full duplex transfers are accepted.
    pub full_duplex: bool,

    /// Whether the device-side enable alone enables the bridge.
    pub ignore_host_side_enable: bool,
}

impl Config {
    /// Limits both counts to the given buffer capacities.
    pub fn clamped(mut self, write_capacity: usize, read_capacity: usize) -> Self {
        self.max_write_count = clamp_count(self.max_write_count, write_capacity);
        self.max_read_count = clamp_count(self.max_read_count, read_capacity);
        self
    }
}

fn clamp_count(count: u16, capacity: usize) -> u16 {
    let capacity = u16::try_from(capacity).unwrap_or(u16::MAX);
    min(count, capacity)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: 0,
            max_write_count: DEFAULT_BUFFER_SIZE as u16,
            max_read_count: DEFAULT_BUFFER_SIZE as u16,
            full_duplex: true,
            ignore_host_side_enable: false,
        }
    }
}
