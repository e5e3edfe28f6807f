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

//! Interfaces to the hardware around the bridge.

use crate::config::SpiDevice;

// Raw driver error codes.
const ERROR_UNKNOWN: u16 = 1;
const ERROR_UNIMPLEMENTED: u16 = 2;
const ERROR_TIMEOUT: u16 = 10;
const ERROR_BUSY: u16 = 15;

/// Error reported by an SPI transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BusError {
    /// The transaction did not complete in time.
    Timeout,

    /// The bus is in use.
    Busy,

    /// The peripheral has no driver for this operation.
    Unimplemented,

    /// Any other driver error, by raw code.
    Other(u16),
}

impl BusError {
    /// Returns the raw driver error code.
    pub fn code(self) -> u16 {
        match self {
            Self::Timeout => ERROR_TIMEOUT,
            Self::Busy => ERROR_BUSY,
            Self::Unimplemented => ERROR_UNIMPLEMENTED,
            Self::Other(code) => code,
        }
    }

    /// The catch-all driver error.
    pub const fn unknown() -> Self {
        Self::Other(ERROR_UNKNOWN)
    }
}

/// How read data relates to write data in one transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Duplex {
    /// Clock out the write data, then clock in the read data.
    Half,

    /// Capture one read byte for every byte written.
    Full,
}

/// The bulk endpoint pair facing the host.
pub trait Transport {
    /// Takes a waiting frame, if any, copying it into `buf` and re-arming the
    /// OUT endpoint.
    ///
    /// Returns the frame length.
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Queues `frame` on the IN endpoint.
    ///
    /// Only called when `tx_ready()` returns true.
    fn transmit(&mut self, frame: &[u8]);

    /// Returns true iff the IN endpoint can accept a frame.
    fn tx_ready(&self) -> bool;
}

/// A synchronous SPI controller.
pub trait SpiBus {
    /// Runs one transaction against `device`, chip select included.
    ///
    /// In `Duplex::Half`, `write` is clocked out followed by `read.len()`
    /// bytes clocked in. In `Duplex::Full`, `read` has the same length as
    /// `write` and receives every byte clocked during the write.
    fn transaction(
        &mut self,
        device: &SpiDevice,
        write: &[u8],
        read: &mut [u8],
        duplex: Duplex,
    ) -> Result<(), BusError>;
}

/// Chip select lines driven directly by the host.
pub trait ChipSelect {
    /// Drives the chip select of `device`; `high` deasserts it.
    fn set_level(&mut self, device: &SpiDevice, high: bool);
}

/// Board hooks.
pub trait Board {
    /// Called when the bridge becomes usable, e.g. to mux the SPI pins.
    fn on_enable(&mut self);

    /// Called when the bridge stops being usable.
    fn on_disable(&mut self);

    /// Runs a transaction against a device flagged `CUSTOM_SPI_DEVICE`.
    fn custom_transaction(
        &mut self,
        _device: &SpiDevice,
        _write: &[u8],
        _read: &mut [u8],
        _duplex: Duplex,
    ) -> Result<(), BusError> {
        Err(BusError::Unimplemented)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn raw_codes() {
        assert_eq!(BusError::Timeout.code(), 10);
        assert_eq!(BusError::Unimplemented.code(), 2);
        assert_eq!(BusError::unknown().code(), 1);
        assert_eq!(BusError::Other(0x1234).code(), 0x1234);
    }
}
