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

//! Fake hardware for tests. Every fake records what it was asked to do so
//! that tests can assert on it afterwards.

use crate::config::SpiDevice;
use crate::hil;
use crate::hil::BusError;
use crate::hil::Duplex;

use std::collections::VecDeque;

/// A fake bulk endpoint pair. Frames pushed with `push_rx` are handed out one
/// per `receive()`.
pub struct Transport {
    pub rx: VecDeque<Vec<u8>>,
    pub tx: Vec<Vec<u8>>,
    pub ready: bool,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
            ready: true,
        }
    }

    pub fn push_rx(&mut self, frame: &[u8]) {
        self.rx.push_back(frame.to_vec());
    }

    /// Removes and returns everything transmitted so far.
    pub fn take_tx(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.tx)
    }
}

impl hil::Transport for Transport {
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
        let frame = self.rx.pop_front()?;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Some(len)
    }

    fn transmit(&mut self, frame: &[u8]) {
        assert!(self.ready, "transmit while the IN endpoint is busy");
        self.tx.push(frame.to_vec());
    }

    fn tx_ready(&self) -> bool {
        self.ready
    }
}

/// One recorded SPI transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub chip_select: u16,
    pub write: Vec<u8>,
    pub read_len: usize,
    pub duplex: Duplex,
}

/// A fake SPI controller. Reads return `read_data`, padded with 0xff.
pub struct Spi {
    pub transactions: Vec<Transaction>,
    pub read_data: Vec<u8>,
    pub result: Result<(), BusError>,
}

impl Spi {
    pub fn new() -> Self {
        Self {
            transactions: Vec::new(),
            read_data: Vec::new(),
            result: Ok(()),
        }
    }
}

impl hil::SpiBus for Spi {
    fn transaction(
        &mut self,
        device: &SpiDevice,
        write: &[u8],
        read: &mut [u8],
        duplex: Duplex,
    ) -> Result<(), BusError> {
        self.transactions.push(Transaction {
            chip_select: device.chip_select,
            write: write.to_vec(),
            read_len: read.len(),
            duplex,
        });
        for (i, byte) in read.iter_mut().enumerate() {
            *byte = self.read_data.get(i).copied().unwrap_or(0xff);
        }
        self.result
    }
}

/// Fake chip select lines.
pub struct ChipSelect {
    /// `(chip_select, high)` for every call.
    pub levels: Vec<(u16, bool)>,
}

impl ChipSelect {
    pub fn new() -> Self {
        Self { levels: Vec::new() }
    }
}

impl hil::ChipSelect for ChipSelect {
    fn set_level(&mut self, device: &SpiDevice, high: bool) {
        self.levels.push((device.chip_select, high));
    }
}

/// A fake board that counts hook calls and implements a custom driver that
/// echoes the write data.
pub struct Board {
    pub enables: usize,
    pub disables: usize,
    pub custom_writes: Vec<Vec<u8>>,
}

impl Board {
    pub fn new() -> Self {
        Self {
            enables: 0,
            disables: 0,
            custom_writes: Vec::new(),
        }
    }
}

impl hil::Board for Board {
    fn on_enable(&mut self) {
        self.enables += 1;
    }

    fn on_disable(&mut self) {
        self.disables += 1;
    }

    fn custom_transaction(
        &mut self,
        _device: &SpiDevice,
        write: &[u8],
        read: &mut [u8],
        _duplex: Duplex,
    ) -> Result<(), BusError> {
        self.custom_writes.push(write.to_vec());
        for (r, w) in read.iter_mut().zip(write.iter()) {
            *r = *w;
        }
        Ok(())
    }
}

/// A board that keeps the default custom driver.
pub struct PlainBoard;

impl hil::Board for PlainBoard {
    fn on_enable(&mut self) {}
    fn on_disable(&mut self) {}
}
