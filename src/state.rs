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

//! The protocol state machine.
//!
//! A transfer is assembled from one `TransferStart` and any number of
//! `TransferContinue` requests into the write context. Once every declared
//! byte has arrived the SPI transaction runs exactly once, filling the read
//! context, which is then streamed back one response frame at a time. The
//! read data stays resident until the next transfer so that the host can ask
//! for the whole response again with `RestartResponse`.

use crate::config::Config;
use crate::config::SpiDevice;
use crate::hil::Board;
use crate::hil::BusError;
use crate::hil::ChipSelect;
use crate::hil::Duplex;
use crate::hil::SpiBus;
use crate::protocol::packet::max_payload;
use crate::protocol::packet::ChipSelectFlags;
use crate::protocol::packet::Packet;
use crate::protocol::packet::Request;
use crate::protocol::packet::FULL_DUPLEX_ENABLED;
use crate::protocol::packet::TRANSFER_CONTINUE_HEADER_LEN;
use crate::protocol::packet::TRANSFER_START_RESPONSE_HEADER_LEN;
use crate::protocol::status::StatusCode;
use crate::transfer::TransferContext;

use log::debug;
use log::warn;

/// What the bridge will do next.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// Waiting for a request.
    Idle,

    /// A `ConfigResponse` is owed.
    SendConfiguration,

    /// A `ChipSelectResponse` is owed.
    SendChipSelectResponse,

    /// The write data is complete; the transaction has to run.
    StartSpi,

    /// The first response frame is owed.
    StartResponse,

    /// More read data is owed.
    ContinueResponse,
}

/// What a request needs to know beyond the protocol state.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    /// Protocol limits.
    pub config: &'a Config,

    /// The targeted peripheral, if the device table has one at the current
    /// index.
    pub device: Option<&'a SpiDevice>,

    /// The effective enable.
    pub enabled: bool,
}

/// Protocol state of one bridge. `W` and `R` are the write and read buffer
/// capacities.
pub struct ProtocolState<const W: usize, const R: usize> {
    mode: Mode,
    status: StatusCode,
    duplex: Duplex,
    current_device: usize,
    write_ctx: TransferContext<W>,
    read_ctx: TransferContext<R>,
}

impl<const W: usize, const R: usize> ProtocolState<W, R> {
    /// Creates an idle state targeting the first peripheral.
    pub const fn new() -> Self {
        Self {
            mode: Mode::Idle,
            status: StatusCode::Success,
            duplex: Duplex::Half,
            current_device: 0,
            write_ctx: TransferContext::new(),
            read_ctx: TransferContext::new(),
        }
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Status of the last operation.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Index of the peripheral that transfers go to.
    pub fn current_device(&self) -> usize {
        self.current_device
    }

    /// Retargets subsequent transfers.
    pub fn set_current_device(&mut self, index: usize) {
        self.current_device = index;
    }

    /// The write side of the current transfer.
    pub fn write_ctx(&self) -> &TransferContext<W> {
        &self.write_ctx
    }

    /// The read side of the current transfer.
    pub fn read_ctx(&self) -> &TransferContext<R> {
        &self.read_ctx
    }

    /// Returns true iff response frames are owed.
    pub fn response_in_progress(&self) -> bool {
        matches!(self.mode, Mode::StartResponse | Mode::ContinueResponse)
    }

    /// Marks a config or chip select response as sent.
    pub fn finish_reply(&mut self) {
        self.mode = Mode::Idle;
    }

    /// Starts a new transfer with the given sizes and clears the status.
    pub fn setup_transfer(&mut self, write_count: usize, read_count: usize) {
        self.status = StatusCode::Success;
        self.write_ctx.reset(write_count);
        self.read_ctx.reset(read_count);
    }

    /// Drops any transfer in flight.
    pub fn reset_interface(&mut self) {
        self.setup_transfer(0, 0);
        self.duplex = Duplex::Half;
        self.mode = Mode::Idle;
    }

    /// Arms the response stream with `status`. On error no read data is
    /// sent.
    pub fn setup_transfer_response(&mut self, status: StatusCode) {
        self.status = status;
        self.read_ctx.rewind();
        self.mode = Mode::StartResponse;
        if !status.is_success() {
            self.read_ctx.reset(0);
        }
    }

    /// Handles the frame in `rx` and consumes it.
    pub fn process_rx_packet<C: ChipSelect>(
        &mut self,
        rx: &mut Packet,
        ctx: &RequestContext<'_>,
        cs: &mut C,
    ) {
        let len = rx.packet_size();
        match rx.decode() {
            Ok(request) => self.process_request(request, ctx, cs),
            Err(e) => {
                warn!("usb_spi: unexpected packet ({} bytes): {:?}", len, e);
                self.setup_transfer_response(StatusCode::RxUnexpectedPacket);
            }
        }
        rx.clear();
    }

    /// Handles one decoded request.
    pub fn process_request<C: ChipSelect>(
        &mut self,
        request: Request<'_>,
        ctx: &RequestContext<'_>,
        cs: &mut C,
    ) {
        self.mode = Mode::Idle;

        match request {
            Request::GetConfig => self.mode = Mode::SendConfiguration,
            // Recovers from lost frames without repeating the transaction.
            Request::RestartResponse => self.setup_transfer_response(self.status),
            Request::TransferStart {
                write_count,
                read_count,
                data,
            } => {
                debug!("usb_spi: start write={} read={:#x}", write_count, read_count);
                if let Err(status) = self.start_transfer(write_count, read_count, data, ctx) {
                    self.setup_transfer_response(status);
                    return;
                }
                self.check_write_complete();
            }
            Request::TransferContinue { data_index, data } => {
                if self.status.is_success() {
                    self.status = self.continue_transfer(data_index, data);
                }
                if !self.status.is_success() {
                    self.setup_transfer_response(self.status);
                    return;
                }
                self.check_write_complete();
            }
            Request::ChipSelect { flags } => {
                match ctx.device {
                    Some(device) => cs.set_level(device, !flags.contains(ChipSelectFlags::ASSERT)),
                    None => warn!("usb_spi: no device {} for chip select", self.current_device),
                }
                self.mode = Mode::SendChipSelectResponse;
            }
        }
    }

    fn start_transfer(
        &mut self,
        write_count: u16,
        read_count: u16,
        data: &[u8],
        ctx: &RequestContext<'_>,
    ) -> Result<(), StatusCode> {
        let config = ctx.config;
        if !ctx.enabled || ctx.device.is_none() {
            return Err(StatusCode::Disabled);
        }
        if write_count > config.max_write_count {
            return Err(StatusCode::WriteCountInvalid);
        }

        let (duplex, read_size) = if read_count == FULL_DUPLEX_ENABLED {
            if !config.full_duplex {
                return Err(StatusCode::UnsupportedFullDuplex);
            }
            // Every written byte is read back, so the read buffer has to
            // hold the whole write.
            if write_count > config.max_read_count {
                return Err(StatusCode::ReadCountInvalid);
            }
            (Duplex::Full, write_count)
        } else {
            if read_count > config.max_read_count {
                return Err(StatusCode::ReadCountInvalid);
            }
            (Duplex::Half, read_count)
        };

        self.setup_transfer(usize::from(write_count), usize::from(read_size));
        self.duplex = duplex;
        self.write_ctx
            .absorb(data)
            .map_err(|_| StatusCode::RxDataOverflow)
    }

    fn continue_transfer(&mut self, data_index: u16, data: &[u8]) -> StatusCode {
        if self.write_ctx.is_complete() {
            warn!("usb_spi: continue with no write pending");
            return StatusCode::RxUnexpectedPacket;
        }
        if usize::from(data_index) != self.write_ctx.transfer_index() {
            warn!(
                "usb_spi: continue at {} but {} bytes received",
                data_index,
                self.write_ctx.transfer_index()
            );
            return StatusCode::RxBadDataIndex;
        }
        match self.write_ctx.absorb(data) {
            Ok(()) => StatusCode::Success,
            Err(_) => StatusCode::RxDataOverflow,
        }
    }

    fn check_write_complete(&mut self) {
        if self.write_ctx.is_complete() {
            self.mode = Mode::StartSpi;
        }
    }

    /// Runs the assembled transaction and arms the response.
    pub fn run_spi_transaction<S: SpiBus, B: Board>(
        &mut self,
        device: Option<&SpiDevice>,
        spi: &mut S,
        board: &mut B,
    ) {
        let write = self.write_ctx.data();
        let read = self.read_ctx.data_mut();
        let result = match device {
            Some(device) if device.is_custom() => {
                board.custom_transaction(device, write, read, self.duplex)
            }
            Some(device) => spi.transaction(device, write, read, self.duplex),
            None => Err(BusError::unknown()),
        };
        if let Err(e) = result {
            warn!("usb_spi: transaction failed: {:?}", e);
        }
        self.setup_transfer_response(StatusCode::from_bus_result(result));
    }

    /// Builds the next response frame into `tx`.
    ///
    /// Returns false, leaving `tx` untouched, if no response is in progress.
    pub fn create_transfer_response(&mut self, tx: &mut Packet) -> bool {
        if !self.response_in_progress() {
            return false;
        }

        // Transfer sizes come from u16 counts, so indices fit.
        let index = self.read_ctx.transfer_index();
        if index == 0 {
            let chunk = self
                .read_ctx
                .emit(max_payload(TRANSFER_START_RESPONSE_HEADER_LEN));
            let sent = tx.encode_transfer_start_response(self.status, chunk);
            self.read_ctx.advance(sent);
        } else if index < self.read_ctx.transfer_size() {
            let chunk = self.read_ctx.emit(max_payload(TRANSFER_CONTINUE_HEADER_LEN));
            let sent = tx.encode_transfer_continue_response(index as u16, chunk);
            self.read_ctx.advance(sent);
        }

        self.mode = if self.read_ctx.is_complete() {
            Mode::Idle
        } else {
            Mode::ContinueResponse
        };
        debug!(
            "usb_spi: response {}/{} bytes",
            self.read_ctx.transfer_index(),
            self.read_ctx.transfer_size()
        );
        true
    }
}

impl<const W: usize, const R: usize> Default for ProtocolState<W, R> {
    fn default() -> Self {
        Self::new()
    }
}
