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

//! The bridge.
//!
//! A board wires its interrupt handlers to [`DeferredCall::set`] and calls
//! [`UsbSpi::service`] from its main loop:
//!
//! ```text
//! static DEFERRED: DeferredCall = DeferredCall::new();
//!
//! fn usb_rx_isr() { DEFERRED.set(Events::RX); }
//! fn usb_tx_isr() { DEFERRED.set(Events::TX); }
//! fn usb_reset_isr() { DEFERRED.set(Events::RESET); }
//!
//! let mut bridge = UsbSpi::new(transport, spi, gpio, board, DEVICES, Config::default(), &DEFERRED);
//! bridge.set_device_enabled(true);
//! loop {
//!     bridge.service();
//!     wait_for_interrupt();
//! }
//! ```
//!
//! [`DeferredCall::set`]: ../deferred/struct.DeferredCall.html#method.set
//! [`UsbSpi::service`]: struct.UsbSpi.html#method.service

use crate::config::Config;
use crate::config::SpiDevice;
use crate::config::DEFAULT_BUFFER_SIZE;
use crate::control;
use crate::control::ControlError;
use crate::control::ControlVerb;
use crate::control::SetupRequest;
use crate::deferred::DeferredCall;
use crate::deferred::Events;
use crate::gate::EnableGate;
use crate::hil::Board;
use crate::hil::ChipSelect;
use crate::hil::SpiBus;
use crate::hil::Transport;
use crate::protocol::packet::ConfigResponse;
use crate::protocol::packet::Features;
use crate::protocol::packet::Packet;
use crate::protocol::status::StatusCode;
use crate::state::Mode;
use crate::state::ProtocolState;
use crate::state::RequestContext;

use log::debug;
use log::info;
use log::warn;

/// One USB-SPI interface bridged to one set of SPI peripherals.
///
/// `W` and `R` are the write and read buffer capacities.
pub struct UsbSpi<
    'a,
    T,
    S,
    C,
    B,
    const W: usize = DEFAULT_BUFFER_SIZE,
    const R: usize = DEFAULT_BUFFER_SIZE,
> {
    transport: T,
    spi: S,
    cs: C,
    board: B,
    devices: &'a [SpiDevice],
    config: Config,
    gate: EnableGate,
    state: ProtocolState<W, R>,
    rx: Packet,
    tx: Packet,
    deferred_call: &'a DeferredCall,
}

impl<'a, T, S, C, B, const W: usize, const R: usize> UsbSpi<'a, T, S, C, B, W, R>
where
    T: Transport,
    S: SpiBus,
    C: ChipSelect,
    B: Board,
{
    /// Creates a disabled bridge. The counts in `config` are clamped to the
    /// buffer capacities.
    pub fn new(
        transport: T,
        spi: S,
        cs: C,
        board: B,
        devices: &'a [SpiDevice],
        config: Config,
        deferred_call: &'a DeferredCall,
    ) -> Self {
        let config = config.clamped(W, R);
        Self {
            transport,
            spi,
            cs,
            board,
            devices,
            config,
            gate: EnableGate::new(config.ignore_host_side_enable),
            state: ProtocolState::new(),
            rx: Packet::new(),
            tx: Packet::new(),
            deferred_call,
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The protocol mode.
    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    /// Status of the last operation.
    pub fn status(&self) -> StatusCode {
        self.state.status()
    }

    /// The protocol state.
    pub fn state(&self) -> &ProtocolState<W, R> {
        &self.state
    }

    /// Returns true iff the bridge is enabled as of the last pass.
    pub fn is_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// The transport driver.
    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The SPI driver.
    pub fn spi(&mut self) -> &mut S {
        &mut self.spi
    }

    /// The chip select driver.
    pub fn chip_select(&mut self) -> &mut C {
        &mut self.cs
    }

    /// The board.
    pub fn board(&mut self) -> &mut B {
        &mut self.board
    }

    /// Sets the board's enable request and schedules a pass to apply it.
    pub fn set_device_enabled(&mut self, enabled: bool) {
        self.gate.set_device(enabled);
        self.deferred_call.set(Events::SCHEDULE);
    }

    /// Handles a vendor control request on the interface.
    ///
    /// On success the targeted peripheral and the host's enable request are
    /// updated and any transfer in flight is dropped. Rejected requests
    /// change nothing; the caller should stall the control endpoint.
    pub fn handle_control(&mut self, setup: &SetupRequest) -> Result<(), ControlError> {
        let accepted = control::validate(setup, self.devices, &self.config).map_err(|e| {
            warn!("usb_spi: rejected control request: {:?}", e);
            e
        })?;

        info!(
            "usb_spi: host {} device {}",
            accepted.verb, accepted.device_index
        );
        self.state.set_current_device(accepted.device_index);
        self.gate.set_host(accepted.verb == ControlVerb::Enable);
        if !self.gate.ignores_host() {
            self.deferred_call.set(Events::SCHEDULE);
        }
        self.state.reset_interface();
        Ok(())
    }

    /// Drops any transfer in flight after a USB reset.
    pub fn handle_reset(&mut self) {
        info!("usb_spi: interface reset");
        self.state.reset_interface();
        self.rx.clear();
        self.tx.clear();
    }

    /// Runs one pass for the pending events, if there are any.
    ///
    /// Returns whether a pass ran.
    pub fn service(&mut self) -> bool {
        let events = self.deferred_call.take();
        if events.is_empty() {
            return false;
        }
        if events.contains(Events::RESET) {
            self.handle_reset();
        }
        self.deferred();
        true
    }

    /// One pass: apply enable changes, handle a waiting frame, then send at
    /// most one frame.
    pub fn deferred(&mut self) {
        self.gate.update(&mut self.board);

        let transport = &mut self.transport;
        self.rx.fill_from(|buf| transport.receive(buf));
        if !self.rx.is_empty() {
            let ctx = RequestContext {
                config: &self.config,
                device: self.devices.get(self.state.current_device()),
                enabled: self.gate.is_enabled(),
            };
            self.state.process_rx_packet(&mut self.rx, &ctx, &mut self.cs);
            debug!("usb_spi: mode {:?}", self.state.mode());
        }

        match self.state.mode() {
            Mode::SendConfiguration => {
                let response = self.config_response();
                self.tx.encode_config_response(&response);
                self.send_reply();
                return;
            }
            Mode::SendChipSelectResponse => {
                self.tx.encode_chip_select_response();
                self.send_reply();
                return;
            }
            Mode::StartSpi => {
                let device = self.devices.get(self.state.current_device());
                self.state
                    .run_spi_transaction(device, &mut self.spi, &mut self.board);
            }
            _ => {}
        }

        if self.state.response_in_progress()
            && self.transport.tx_ready()
            && self.state.create_transfer_response(&mut self.tx)
        {
            self.transmit();
        }
    }

    fn config_response(&self) -> ConfigResponse {
        let mut features = Features::empty();
        features.set(Features::FULL_DUPLEX_SUPPORTED, self.config.full_duplex);
        ConfigResponse {
            max_write_count: self.config.max_write_count,
            max_read_count: self.config.max_read_count,
            features,
        }
    }

    // Sends a config or chip select response. If the IN endpoint is busy the
    // mode is kept and the reply goes out on a later pass.
    fn send_reply(&mut self) {
        if !self.transport.tx_ready() {
            self.tx.clear();
            return;
        }
        self.transmit();
        self.state.finish_reply();
    }

    fn transmit(&mut self) {
        if !self.tx.is_empty() {
            self.transport.transmit(self.tx.frame());
        }
        self.tx.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::UsbFlags;
    use crate::fake;
    use crate::hil::BusError;
    use crate::hil::Duplex;
    use crate::host::transfer_requests;
    use crate::host::ResponseAssembler;
    use crate::protocol::packet::ChipSelectFlags;
    use crate::protocol::packet::Request;
    use crate::protocol::packet::FULL_DUPLEX_ENABLED;

    const DEVICES: &[SpiDevice] = &[
        SpiDevice {
            name: "ap",
            chip_select: 4,
            flags: UsbFlags::ENABLED,
        },
        SpiDevice {
            name: "ec",
            chip_select: 5,
            flags: UsbFlags::ENABLED,
        },
        SpiDevice {
            name: "custom",
            chip_select: 6,
            flags: UsbFlags::from_bits_truncate(
                UsbFlags::ENABLED.bits() | UsbFlags::CUSTOM_SPI_DEVICE.bits(),
            ),
        },
    ];

    type Bridge<'a> = UsbSpi<'a, fake::Transport, fake::Spi, fake::ChipSelect, fake::Board, 256, 256>;

    fn bridge(call: &DeferredCall, config: Config) -> Bridge<'_> {
        UsbSpi::new(
            fake::Transport::new(),
            fake::Spi::new(),
            fake::ChipSelect::new(),
            fake::Board::new(),
            DEVICES,
            config,
            call,
        )
    }

    fn enabled_bridge(call: &DeferredCall, config: Config) -> Bridge<'_> {
        let mut usb_spi = bridge(call, config);
        usb_spi.set_device_enabled(true);
        usb_spi
            .handle_control(&SetupRequest::usb_spi(ControlVerb::Enable, 0, 0))
            .unwrap();
        assert!(usb_spi.service());
        assert!(usb_spi.is_enabled());
        usb_spi
    }

    fn send(usb_spi: &mut Bridge<'_>, request: &Request<'_>) {
        let mut packet = Packet::new();
        packet.encode(request).unwrap();
        usb_spi.transport().push_rx(packet.frame());
        usb_spi.deferred_call.set(Events::RX);
        usb_spi.service();
    }

    // Sends a whole transfer, then drains the response.
    fn transfer(usb_spi: &mut Bridge<'_>, write: &[u8], read_count: u16) -> (Vec<u8>, Vec<Vec<u8>>) {
        let requests = transfer_requests(write, read_count).unwrap();
        let mut read = vec![0; requests.expected_read_len()];
        for request in requests {
            send(usb_spi, &request);
        }
        drain(usb_spi);
        let frames = usb_spi.transport().take_tx();

        let mut asm = ResponseAssembler::new(&mut read);
        let mut complete = false;
        for frame in &frames {
            complete = asm.push_frame(frame).unwrap();
        }
        assert!(complete);
        (read, frames)
    }

    fn drain(usb_spi: &mut Bridge<'_>) {
        while usb_spi.state().response_in_progress() {
            usb_spi.deferred_call.set(Events::TX);
            usb_spi.service();
        }
    }

    #[test]
    fn get_config() {
        let call = DeferredCall::new();
        let mut usb_spi = bridge(&call, Config {
            max_read_count: 64,
            ..Default::default()
        });
        send(&mut usb_spi, &Request::GetConfig);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x01, 0x00, 0x00, 0x01, 0x40, 0x00, 0x01, 0x00]]
        );
        assert_eq!(usb_spi.mode(), Mode::Idle);
    }

    #[test]
    fn short_transfer() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config {
            max_write_count: 64,
            max_read_count: 64,
            full_duplex: false,
            ..Default::default()
        });
        usb_spi.spi().read_data = vec![0x11, 0x22];

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 4,
                read_count: 2,
                data: &[0xaa, 0xbb, 0xcc, 0xdd],
            },
        );

        assert_eq!(
            usb_spi.spi().transactions,
            vec![fake::Transaction {
                chip_select: 4,
                write: vec![0xaa, 0xbb, 0xcc, 0xdd],
                read_len: 2,
                duplex: Duplex::Half,
            }]
        );
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x00, 0x00, 0x11, 0x22]]
        );
        assert_eq!(usb_spi.mode(), Mode::Idle);
    }

    #[test]
    fn long_write_runs_once_after_last_frame() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        let write: Vec<u8> = (0..200).map(|i| i as u8).collect();

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 200,
                read_count: 0,
                data: &write[..50],
            },
        );
        for index in (50..200).step_by(50) {
            assert!(usb_spi.spi().transactions.is_empty());
            send(
                &mut usb_spi,
                &Request::TransferContinue {
                    data_index: index as u16,
                    data: &write[index..index + 50],
                },
            );
        }

        assert_eq!(usb_spi.spi().transactions.len(), 1);
        assert_eq!(usb_spi.spi().transactions[0].write, write);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x00, 0x00]]
        );
    }

    #[test]
    fn empty_start_then_continues() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        let write: Vec<u8> = (0..200).map(|i| (i * 7) as u8).collect();

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 200,
                read_count: 0,
                data: &[],
            },
        );
        assert_eq!(usb_spi.mode(), Mode::Idle);
        for index in (0..200).step_by(50) {
            assert!(usb_spi.spi().transactions.is_empty());
            send(
                &mut usb_spi,
                &Request::TransferContinue {
                    data_index: index as u16,
                    data: &write[index..index + 50],
                },
            );
        }

        assert_eq!(usb_spi.spi().transactions.len(), 1);
        assert_eq!(usb_spi.spi().transactions[0].write, write);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x00, 0x00]]
        );

        // A repeated final continue is refused instead of rerunning the write.
        send(
            &mut usb_spi,
            &Request::TransferContinue {
                data_index: 200,
                data: &[],
            },
        );
        assert_eq!(usb_spi.spi().transactions.len(), 1);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x08, 0x00]]
        );
    }

    #[test]
    fn overflow_on_continue() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 4,
                read_count: 0,
                data: &[1, 2],
            },
        );
        assert!(usb_spi.transport().take_tx().is_empty());
        send(
            &mut usb_spi,
            &Request::TransferContinue {
                data_index: 2,
                data: &[3, 4, 5],
            },
        );

        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x07, 0x00]]
        );
        assert!(usb_spi.spi().transactions.is_empty());
    }

    #[test]
    fn long_read_and_restart() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        let data: Vec<u8> = (0..150).map(|i| (i * 3) as u8).collect();
        usb_spi.spi().read_data = data.clone();

        let (read, frames) = transfer(&mut usb_spi, &[0x03, 0x00, 0x10, 0x00], 150);
        assert_eq!(read, data);
        assert_eq!(frames.len(), 3);

        // The host lost a frame and asks for the response again.
        send(&mut usb_spi, &Request::RestartResponse);
        drain(&mut usb_spi);
        assert_eq!(usb_spi.transport().take_tx(), frames);
        assert_eq!(usb_spi.spi().transactions.len(), 1);
    }

    #[test]
    fn full_duplex() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        usb_spi.spi().read_data = vec![9; 100];

        let (read, _) = transfer(&mut usb_spi, &[1; 100], FULL_DUPLEX_ENABLED);
        assert_eq!(read, vec![9; 100]);
        assert_eq!(usb_spi.spi().transactions[0].duplex, Duplex::Full);
        assert_eq!(usb_spi.spi().transactions[0].read_len, 100);
    }

    #[test]
    fn full_duplex_unsupported() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config {
            full_duplex: false,
            ..Default::default()
        });
        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 1,
                read_count: FULL_DUPLEX_ENABLED,
                data: &[0x9f],
            },
        );
        assert!(usb_spi.spi().transactions.is_empty());
        assert_eq!(usb_spi.status(), StatusCode::UnsupportedFullDuplex);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x09, 0x00]]
        );
    }

    #[test]
    fn overflow_and_bad_frames() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 1,
                read_count: 0,
                data: &[1, 2],
            },
        );
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x07, 0x00]]
        );

        usb_spi.transport().push_rx(&[0x05]);
        call.set(Events::RX);
        usb_spi.service();
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x08, 0x00]]
        );
        assert!(usb_spi.spi().transactions.is_empty());
    }

    #[test]
    fn bus_errors_are_reported() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        usb_spi.spi().result = Err(BusError::Busy);

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 1,
                read_count: 8,
                data: &[0x05],
            },
        );
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x02, 0x00]]
        );
    }

    #[test]
    fn chip_select_follows_current_device() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        usb_spi
            .handle_control(&SetupRequest::usb_spi(ControlVerb::Enable, 1, 0))
            .unwrap();
        usb_spi.service();

        send(
            &mut usb_spi,
            &Request::ChipSelect {
                flags: ChipSelectFlags::ASSERT,
            },
        );
        assert_eq!(usb_spi.chip_select().levels, vec![(5, false)]);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x08, 0x00, 0x00, 0x00]]
        );
    }

    #[test]
    fn custom_device() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        usb_spi
            .handle_control(&SetupRequest::usb_spi(ControlVerb::Enable, 2, 0))
            .unwrap();
        usb_spi.service();

        let (read, _) = transfer(&mut usb_spi, &[7, 8, 9], FULL_DUPLEX_ENABLED);
        assert_eq!(read, vec![7, 8, 9]);
        assert!(usb_spi.spi().transactions.is_empty());
        assert_eq!(usb_spi.board().custom_writes, vec![vec![7, 8, 9]]);
    }

    #[test]
    fn reset_drops_transfer() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());

        send(
            &mut usb_spi,
            &Request::TransferStart {
                write_count: 100,
                read_count: 0,
                data: &[0; 10],
            },
        );
        call.set(Events::RESET);
        usb_spi.service();
        assert_eq!(usb_spi.mode(), Mode::Idle);
        assert_eq!(usb_spi.state().write_ctx().transfer_size(), 0);
        assert_eq!(usb_spi.state().read_ctx().transfer_size(), 0);

        send(&mut usb_spi, &Request::GetConfig);
        let frames = usb_spi.transport().take_tx();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..2], &[0x01, 0x00]);
    }

    #[test]
    fn disable_and_reenable() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        let start = Request::TransferStart {
            write_count: 1,
            read_count: 1,
            data: &[0xab],
        };

        usb_spi.set_device_enabled(false);
        send(&mut usb_spi, &start);
        assert_eq!(usb_spi.board().disables, 1);
        assert_eq!(
            usb_spi.transport().take_tx(),
            vec![vec![0x05, 0x00, 0x05, 0x00]]
        );

        usb_spi.set_device_enabled(true);
        send(&mut usb_spi, &start);
        assert_eq!(usb_spi.board().enables, 2);
        assert_eq!(usb_spi.status(), StatusCode::Success);

        // Host-side disable works the same way.
        usb_spi
            .handle_control(&SetupRequest::usb_spi(ControlVerb::Disable, 0, 0))
            .unwrap();
        send(&mut usb_spi, &start);
        assert_eq!(usb_spi.status(), StatusCode::Disabled);
        assert_eq!(usb_spi.spi().transactions.len(), 1);
    }

    #[test]
    fn rejected_control_changes_nothing() {
        let call = DeferredCall::new();
        let mut usb_spi = bridge(&call, Config::default());
        let bad = SetupRequest {
            b_request: 9,
            ..SetupRequest::usb_spi(ControlVerb::Enable, 1, 0)
        };
        assert_eq!(
            usb_spi.handle_control(&bad),
            Err(ControlError::UnknownVerb(9))
        );
        assert_eq!(usb_spi.state().current_device(), 0);
        assert!(!call.has_pending());
    }

    #[test]
    fn ignore_host_side_enable() {
        let call = DeferredCall::new();
        let mut usb_spi = bridge(&call, Config {
            ignore_host_side_enable: true,
            ..Default::default()
        });
        usb_spi.set_device_enabled(true);
        assert!(usb_spi.service());
        assert!(usb_spi.is_enabled());
        assert_eq!(usb_spi.board().enables, 1);

        usb_spi
            .handle_control(&SetupRequest::usb_spi(ControlVerb::Disable, 0, 0))
            .unwrap();
        assert!(!call.has_pending());
        assert!(!usb_spi.service());
        assert!(usb_spi.is_enabled());
    }

    #[test]
    fn busy_endpoint_defers_response() {
        let call = DeferredCall::new();
        let mut usb_spi = enabled_bridge(&call, Config::default());
        usb_spi.transport().ready = false;

        send(&mut usb_spi, &Request::GetConfig);
        assert!(usb_spi.transport().tx.is_empty());
        assert_eq!(usb_spi.mode(), Mode::SendConfiguration);

        usb_spi.transport().ready = true;
        call.set(Events::TX);
        usb_spi.service();
        assert_eq!(usb_spi.transport().take_tx().len(), 1);
        assert_eq!(usb_spi.mode(), Mode::Idle);
    }
}
