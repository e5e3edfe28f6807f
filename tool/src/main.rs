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

use clap::App;
use clap::AppSettings;
use clap::Arg;
use clap::ArgMatches;
use clap::SubCommand;

use log::debug;
use log::LevelFilter;

use usbspi::control::ControlVerb;
use usbspi::control::SetupRequest;
use usbspi::deferred::DeferredCall;
use usbspi::deferred::Events;
use usbspi::hil;
use usbspi::hil::BusError;
use usbspi::hil::Duplex;
use usbspi::host;
use usbspi::host::ResponseAssembler;
use usbspi::io::StdWrite;
use usbspi::io::Write;
use usbspi::protocol::packet::Packet;
use usbspi::protocol::packet::Request;
use usbspi::protocol::packet::Response;
use usbspi::protocol::packet::FULL_DUPLEX_ENABLED;
use usbspi::protocol::wire::FromWire;
use usbspi::Config;
use usbspi::SpiDevice;
use usbspi::UsbFlags;
use usbspi::UsbSpi;

use std::collections::VecDeque;

fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(digits)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .chunks(1)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_count(matches: &ArgMatches) -> u16 {
    if matches.is_present("full-duplex") {
        return FULL_DUPLEX_ENABLED;
    }
    matches
        .value_of("read")
        .unwrap_or("0")
        .parse()
        .expect("read count must be a number below 65535")
}

fn frames(write: &[u8], read_count: u16, raw: bool) {
    let requests = host::transfer_requests(write, read_count).expect("write data too long");
    let mut packet = Packet::new();
    let mut raw_out = StdWrite(std::io::stdout());

    for request in requests {
        debug!("{:?}", request);
        packet.encode(&request).expect("failed to encode request");
        if raw {
            raw_out
                .write_bytes(packet.frame())
                .expect("failed to write frame");
        } else {
            println!("{}", to_hex(packet.frame()));
        }
    }
}

fn decode(frame: &[u8]) {
    if let Ok(request) = Request::from_wire(frame) {
        println!("request {:?}", request);
        return;
    }
    match Response::from_wire(frame) {
        Ok(response) => println!("response {:?}", response),
        Err(e) => {
            eprintln!("not a USB-SPI frame: {:?}", e);
            std::process::exit(1);
        }
    }
}

/// In-memory bulk endpoints.
struct Loopback {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
}

impl hil::Transport for Loopback {
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
        let frame = self.rx.pop_front()?;
        buf[..frame.len()].copy_from_slice(&frame);
        Some(frame.len())
    }

    fn transmit(&mut self, frame: &[u8]) {
        self.tx.push(frame.to_vec());
    }

    fn tx_ready(&self) -> bool {
        true
    }
}

/// A peripheral that reads back the last bytes written to it.
struct EchoSpi {
    last_write: Vec<u8>,
}

impl hil::SpiBus for EchoSpi {
    fn transaction(
        &mut self,
        device: &SpiDevice,
        write: &[u8],
        read: &mut [u8],
        duplex: Duplex,
    ) -> Result<(), BusError> {
        debug!("{}: {:?} write {}", device.name, duplex, to_hex(write));
        let source = match duplex {
            Duplex::Full => write.to_vec(),
            Duplex::Half => std::mem::replace(&mut self.last_write, write.to_vec()),
        };
        for (i, byte) in read.iter_mut().enumerate() {
            *byte = source.get(i).copied().unwrap_or(0xff);
        }
        Ok(())
    }
}

struct NoChipSelect;

impl hil::ChipSelect for NoChipSelect {
    fn set_level(&mut self, device: &SpiDevice, high: bool) {
        debug!("{}: chip select {}", device.name, if high { "high" } else { "low" });
    }
}

struct NoBoard;

impl hil::Board for NoBoard {
    fn on_enable(&mut self) {}
    fn on_disable(&mut self) {}
}

const DEVICES: &[SpiDevice] = &[SpiDevice {
    name: "echo",
    chip_select: 0,
    flags: UsbFlags::ENABLED,
}];

/// Runs a transfer through a bridge wired to an echo peripheral and prints
/// every frame on the wire.
fn loopback(write: &[u8], read_count: u16) {
    let call = DeferredCall::new();
    let transport = Loopback {
        rx: VecDeque::new(),
        tx: Vec::new(),
    };
    let spi = EchoSpi {
        last_write: Vec::new(),
    };
    let mut bridge: UsbSpi<_, _, _, _> = UsbSpi::new(
        transport,
        spi,
        NoChipSelect,
        NoBoard,
        DEVICES,
        Config::default(),
        &call,
    );
    bridge.set_device_enabled(true);
    bridge
        .handle_control(&SetupRequest::usb_spi(ControlVerb::Enable, 0, 0))
        .expect("control request rejected");
    bridge.service();

    let requests = host::transfer_requests(write, read_count).expect("write data too long");
    let mut read = vec![0; requests.expected_read_len()];
    let mut packet = Packet::new();
    for request in requests {
        packet.encode(&request).expect("failed to encode request");
        println!("> {}", to_hex(packet.frame()));
        bridge.transport().rx.push_back(packet.frame().to_vec());
        call.set(Events::RX);
        bridge.service();
    }
    while bridge.state().response_in_progress() {
        call.set(Events::TX);
        bridge.service();
    }

    let mut assembler = ResponseAssembler::new(&mut read);
    for frame in bridge.transport().tx.drain(..) {
        println!("< {}", to_hex(&frame));
        if let Err(e) = assembler.push_frame(&frame) {
            eprintln!("bad response: {:?}", e);
            std::process::exit(1);
        }
    }
    println!("read {}", to_hex(assembler.data()));
}

fn main() {
    let hex_arg = |name: &'static str, help: &'static str| -> Arg<'static, 'static> {
        Arg::with_name(name)
            .long(name)
            .help(help)
            .required(true)
            .takes_value(true)
    };
    let transfer_args = |cmd: App<'static, 'static>| -> App<'static, 'static> {
        cmd.arg(hex_arg("write", "write data, in hex"))
            .arg(
                Arg::with_name("read")
                    .long("read")
                    .help("number of bytes to read after the write")
                    .takes_value(true)
                    .conflicts_with("full-duplex"),
            )
            .arg(
                Arg::with_name("full-duplex")
                    .long("full-duplex")
                    .help("read back one byte per written byte"),
            )
    };

    let app = App::new("USB-SPI Tool")
        .version("0.1")
        .about("Encodes and decodes USB-SPI bridge frames")
        .setting(AppSettings::ArgRequiredElseHelp)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            transfer_args(SubCommand::with_name("frames"))
                .about("Print the request frames of a transfer")
                .arg(
                    Arg::with_name("raw")
                        .long("raw")
                        .help("write binary frames instead of hex lines"),
                ),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("Decode one frame")
                .arg(
                    Arg::with_name("frame")
                        .help("frame bytes, in hex")
                        .required(true)
                        .multiple(true),
                ),
        )
        .subcommand(
            transfer_args(SubCommand::with_name("loopback"))
                .about("Run a transfer against an echo peripheral"),
        );
    let matches = app.get_matches();

    let level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Some(matches) = matches.subcommand_matches("frames") {
        let write = parse_hex(matches.value_of("write").unwrap()).expect("invalid write data");
        frames(&write, read_count(matches), matches.is_present("raw"));
    } else if let Some(matches) = matches.subcommand_matches("decode") {
        let text: Vec<&str> = matches.values_of("frame").unwrap().collect();
        let frame = parse_hex(&text.join(" ")).expect("invalid frame");
        decode(&frame);
    } else if let Some(matches) = matches.subcommand_matches("loopback") {
        let write = parse_hex(matches.value_of("write").unwrap()).expect("invalid write data");
        loopback(&write, read_count(matches));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_round_trip() {
        assert_eq!(parse_hex("02 00:ff").unwrap(), vec![0x02, 0x00, 0xff]);
        assert_eq!(parse_hex("abc"), Err(hex::FromHexError::OddLength));
        assert!(parse_hex("zz").is_err());
        assert_eq!(to_hex(&[0x05, 0x00, 0x10]), "05 00 10");
    }
}
