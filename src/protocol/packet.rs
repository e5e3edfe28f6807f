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

//! USB-SPI version 2 packets.
//!
//! Every packet starts with a little-endian `u16` packet id, followed by a
//! kind-specific fixed header and, for transfer packets, a data payload that
//! fills the rest of the frame:
//!
//! | Packet                 | Header after the id                      |
//! | ---------------------- | ---------------------------------------- |
//! | `GetConfig`            | -                                        |
//! | `ConfigResponse`       | max write, max read, feature bitmap      |
//! | `TransferStart`        | write count, read count                  |
//! | `TransferContinue`     | data index                               |
//! | `RestartResponse`      | -                                        |
//! | `TransferStartResponse`| status code                              |
//! | `TransferContinueResponse` | data index                           |
//! | `ChipSelect`           | flags                                    |
//! | `ChipSelectResponse`   | status code                              |

use crate::io;
use crate::io::Cursor;
use crate::io::Read;
use crate::io::Write;
use crate::protocol::status::StatusCode;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::FromWireError;
use crate::protocol::wire::ToWire;
use crate::protocol::wire::ToWireError;
use crate::protocol::wire::WireEnum;

use bitflags::bitflags;
use core::cmp::min;
use core::mem;
use log::warn;
use static_assertions::const_assert;

/// Maximum size of a frame on the bulk endpoints, in bytes.
pub const MAX_PACKET_SIZE: usize = 64;

/// No valid packet is smaller than its packet id.
pub const MIN_PACKET_SIZE: usize = mem::size_of::<u16>();

/// `read_count` value requesting a full duplex transfer: the read length
/// mirrors the write length.
pub const FULL_DUPLEX_ENABLED: u16 = 0xffff;

/// Protocol revision implemented by the packet kinds in this module.
pub const PROTOCOL_VERSION: u16 = 2;

/// Length of a `ConfigResponse`, which has no payload.
pub const CONFIG_RESPONSE_LEN: usize = 4 * mem::size_of::<u16>();

/// Header length of a `TransferStart` command.
pub const TRANSFER_START_HEADER_LEN: usize = 3 * mem::size_of::<u16>();

/// Header length of `TransferContinue` commands and responses.
pub const TRANSFER_CONTINUE_HEADER_LEN: usize = 2 * mem::size_of::<u16>();

/// Header length of a `TransferStartResponse`.
pub const TRANSFER_START_RESPONSE_HEADER_LEN: usize = 2 * mem::size_of::<u16>();

/// Length of `ChipSelect` commands and responses.
pub const CHIP_SELECT_LEN: usize = 2 * mem::size_of::<u16>();

const_assert!(CONFIG_RESPONSE_LEN <= MAX_PACKET_SIZE);
const_assert!(TRANSFER_START_HEADER_LEN < MAX_PACKET_SIZE);

/// Returns how many payload bytes fit in one frame after a header of
/// `header_len` bytes.
pub const fn max_payload(header_len: usize) -> usize {
    MAX_PACKET_SIZE - header_len
}

wire_enum! {
    /// The packet id at the start of every frame.
    pub enum PacketId: u16 {
        /// Host asks for the bridge configuration.
        GetConfig = 0x0000,

        /// Bridge configuration.
        ConfigResponse = 0x0001,

        /// First packet of a transfer.
        TransferStart = 0x0002,

        /// Additional write payload of a transfer.
        TransferContinue = 0x0003,

        /// Host asks for the last response to be sent again.
        RestartResponse = 0x0004,

        /// First packet of a transfer response.
        TransferStartResponse = 0x0005,

        /// Additional read payload of a transfer response.
        TransferContinueResponse = 0x0006,

        /// Assert or deassert chip select.
        ChipSelect = 0x0007,

        /// Acknowledges `ChipSelect`.
        ChipSelectResponse = 0x0008,
    }
}

bitflags! {
    /// Feature bitmap of a `ConfigResponse`.
    pub struct Features: u16 {
        /// Transfers may use `FULL_DUPLEX_ENABLED` as read count.
        const FULL_DUPLEX_SUPPORTED = 1 << 0;
    }
}

bitflags! {
    /// Flags of a `ChipSelect` command.
    pub struct ChipSelectFlags: u16 {
        /// Assert (drive low) chip select. Deasserts when clear.
        const ASSERT = 1 << 0;
    }
}

/// Bridge capabilities reported to the host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConfigResponse {
    /// Largest `write_count` accepted.
    pub max_write_count: u16,

    /// Largest `read_count` accepted, not counting `FULL_DUPLEX_ENABLED`.
    pub max_read_count: u16,

    /// Supported features.
    pub features: Features,
}

/// Something that occupies one frame.
pub trait Message: ToWire {
    /// The packet id.
    fn id(&self) -> PacketId;

    /// Offset of the payload within the frame.
    fn header_len(&self) -> usize;
}

/// A packet sent by the host.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Request<'a> {
    /// `GetConfig`.
    GetConfig,

    /// `RestartResponse`.
    RestartResponse,

    /// `TransferStart`.
    TransferStart {
        /// Total number of bytes to write.
        write_count: u16,
        /// Number of bytes to read, or `FULL_DUPLEX_ENABLED`.
        read_count: u16,
        /// First chunk of write data.
        data: &'a [u8],
    },

    /// `TransferContinue`.
    TransferContinue {
        /// Offset of `data` within the write data.
        data_index: u16,
        /// Next chunk of write data.
        data: &'a [u8],
    },

    /// `ChipSelect`.
    ChipSelect {
        /// Requested chip select state.
        flags: ChipSelectFlags,
    },
}

impl<'a> Request<'a> {
    /// Returns the write payload carried by this request, if any.
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Self::TransferStart { data, .. } | Self::TransferContinue { data, .. } => data,
            _ => &[],
        }
    }
}

impl Message for Request<'_> {
    fn id(&self) -> PacketId {
        match self {
            Self::GetConfig => PacketId::GetConfig,
            Self::RestartResponse => PacketId::RestartResponse,
            Self::TransferStart { .. } => PacketId::TransferStart,
            Self::TransferContinue { .. } => PacketId::TransferContinue,
            Self::ChipSelect { .. } => PacketId::ChipSelect,
        }
    }

    fn header_len(&self) -> usize {
        match self {
            Self::GetConfig | Self::RestartResponse => MIN_PACKET_SIZE,
            Self::TransferStart { .. } => TRANSFER_START_HEADER_LEN,
            Self::TransferContinue { .. } => TRANSFER_CONTINUE_HEADER_LEN,
            Self::ChipSelect { .. } => CHIP_SELECT_LEN,
        }
    }
}

impl<'a> FromWire<'a> for Request<'a> {
    fn from_wire<R: Read<'a>>(mut r: R) -> Result<Self, FromWireError> {
        let id = PacketId::from_wire(&mut r)?;
        match id {
            PacketId::GetConfig => Ok(Self::GetConfig),
            PacketId::RestartResponse => Ok(Self::RestartResponse),
            PacketId::TransferStart => {
                let write_count = r.read_le::<u16>()?;
                let read_count = r.read_le::<u16>()?;
                let data = r.read_remaining()?;
                Ok(Self::TransferStart {
                    write_count,
                    read_count,
                    data,
                })
            }
            PacketId::TransferContinue => {
                let data_index = r.read_le::<u16>()?;
                let data = r.read_remaining()?;
                Ok(Self::TransferContinue { data_index, data })
            }
            PacketId::ChipSelect => {
                let flags = ChipSelectFlags::from_bits_truncate(r.read_le::<u16>()?);
                Ok(Self::ChipSelect { flags })
            }
            // Responses never travel host to device.
            _ => Err(FromWireError::OutOfRange),
        }
    }
}

impl ToWire for Request<'_> {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), ToWireError> {
        w.write_le(self.id().to_wire_value())?;
        match self {
            Self::GetConfig | Self::RestartResponse => {}
            Self::TransferStart {
                write_count,
                read_count,
                data,
            } => {
                w.write_le(*write_count)?;
                w.write_le(*read_count)?;
                w.write_bytes(data)?;
            }
            Self::TransferContinue { data_index, data } => {
                w.write_le(*data_index)?;
                w.write_bytes(data)?;
            }
            Self::ChipSelect { flags } => {
                w.write_le(flags.bits())?;
            }
        }
        Ok(())
    }
}

/// A packet sent by the bridge.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Response<'a> {
    /// `ConfigResponse`.
    Config(ConfigResponse),

    /// `TransferStartResponse`.
    TransferStart {
        /// Result of the transfer.
        status: StatusCode,
        /// First chunk of read data.
        data: &'a [u8],
    },

    /// `TransferContinueResponse`.
    TransferContinue {
        /// Offset of `data` within the read data.
        data_index: u16,
        /// Next chunk of read data.
        data: &'a [u8],
    },

    /// `ChipSelectResponse`.
    ChipSelect {
        /// Always `Success` for a valid peripheral.
        status: StatusCode,
    },
}

impl<'a> Response<'a> {
    /// Returns the read payload carried by this response, if any.
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Self::TransferStart { data, .. } | Self::TransferContinue { data, .. } => data,
            _ => &[],
        }
    }
}

impl Message for Response<'_> {
    fn id(&self) -> PacketId {
        match self {
            Self::Config(_) => PacketId::ConfigResponse,
            Self::TransferStart { .. } => PacketId::TransferStartResponse,
            Self::TransferContinue { .. } => PacketId::TransferContinueResponse,
            Self::ChipSelect { .. } => PacketId::ChipSelectResponse,
        }
    }

    fn header_len(&self) -> usize {
        match self {
            Self::Config(_) => CONFIG_RESPONSE_LEN,
            Self::TransferStart { .. } => TRANSFER_START_RESPONSE_HEADER_LEN,
            Self::TransferContinue { .. } => TRANSFER_CONTINUE_HEADER_LEN,
            Self::ChipSelect { .. } => CHIP_SELECT_LEN,
        }
    }
}

impl<'a> FromWire<'a> for Response<'a> {
    fn from_wire<R: Read<'a>>(mut r: R) -> Result<Self, FromWireError> {
        let id = PacketId::from_wire(&mut r)?;
        match id {
            PacketId::ConfigResponse => {
                let max_write_count = r.read_le::<u16>()?;
                let max_read_count = r.read_le::<u16>()?;
                let features = Features::from_bits_truncate(r.read_le::<u16>()?);
                Ok(Self::Config(ConfigResponse {
                    max_write_count,
                    max_read_count,
                    features,
                }))
            }
            PacketId::TransferStartResponse => {
                let status = StatusCode::from_wire(&mut r)?;
                let data = r.read_remaining()?;
                Ok(Self::TransferStart { status, data })
            }
            PacketId::TransferContinueResponse => {
                let data_index = r.read_le::<u16>()?;
                let data = r.read_remaining()?;
                Ok(Self::TransferContinue { data_index, data })
            }
            PacketId::ChipSelectResponse => {
                let status = StatusCode::from_wire(&mut r)?;
                Ok(Self::ChipSelect { status })
            }
            _ => Err(FromWireError::OutOfRange),
        }
    }
}

impl ToWire for Response<'_> {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), ToWireError> {
        w.write_le(self.id().to_wire_value())?;
        match self {
            Self::Config(config) => {
                w.write_le(config.max_write_count)?;
                w.write_le(config.max_read_count)?;
                w.write_le(config.features.bits())?;
            }
            Self::TransferStart { status, data } => {
                status.to_wire(&mut w)?;
                w.write_bytes(data)?;
            }
            Self::TransferContinue { data_index, data } => {
                w.write_le(*data_index)?;
                w.write_bytes(data)?;
            }
            Self::ChipSelect { status } => {
                status.to_wire(&mut w)?;
            }
        }
        Ok(())
    }
}

/// One frame buffer, reused for every packet received or transmitted in one
/// direction.
pub struct Packet {
    bytes: [u8; MAX_PACKET_SIZE],
    // Number of valid bytes in `bytes`; zero when empty.
    packet_size: usize,
    // Offset of the payload; depends on the packet kind in `bytes`.
    header_size: usize,
}

impl Packet {
    /// Creates an empty packet.
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_PACKET_SIZE],
            packet_size: 0,
            header_size: 0,
        }
    }

    /// Number of valid bytes.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Offset of the payload within the frame.
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Returns true iff the packet holds no frame.
    pub fn is_empty(&self) -> bool {
        self.packet_size == 0
    }

    /// Marks the packet as consumed.
    pub fn clear(&mut self) {
        self.packet_size = 0;
        self.header_size = 0;
    }

    /// The valid bytes of the frame.
    pub fn frame(&self) -> &[u8] {
        &self.bytes[..self.packet_size]
    }

    /// The payload following the kind-specific header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[min(self.header_size, self.packet_size)..self.packet_size]
    }

    /// Fills the packet from the transport. `receive` copies a frame into
    /// the buffer and returns its length, or `None` if nothing is waiting.
    pub fn fill_from<F>(&mut self, receive: F)
    where
        F: FnOnce(&mut [u8]) -> Option<usize>,
    {
        self.header_size = 0;
        self.packet_size = receive(&mut self.bytes[..])
            .map(|len| min(len, MAX_PACKET_SIZE))
            .unwrap_or(0);
    }

    /// Replaces the contents with a copy of `frame`.
    pub fn load(&mut self, frame: &[u8]) -> Result<(), io::Error> {
        if frame.len() > MAX_PACKET_SIZE {
            return Err(io::Error::BufferExhausted);
        }
        self.bytes[..frame.len()].copy_from_slice(frame);
        self.packet_size = frame.len();
        self.header_size = 0;
        Ok(())
    }

    /// Decodes the frame into a request, recording its header size.
    ///
    /// Frames shorter than the packet id, truncated headers and packet ids
    /// that are not requests are rejected.
    pub fn decode(&mut self) -> Result<Request<'_>, FromWireError> {
        if self.packet_size < MIN_PACKET_SIZE {
            return Err(FromWireError::Io(io::Error::BufferExhausted));
        }
        let mut frame: &[u8] = &self.bytes[..self.packet_size];
        let request = Request::from_wire(&mut frame)?;
        self.header_size = request.header_len();
        Ok(request)
    }

    /// Decodes the frame as a response.
    pub fn decode_response(&mut self) -> Result<Response<'_>, FromWireError> {
        let mut frame: &[u8] = &self.bytes[..self.packet_size];
        let response = Response::from_wire(&mut frame)?;
        self.header_size = response.header_len();
        Ok(response)
    }

    /// Serializes `msg` into the packet.
    ///
    /// On error the packet is left empty.
    pub fn encode<M: Message>(&mut self, msg: &M) -> Result<(), ToWireError> {
        self.clear();
        let mut cursor = Cursor::new(&mut self.bytes);
        msg.to_wire(&mut cursor)?;
        self.packet_size = cursor.consumed_len();
        self.header_size = msg.header_len();
        Ok(())
    }

    /// Builds a `ConfigResponse`.
    pub fn encode_config_response(&mut self, config: &ConfigResponse) {
        self.encode_or_drop(&Response::Config(*config));
    }

    /// Builds a `ChipSelectResponse`.
    pub fn encode_chip_select_response(&mut self) {
        self.encode_or_drop(&Response::ChipSelect {
            status: StatusCode::Success,
        });
    }

    /// Builds a `TransferStartResponse` carrying as much of `payload` as
    /// fits. Returns the number of payload bytes placed in the frame.
    pub fn encode_transfer_start_response(&mut self, status: StatusCode, payload: &[u8]) -> usize {
        let len = min(payload.len(), max_payload(TRANSFER_START_RESPONSE_HEADER_LEN));
        self.encode_or_drop(&Response::TransferStart {
            status,
            data: &payload[..len],
        });
        len
    }

    /// Builds a `TransferContinueResponse` carrying as much of `payload` as
    /// fits. Returns the number of payload bytes placed in the frame.
    pub fn encode_transfer_continue_response(&mut self, data_index: u16, payload: &[u8]) -> usize {
        let len = min(payload.len(), max_payload(TRANSFER_CONTINUE_HEADER_LEN));
        self.encode_or_drop(&Response::TransferContinue {
            data_index,
            data: &payload[..len],
        });
        len
    }

    fn encode_or_drop(&mut self, response: &Response<'_>) {
        if let Err(e) = self.encode(response) {
            warn!("usb_spi: dropping {} response: {:?}", response.id(), e);
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}
