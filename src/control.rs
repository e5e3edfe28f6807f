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

//! Vendor control requests on the USB-SPI interface.

use crate::config::Config;
use crate::config::SpiDevice;
use crate::io::Read;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::FromWireError;
use crate::protocol::wire::WireEnum;

/// Host-to-device, vendor, interface.
pub const USB_SPI_REQUEST_TYPE: u8 = 0x41;

wire_enum! {
    /// `bRequest` values understood by the bridge.
    pub enum ControlVerb: u8 {
        /// Set the host-side enable.
        Enable = 0x00,

        /// Clear the host-side enable.
        Disable = 0x01,
    }
}

/// Direction bit of `bmRequestType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupDirection {
    /// OUT.
    HostToDevice,
    /// IN.
    DeviceToHost,
}

/// Type field of `bmRequestType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupRequestClass {
    /// Standard request.
    Standard,
    /// Class request.
    Class,
    /// Vendor request.
    Vendor,
    /// Reserved.
    Reserved,
}

/// Recipient field of `bmRequestType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupRecipient {
    /// The device.
    Device,
    /// An interface.
    Interface,
    /// An endpoint.
    Endpoint,
    /// Other.
    Other,
    /// Reserved.
    Reserved,
}

/// A USB setup packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupRequest {
    /// `bmRequestType`.
    pub bm_request_type: u8,
    /// `bRequest`.
    pub b_request: u8,
    /// `wValue`: the peripheral index.
    pub w_value: u16,
    /// `wIndex`: the interface number.
    pub w_index: u16,
    /// `wLength`.
    pub w_length: u16,
}

impl SetupRequest {
    /// Builds a request addressed to the USB-SPI interface.
    pub fn usb_spi(verb: ControlVerb, device_index: u16, interface: u16) -> Self {
        Self {
            bm_request_type: USB_SPI_REQUEST_TYPE,
            b_request: verb.to_wire_value(),
            w_value: device_index,
            w_index: interface,
            w_length: 0,
        }
    }

    /// Parses the 8 byte setup packet.
    pub fn parse(buf: &[u8]) -> Result<Self, FromWireError> {
        Self::from_wire(buf)
    }

    /// Direction of the data stage.
    pub fn data_direction(&self) -> SetupDirection {
        match (self.bm_request_type & 0x80) >> 7 {
            0 => SetupDirection::HostToDevice,
            _ => SetupDirection::DeviceToHost,
        }
    }

    /// Standard, class or vendor.
    pub fn req_type(&self) -> SetupRequestClass {
        match (self.bm_request_type & 0x60) >> 5 {
            0 => SetupRequestClass::Standard,
            1 => SetupRequestClass::Class,
            2 => SetupRequestClass::Vendor,
            _ => SetupRequestClass::Reserved,
        }
    }

    /// Who the request is for.
    pub fn recipient(&self) -> SetupRecipient {
        match self.bm_request_type & 0x1f {
            0 => SetupRecipient::Device,
            1 => SetupRecipient::Interface,
            2 => SetupRecipient::Endpoint,
            3 => SetupRecipient::Other,
            _ => SetupRecipient::Reserved,
        }
    }
}

impl<'a> FromWire<'a> for SetupRequest {
    fn from_wire<R: Read<'a>>(mut r: R) -> Result<Self, FromWireError> {
        Ok(Self {
            bm_request_type: r.read_le()?,
            b_request: r.read_le()?,
            w_value: r.read_le()?,
            w_index: r.read_le()?,
            w_length: r.read_le()?,
        })
    }
}

/// Reasons a control request is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlError {
    /// Not a host-to-device vendor request for an interface.
    BadRequestType(u8),

    /// `wValue` is past the end of the device table.
    NoSuchDevice(u16),

    /// The peripheral may not be used over USB-SPI.
    DeviceNotEnabled(u16),

    /// `wIndex` is another interface.
    WrongInterface(u16),

    /// The request has a data stage.
    UnexpectedData(u16),

    /// `bRequest` is not a known verb.
    UnknownVerb(u8),
}

/// An accepted control request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accepted {
    /// What the host asked for.
    pub verb: ControlVerb,

    /// The peripheral to target from now on.
    pub device_index: usize,
}

/// Checks `req` against the device table and interface.
pub fn validate(
    req: &SetupRequest,
    devices: &[SpiDevice],
    config: &Config,
) -> Result<Accepted, ControlError> {
    if req.data_direction() != SetupDirection::HostToDevice
        || req.req_type() != SetupRequestClass::Vendor
        || req.recipient() != SetupRecipient::Interface
    {
        return Err(ControlError::BadRequestType(req.bm_request_type));
    }

    let device_index = usize::from(req.w_value);
    let device = devices
        .get(device_index)
        .ok_or(ControlError::NoSuchDevice(req.w_value))?;
    if !device.usb_enabled() {
        return Err(ControlError::DeviceNotEnabled(req.w_value));
    }
    if req.w_index != config.interface {
        return Err(ControlError::WrongInterface(req.w_index));
    }
    if req.w_length != 0 {
        return Err(ControlError::UnexpectedData(req.w_length));
    }

    let verb =
        ControlVerb::from_wire_value(req.b_request).ok_or(ControlError::UnknownVerb(req.b_request))?;
    Ok(Accepted { verb, device_index })
}
