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

//! Protocol status codes.
//!
//! These are what the host sees in a transfer start response. Raw bus errors
//! reported by the SPI driver are folded into them by
//! [`StatusCode::from_bus_result`].
//!
//! [`StatusCode::from_bus_result`]: enum.StatusCode.html#method.from_bus_result

use crate::hil::BusError;
use crate::io::Read;
use crate::io::Write;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::FromWireError;
use crate::protocol::wire::ToWire;
use crate::protocol::wire::ToWireError;

use core::fmt;

/// Set on every status that carries a raw bus error code.
pub const UNKNOWN_ERROR_FLAG: u16 = 0x8000;

/// Result of the last operation, as reported to the host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StatusCode {
    /// The transfer completed.
    Success,

    /// The bus driver timed out.
    Timeout,

    /// The bus was busy.
    Busy,

    /// The declared write count exceeds the maximum write count.
    WriteCountInvalid,

    /// The declared read count exceeds the maximum read count.
    ///
    /// Also returned for a full duplex transfer whose write count exceeds
    /// the maximum read count, since every written byte is read back.
    ReadCountInvalid,

    /// The addressed peripheral is not enabled.
    Disabled,

    /// A continue packet's data index does not match the bytes received so
    /// far.
    RxBadDataIndex,

    /// The host sent more payload than it declared.
    RxDataOverflow,

    /// The frame was malformed or of an unexpected kind.
    RxUnexpectedPacket,

    /// Full duplex was requested but is not supported.
    UnsupportedFullDuplex,

    /// Any other bus error. Holds the low 15 bits of the raw error code.
    UnknownError(u16),
}

impl StatusCode {
    /// Converts `self` into its wire representation.
    pub fn to_wire_value(self) -> u16 {
        match self {
            Self::Success => 0x0000,
            Self::Timeout => 0x0001,
            Self::Busy => 0x0002,
            Self::WriteCountInvalid => 0x0003,
            Self::ReadCountInvalid => 0x0004,
            Self::Disabled => 0x0005,
            Self::RxBadDataIndex => 0x0006,
            Self::RxDataOverflow => 0x0007,
            Self::RxUnexpectedPacket => 0x0008,
            Self::UnsupportedFullDuplex => 0x0009,
            Self::UnknownError(code) => UNKNOWN_ERROR_FLAG | (code & !UNKNOWN_ERROR_FLAG),
        }
    }

    /// Parses a wire status. Unassigned values below the unknown error flag
    /// yield `None`.
    pub fn from_wire_value(wire: u16) -> Option<Self> {
        if wire & UNKNOWN_ERROR_FLAG != 0 {
            return Some(Self::UnknownError(wire & !UNKNOWN_ERROR_FLAG));
        }
        match wire {
            0x0000 => Some(Self::Success),
            0x0001 => Some(Self::Timeout),
            0x0002 => Some(Self::Busy),
            0x0003 => Some(Self::WriteCountInvalid),
            0x0004 => Some(Self::ReadCountInvalid),
            0x0005 => Some(Self::Disabled),
            0x0006 => Some(Self::RxBadDataIndex),
            0x0007 => Some(Self::RxDataOverflow),
            0x0008 => Some(Self::RxUnexpectedPacket),
            0x0009 => Some(Self::UnsupportedFullDuplex),
            _ => None,
        }
    }

    /// Maps the result of a bus transaction to a protocol status.
    pub fn from_bus_result(result: Result<(), BusError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(BusError::Timeout) => Self::Timeout,
            Err(BusError::Busy) => Self::Busy,
            Err(e) => Self::UnknownError(e.code() & !UNKNOWN_ERROR_FLAG),
        }
    }

    /// Returns true iff `self` is `Success`.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::Success
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownError(code) => write!(f, "UnknownError({:#06x})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

impl<'a> FromWire<'a> for StatusCode {
    fn from_wire<R: Read<'a>>(mut r: R) -> Result<Self, FromWireError> {
        let wire = r.read_le::<u16>()?;
        Self::from_wire_value(wire).ok_or(FromWireError::OutOfRange)
    }
}

impl ToWire for StatusCode {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), ToWireError> {
        w.write_le(self.to_wire_value())?;
        Ok(())
    }
}
