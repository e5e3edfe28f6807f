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

//! Host side of the protocol.
//!
//! [`transfer_requests`] splits one transfer into the frames a host sends;
//! [`ResponseAssembler`] puts the response frames back together and notices
//! a lost frame, after which the host should send `RestartResponse` and feed
//! the assembler again from the start.
//!
//! [`transfer_requests`]: fn.transfer_requests.html
//! [`ResponseAssembler`]: struct.ResponseAssembler.html

use crate::protocol::packet::max_payload;
use crate::protocol::packet::Message;
use crate::protocol::packet::PacketId;
use crate::protocol::packet::Request;
use crate::protocol::packet::Response;
use crate::protocol::packet::FULL_DUPLEX_ENABLED;
use crate::protocol::packet::TRANSFER_CONTINUE_HEADER_LEN;
use crate::protocol::packet::TRANSFER_START_HEADER_LEN;
use crate::protocol::status::StatusCode;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::FromWireError;
use crate::protocol::wire::ToWireError;

use core::cmp::min;
use core::convert::TryFrom;

/// Host-side framing errors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HostError {
    /// A frame could not be decoded.
    FromWire(FromWireError),

    /// A frame could not be encoded.
    ToWire(ToWireError),

    /// The write data does not fit a `u16` count.
    WriteTooLong(usize),

    /// A frame of the wrong kind arrived.
    UnexpectedPacket(PacketId),

    /// The bridge reported an error.
    Status(StatusCode),

    /// A response frame was lost; restart the response.
    Gap {
        /// Offset the next frame should have carried.
        expected: u16,
        /// Offset it did carry.
        got: u16,
    },

    /// The bridge sent more data than requested.
    Overflow,
}

impl From<FromWireError> for HostError {
    fn from(e: FromWireError) -> Self {
        Self::FromWire(e)
    }
}

impl From<ToWireError> for HostError {
    fn from(e: ToWireError) -> Self {
        Self::ToWire(e)
    }
}

/// The requests that make up one transfer.
#[derive(Clone, Debug)]
pub struct TransferRequests<'a> {
    write: &'a [u8],
    read_count: u16,
    index: usize,
    started: bool,
}

/// Splits a transfer into a `TransferStart` followed by as many
/// `TransferContinue` requests as the write data needs.
///
/// `read_count` may be `FULL_DUPLEX_ENABLED`.
pub fn transfer_requests(write: &[u8], read_count: u16) -> Result<TransferRequests<'_>, HostError> {
    if u16::try_from(write.len()).is_err() {
        return Err(HostError::WriteTooLong(write.len()));
    }
    Ok(TransferRequests {
        write,
        read_count,
        index: 0,
        started: false,
    })
}

impl<'a> TransferRequests<'a> {
    /// Number of read bytes the response will carry.
    pub fn expected_read_len(&self) -> usize {
        if self.read_count == FULL_DUPLEX_ENABLED {
            self.write.len()
        } else {
            usize::from(self.read_count)
        }
    }
}

impl<'a> Iterator for TransferRequests<'a> {
    type Item = Request<'a>;

    fn next(&mut self) -> Option<Request<'a>> {
        // Lengths and offsets fit in u16; see `transfer_requests()`.
        if !self.started {
            self.started = true;
            let len = min(self.write.len(), max_payload(TRANSFER_START_HEADER_LEN));
            self.index = len;
            return Some(Request::TransferStart {
                write_count: self.write.len() as u16,
                read_count: self.read_count,
                data: &self.write[..len],
            });
        }

        if self.index >= self.write.len() {
            return None;
        }
        let start = self.index;
        let len = min(self.write.len() - start, max_payload(TRANSFER_CONTINUE_HEADER_LEN));
        self.index += len;
        Some(Request::TransferContinue {
            data_index: start as u16,
            data: &self.write[start..start + len],
        })
    }
}

/// Reassembles the read data of one transfer.
pub struct ResponseAssembler<'b> {
    buf: &'b mut [u8],
    index: usize,
    started: bool,
}

impl<'b> ResponseAssembler<'b> {
    /// Creates an assembler expecting exactly `buf.len()` read bytes.
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self {
            buf,
            index: 0,
            started: false,
        }
    }

    /// Returns true iff every read byte has arrived.
    pub fn is_complete(&self) -> bool {
        self.started && self.index == self.buf.len()
    }

    /// The read bytes received so far.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.index]
    }

    /// Decodes and applies one response frame.
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<bool, HostError> {
        let response = Response::from_wire(frame)?;
        self.push(&response)
    }

    /// Applies one response. Returns whether the read data is complete.
    ///
    /// A `TransferStartResponse` always starts over, so after a `Gap` the
    /// replayed response can be fed in directly.
    pub fn push(&mut self, response: &Response<'_>) -> Result<bool, HostError> {
        match *response {
            Response::TransferStart { status, data } => {
                self.started = true;
                self.index = 0;
                if !status.is_success() {
                    return Err(HostError::Status(status));
                }
                self.append(data)?;
            }
            Response::TransferContinue { data_index, data } => {
                if !self.started {
                    return Err(HostError::UnexpectedPacket(response.id()));
                }
                if usize::from(data_index) != self.index {
                    return Err(HostError::Gap {
                        expected: self.index as u16,
                        got: data_index,
                    });
                }
                self.append(data)?;
            }
            _ => return Err(HostError::UnexpectedPacket(response.id())),
        }
        Ok(self.is_complete())
    }

    fn append(&mut self, data: &[u8]) -> Result<(), HostError> {
        let end = self.index + data.len();
        if end > self.buf.len() {
            return Err(HostError::Overflow);
        }
        self.buf[self.index..end].copy_from_slice(data);
        self.index = end;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_long_write() {
        let write = [0x33; 200];
        let requests: Vec<_> = transfer_requests(&write, 4).unwrap().collect();
        assert_eq!(requests.len(), 4);
        match requests[0] {
            Request::TransferStart {
                write_count,
                read_count,
                data,
            } => {
                assert_eq!((write_count, read_count, data.len()), (200, 4, 58));
            }
            other => panic!("unexpected {:?}", other),
        }
        let indices: Vec<_> = requests[1..]
            .iter()
            .map(|r| match r {
                Request::TransferContinue { data_index, data } => (*data_index, data.len()),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(indices, vec![(58, 60), (118, 60), (178, 22)]);
    }

    #[test]
    fn empty_write_is_one_frame() {
        let requests = transfer_requests(&[], FULL_DUPLEX_ENABLED).unwrap();
        assert_eq!(requests.expected_read_len(), 0);
        assert_eq!(requests.count(), 1);
        assert!(transfer_requests(&[0; 0x10000], 0).is_err());
    }

    #[test]
    fn reassembles_and_detects_gap() {
        let mut buf = [0; 6];
        let mut asm = ResponseAssembler::new(&mut buf);
        let start = Response::TransferStart {
            status: StatusCode::Success,
            data: &[1, 2],
        };
        assert_eq!(asm.push(&start), Ok(false));

        let late = Response::TransferContinue {
            data_index: 4,
            data: &[5, 6],
        };
        assert_eq!(asm.push(&late), Err(HostError::Gap { expected: 2, got: 4 }));

        // Replay from the start.
        assert_eq!(asm.push(&start), Ok(false));
        let next = Response::TransferContinue {
            data_index: 2,
            data: &[3, 4, 5, 6],
        };
        assert_eq!(asm.push(&next), Ok(true));
        assert_eq!(asm.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn reports_status_and_overflow() {
        let mut buf = [0; 1];
        let mut asm = ResponseAssembler::new(&mut buf);
        assert_eq!(
            asm.push_frame(&[0x05, 0x00, 0x05, 0x00]),
            Err(HostError::Status(StatusCode::Disabled))
        );
        assert_eq!(
            asm.push_frame(&[0x05, 0x00, 0x00, 0x00, 0x01, 0x02]),
            Err(HostError::Overflow)
        );
        assert_eq!(
            asm.push_frame(&[0x08, 0x00, 0x00, 0x00]),
            Err(HostError::UnexpectedPacket(PacketId::ChipSelectResponse))
        );
    }
}
