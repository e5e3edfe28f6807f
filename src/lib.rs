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

//! USB to SPI bridge.
//!
//! This crate implements the device side of the USB-SPI (version 2) bulk
//! protocol: a host writes framed requests to a bulk OUT endpoint, the
//! device reassembles them into a single SPI transaction and streams the
//! result back as framed responses on the bulk IN endpoint.
//!
//! The hardware is reached through the traits in [`hil`]; everything else is
//! plain, allocation-free state owned by a [`UsbSpi`] instance.
//!
//! [`hil`]: hil/index.html
//! [`UsbSpi`]: usb_spi/struct.UsbSpi.html

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]

#[macro_use]
pub mod protocol;

pub mod config;
pub mod control;
pub mod deferred;
pub mod gate;
pub mod hil;
pub mod host;
pub mod io;
pub mod state;
pub mod transfer;
pub mod usb_spi;

#[cfg(test)]
mod fake;

pub use crate::config::Config;
pub use crate::config::SpiDevice;
pub use crate::config::UsbFlags;
pub use crate::protocol::status::StatusCode;
pub use crate::usb_spi::UsbSpi;
