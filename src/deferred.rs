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

//! Deferred work requested from interrupt context.
//!
//! Interrupt handlers call [`DeferredCall::set`], which only touches an
//! atomic bitmask. The bridge's main loop later drains the mask with
//! [`UsbSpi::service`] and does the real work there.
//!
//! [`DeferredCall::set`]: struct.DeferredCall.html#method.set
//! [`UsbSpi::service`]: ../usb_spi/struct.UsbSpi.html#method.service

use bitflags::bitflags;
use core::sync::atomic::AtomicU8;
use core::sync::atomic::Ordering;

bitflags! {
    /// Pending events.
    pub struct Events: u8 {
        /// A frame arrived on the OUT endpoint.
        const RX = 1 << 0;

        /// The IN endpoint finished sending a frame.
        const TX = 1 << 1;

        /// The USB interface was reset.
        const RESET = 1 << 2;

        /// Something other than the transport wants a pass, e.g. an enable
        /// change.
        const SCHEDULE = 1 << 3;
    }
}

/// An interrupt-safe set of pending events.
pub struct DeferredCall {
    pending: AtomicU8,
}

impl DeferredCall {
    /// Creates an empty set.
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
        }
    }

    /// Marks `events` as pending. Safe to call from an interrupt handler.
    pub fn set(&self, events: Events) {
        self.pending.fetch_or(events.bits(), Ordering::AcqRel);
    }

    /// Returns true iff anything is pending.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }

    /// Clears and returns the pending events.
    pub fn take(&self) -> Events {
        Events::from_bits_truncate(self.pending.swap(0, Ordering::AcqRel))
    }
}

impl Default for DeferredCall {
    fn default() -> Self {
        Self::new()
    }
}
