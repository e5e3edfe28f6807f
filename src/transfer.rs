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

//! Progress of one direction of a transfer.

use core::cmp::min;

/// Returned by [`TransferContext::absorb`] when the payload does not fit in
/// what is left of the declared transfer.
///
/// [`TransferContext::absorb`]: struct.TransferContext.html#method.absorb
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Overflow;

/// A fixed-capacity buffer plus the size and progress of the transfer it
/// holds.
///
/// Invariant: `transfer_index <= transfer_size <= N`.
pub struct TransferContext<const N: usize> {
    buffer: [u8; N],
    transfer_size: usize,
    transfer_index: usize,
}

impl<const N: usize> TransferContext<N> {
    /// Creates an empty context.
    pub const fn new() -> Self {
        Self {
            buffer: [0; N],
            transfer_size: 0,
            transfer_index: 0,
        }
    }

    /// Buffer capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Starts a new transfer of `size` bytes, clamped to the capacity.
    pub fn reset(&mut self, size: usize) {
        self.transfer_size = min(size, N);
        self.transfer_index = 0;
    }

    /// Total bytes in the current transfer.
    pub fn transfer_size(&self) -> usize {
        self.transfer_size
    }

    /// Bytes moved so far.
    pub fn transfer_index(&self) -> usize {
        self.transfer_index
    }

    /// Rewinds to the start of the transfer without touching its data.
    pub fn rewind(&mut self) {
        self.transfer_index = 0;
    }

    /// Bytes still to be moved.
    pub fn remaining(&self) -> usize {
        self.transfer_size - self.transfer_index
    }

    /// Returns true iff every byte has been moved.
    pub fn is_complete(&self) -> bool {
        self.transfer_index == self.transfer_size
    }

    /// Appends `payload` at the current index.
    ///
    /// Nothing is copied if `payload` does not fit in the remainder.
    pub fn absorb(&mut self, payload: &[u8]) -> Result<(), Overflow> {
        if payload.len() > self.remaining() {
            return Err(Overflow);
        }
        let end = self.transfer_index + payload.len();
        self.buffer[self.transfer_index..end].copy_from_slice(payload);
        self.transfer_index = end;
        Ok(())
    }

    /// Returns up to `max_len` bytes starting at the current index. The index
    /// is not advanced; see [`advance`](#method.advance).
    pub fn emit(&self, max_len: usize) -> &[u8] {
        let end = self.transfer_index + min(max_len, self.remaining());
        &self.buffer[self.transfer_index..end]
    }

    /// Moves the index forward by `n`, saturating at the transfer size.
    pub fn advance(&mut self, n: usize) {
        self.transfer_index = min(self.transfer_index + n, self.transfer_size);
    }

    /// The valid bytes of the transfer.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.transfer_size]
    }

    /// The valid bytes of the transfer, for a driver to fill.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..self.transfer_size]
    }
}

impl<const N: usize> Default for TransferContext<N> {
    fn default() -> Self {
        Self::new()
    }
}
