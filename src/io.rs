// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

// This file was forked from https://github.com/lowRISC/manticore.

//! I/O interfaces, in lieu of [`std::io`].
//!
//! USB-SPI frames are little-endian throughout; see [`LeInt`].
//!
//! [`std::io`]: https://doc.rust-lang.org/std/io/index.html
//! [`LeInt`]: trait.LeInt.html

use core::mem;

use static_assertions::assert_obj_safe;

/// A generic, low-level I/O error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that some underlying buffer has been completely used up,
    /// either for reading from or writing to.
    BufferExhausted,

    /// Indicates that an unspecified, internal failure occurred.
    Internal,
}

/// A little-endian integer, which can be read and written.
pub trait LeInt: Sized + Copy {
    /// Reads a value of type `Self`, in little-endian order.
    fn read_from<'a, R: Read<'a>>(r: R) -> Result<Self, Error>;

    /// Writes a value of type `Self`, in little-endian order.
    fn write_to<W: Write>(self, w: W) -> Result<(), Error>;
}

impl LeInt for u8 {
    #[inline]
    fn read_from<'a, R: Read<'a>>(mut r: R) -> Result<Self, Error> {
        Ok(r.read_bytes(mem::size_of::<Self>())?[0])
    }

    #[inline]
    fn write_to<W: Write>(self, mut w: W) -> Result<(), Error> {
        w.write_bytes(&[self])
    }
}

impl LeInt for u16 {
    #[inline]
    fn read_from<'a, R: Read<'a>>(mut r: R) -> Result<Self, Error> {
        use byteorder::ByteOrder as _;

        Ok(byteorder::LE::read_u16(
            r.read_bytes(mem::size_of::<Self>())?,
        ))
    }

    #[inline]
    fn write_to<W: Write>(self, mut w: W) -> Result<(), Error> {
        use byteorder::ByteOrder as _;

        let mut bytes = [0; mem::size_of::<Self>()];
        byteorder::LE::write_u16(&mut bytes, self);
        w.write_bytes(&bytes)
    }
}

/// Represents a place that bytes can be read from, such as a `&[u8]`.
///
/// Reads are zero-copy: the returned slices borrow from the underlying
/// buffer for the lifetime `'a`.
pub trait Read<'a> {
    /// Reads exactly `n` bytes from `self`.
    ///
    /// This function does not perform partial reads: it will either
    /// return `n` bytes or an error.
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error>;

    /// Returns the number of bytes still available to read.
    fn remaining_data(&self) -> usize;

    /// Reads everything that is left.
    #[inline]
    fn read_remaining(&mut self) -> Result<&'a [u8], Error> {
        let n = self.remaining_data();
        self.read_bytes(n)
    }

    /// Reads a little-endian integer.
    ///
    /// # Note
    /// Do not implement this function yourself.
    #[inline]
    fn read_le<I: LeInt>(&mut self) -> Result<I, Error>
    where
        Self: Sized,
    {
        I::read_from(self)
    }
}

assert_obj_safe!(Read<'static>);

impl<'a, R: Read<'a> + ?Sized> Read<'a> for &'_ mut R {
    #[inline]
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        R::read_bytes(*self, n)
    }

    #[inline]
    fn remaining_data(&self) -> usize {
        R::remaining_data(*self)
    }
}

impl<'a> Read<'a> for &'a [u8] {
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.len() < n {
            return Err(Error::BufferExhausted);
        }

        let result = &self[..n];
        *self = &self[n..];
        Ok(result)
    }

    fn remaining_data(&self) -> usize {
        self.len()
    }
}

/// Represents a place that bytes can be written to, such as a `&mut [u8]`.
pub trait Write {
    /// Attempt to write `buf` exactly to `self`.
    ///
    /// This function does not perform partial writes: it will either
    /// write all of `buf` or return an error.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Writes a little-endian integer.
    ///
    /// # Note
    /// Do not implement this function yourself.
    #[inline]
    fn write_le<I: LeInt>(&mut self, val: I) -> Result<(), Error>
    where
        Self: Sized,
    {
        val.write_to(self)
    }
}

assert_obj_safe!(Write);

impl<W: Write + ?Sized> Write for &'_ mut W {
    #[inline]
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), Error> {
        W::write_bytes(*self, buf)
    }
}

impl Write for &'_ mut [u8] {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), Error> {
        let n = buf.len();
        if self.len() < n {
            return Err(Error::BufferExhausted);
        }

        let (dest, rest) = mem::replace(self, &mut []).split_at_mut(n);
        dest.copy_from_slice(buf);
        *self = rest;
        Ok(())
    }
}

/// Converts a [`std::io::Write`] into a [`Write`].
///
/// [`std::io::Write`]: https://doc.rust-lang.org/std/io/trait.Write.html
/// [`Write`]: trait.Write.html
#[cfg(feature = "std")]
pub struct StdWrite<W>(pub W);

#[cfg(feature = "std")]
impl<W: std::io::Write> Write for StdWrite<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.0.write_all(buf).map_err(|_| Error::Internal)
    }
}

/// A "cursor" over a mutable byte buffer.
///
/// Frames are built by running [`ToWire`] against a `Cursor` over a packet
/// buffer and then asking how much was written:
/// ```
/// # use usbspi::io::*;
/// let mut buf = [0; 64];
/// let mut cursor = Cursor::new(&mut buf);
/// cursor.write_le::<u16>(0x0005).unwrap();
/// assert_eq!(cursor.consumed_len(), 2);
/// ```
///
/// [`ToWire`]: ../protocol/wire/trait.ToWire.html
pub struct Cursor<'a> {
    buf: &'a mut [u8],
    // Invariant: cursor <= buf.len().
    cursor: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a new `Cursor` for the given buffer.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    /// Consumes `n` bytes from the underlying buffer.
    ///
    /// If `n` bytes are unavailable, `None` is returned.
    pub fn consume(&mut self, n: usize) -> Option<&mut [u8]> {
        let end = self.cursor.checked_add(n)?;
        if self.buf.len() < end {
            return None;
        }
        let output = &mut self.buf[self.cursor..end];
        self.cursor = end;

        Some(output)
    }

    /// Returns the number of bytes consumed thus far.
    pub fn consumed_len(&self) -> usize {
        self.cursor
    }

}

impl Write for Cursor<'_> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), Error> {
        let dest = self.consume(buf.len()).ok_or(Error::BufferExhausted)?;
        dest.copy_from_slice(buf);
        Ok(())
    }
}
