//! Primitive field decoding over a bounded byte window.
//!
//! [`ByteWindow`] supplies every header primitive (variable-length numbers,
//! little-endian integers, bit vectors) on top of three required methods, so
//! the same decoding serves both a plain slice ([`ByteReader`]) and the
//! switchable header cursor in [`super::switch`].
//!
//! Every read either advances the position and returns a value, or fails with
//! [`Error::EndOfData`]. After a failure the window state is unspecified and
//! the caller is expected to abandon the parse.

use crate::{Error, Result};

use super::NUM_MAX;

/// A readable byte window `[position, buffer().len())`.
pub trait ByteWindow {
    /// The bytes of the active window.
    fn buffer(&self) -> &[u8];

    /// The read position inside [`buffer`](Self::buffer).
    fn position(&self) -> usize;

    /// Moves the read position. Callers never move past the buffer end.
    fn set_position(&mut self, pos: usize);

    /// Returns the number of unread bytes.
    fn remaining(&self) -> usize {
        self.buffer().len().saturating_sub(self.position())
    }

    /// Builds a [`Error::CorruptHeader`] tagged with the current position.
    fn corrupt(&self, reason: impl Into<String>) -> Error
    where
        Self: Sized,
    {
        Error::corrupt_header(self.position() as u64, reason)
    }

    /// Reads one byte.
    fn read_u8(&mut self) -> Result<u8> {
        let pos = self.position();
        let byte = *self
            .buffer()
            .get(pos)
            .ok_or(Error::EndOfData { context: "byte" })?;
        self.set_position(pos + 1);
        Ok(byte)
    }

    /// Borrows the next `n` bytes and advances past them.
    fn read_slice(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.remaining() {
            return Err(Error::EndOfData { context: "byte run" });
        }
        let pos = self.position();
        self.set_position(pos + n);
        Ok(&self.buffer()[pos..pos + n])
    }

    /// Copies the next `n` bytes.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.read_slice(n).map(<[u8]>::to_vec)
    }

    /// Skips `n` bytes.
    fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.remaining() as u64 {
            return Err(Error::EndOfData { context: "skipped data" });
        }
        let pos = self.position();
        self.set_position(pos + n as usize);
        Ok(())
    }

    /// Skips everything left in the window.
    fn skip_rest(&mut self) {
        let end = self.buffer().len();
        self.set_position(end);
    }

    /// Reads a variable-length number.
    ///
    /// The count of leading one bits in the first byte gives the number of
    /// extension bytes (0 to 8). Extension bytes supply the low bits in
    /// little-endian order; the free low bits of the first byte are the
    /// most significant part.
    ///
    /// - `0xxxxxxx`: value 0-127
    /// - `10xxxxxx` + 1 byte: value 0-16383
    /// - `11111111` + 8 bytes: full u64
    fn read_number(&mut self) -> Result<u64> {
        let first = self
            .read_u8()
            .map_err(|_| Error::EndOfData { context: "number" })?;
        let mut mask = 0x80u8;
        let mut value = 0u64;
        for i in 0..8 {
            if first & mask == 0 {
                let high = u64::from(first & mask.wrapping_sub(1));
                return Ok(value | (high << (8 * i)));
            }
            let byte = self
                .read_u8()
                .map_err(|_| Error::EndOfData { context: "number" })?;
            value |= u64::from(byte) << (8 * i);
            mask >>= 1;
        }
        Ok(value)
    }

    /// Reads a number used as a count or index, bounded by [`NUM_MAX`].
    fn read_num(&mut self) -> Result<u32> {
        let value = self.read_number()?;
        if value > NUM_MAX {
            return Err(Error::UnsupportedFeature {
                feature: "number exceeds the count bound",
            });
        }
        Ok(value as u32)
    }

    /// Reads a section id.
    fn read_id(&mut self) -> Result<u64> {
        self.read_number()
    }

    /// Reads a number-prefixed block and discards it.
    fn skip_data(&mut self) -> Result<()> {
        let size = self.read_number()?;
        self.skip(size)
    }

    /// Reads an unsigned 32-bit little-endian integer.
    fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self
            .read_slice(4)
            .map_err(|_| Error::EndOfData { context: "u32" })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads an unsigned 64-bit little-endian integer.
    fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self
            .read_slice(8)
            .map_err(|_| Error::EndOfData { context: "u64" })?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a bit vector of `count` booleans, most significant bit first.
    fn read_bool_vector(&mut self, count: usize) -> Result<Vec<bool>> {
        let bytes = self
            .read_slice(count.div_ceil(8))
            .map_err(|_| Error::EndOfData { context: "bit vector" })?;
        Ok((0..count)
            .map(|i| (bytes[i / 8] >> (7 - (i % 8))) & 1 != 0)
            .collect())
    }

    /// Reads an "all defined" byte, then an explicit bit vector if it is zero.
    fn read_all_or_bits(&mut self, count: usize) -> Result<Vec<bool>> {
        if self.read_u8()? != 0 {
            Ok(vec![true; count])
        } else {
            self.read_bool_vector(count)
        }
    }
}

/// A [`ByteWindow`] over a borrowed slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true when every byte has been read.
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }
}

impl ByteWindow for ByteReader<'_> {
    fn buffer(&self) -> &[u8] {
        self.data
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }
}

/// Appends `value` in the variable-length number encoding.
///
/// This is the inverse of [`ByteWindow::read_number`] and always picks the
/// shortest form.
pub fn write_number(buf: &mut Vec<u8>, value: u64) {
    let mut first = 0u8;
    let mut mask = 0x80u8;
    let mut extra = 0usize;
    while extra < 8 && value >= 1u64 << (7 * (extra + 1)) {
        first |= mask;
        mask >>= 1;
        extra += 1;
    }
    if extra < 8 {
        first |= (value >> (8 * extra)) as u8;
    }
    buf.push(first);
    buf.extend_from_slice(&value.to_le_bytes()[..extra]);
}

/// Appends a bit vector, most significant bit first.
pub fn write_bool_vector(buf: &mut Vec<u8>, bits: &[bool]) {
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                byte |= 0x80 >> i;
            }
        }
        buf.push(byte);
    }
}

/// Appends an "all defined" marker, followed by a bit vector unless every bit is set.
pub fn write_all_or_bits(buf: &mut Vec<u8>, bits: &[bool]) {
    if bits.iter().all(|&b| b) {
        buf.push(1);
    } else {
        buf.push(0);
        write_bool_vector(buf, bits);
    }
}
