//! Compact binary primitives for the rule database
//!
//! Wire conventions shared by every record:
//!
//! - flags bytes built with [`set_at`] / [`mask_at`]
//! - compact integers: one leading byte that is either the literal value or
//!   an escape selecting a wider big-endian payload
//! - compact strings: compact-int byte length followed by raw UTF-8
//!
//! | width | literal range | escape `0xFE`   | escape `0xFF`  |
//! |-------|---------------|-----------------|----------------|
//! | short | `0..=0xFE`    | (literal)       | 2-byte short   |
//! | int   | `0..=0xFD`    | 2-byte short    | 4-byte int     |
//! | long  | `0..=0xFD`    | 4-byte int      | 8-byte long    |

use crate::error::{MagicError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const INT_SHORT_ESCAPE: u8 = 0xFE;
const FULL_WIDTH_ESCAPE: u8 = 0xFF;
const MAX_INT_LITERAL: i64 = 0xFD;
const MAX_SHORT_LITERAL: i16 = 0xFE;

/// Returns `flags` with `bit` set or cleared.
#[inline]
pub fn set_at(flags: u8, bit: u8, value: bool) -> u8 {
    if value {
        flags | mask_at(bit)
    } else {
        flags & !mask_at(bit)
    }
}

#[inline]
pub fn mask_at(bit: u8) -> u8 {
    1 << bit
}

#[inline]
pub fn is_set(flags: u8, bit: u8) -> bool {
    flags & mask_at(bit) != 0
}

/// Stores a 2-bit field at `shift`.
#[inline]
pub fn set_field2(flags: u8, shift: u8, value: u8) -> u8 {
    (flags & !(0b11 << shift)) | ((value & 0b11) << shift)
}

#[inline]
pub fn field2(flags: u8, shift: u8) -> u8 {
    (flags >> shift) & 0b11
}

/// Append-only encoder over a growable buffer.
#[derive(Debug, Default)]
pub struct MagicWriter {
    buf: BytesMut,
}

impl MagicWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_u64(value.to_bits());
    }

    pub fn write_compact_short(&mut self, value: i16) {
        if (0..=MAX_SHORT_LITERAL).contains(&value) {
            self.buf.put_u8(value as u8);
        } else {
            self.buf.put_u8(FULL_WIDTH_ESCAPE);
            self.buf.put_i16(value);
        }
    }

    pub fn write_compact_int(&mut self, value: i32) {
        if (0..=MAX_INT_LITERAL).contains(&(value as i64)) {
            self.buf.put_u8(value as u8);
        } else if let Ok(short) = i16::try_from(value) {
            self.buf.put_u8(INT_SHORT_ESCAPE);
            self.buf.put_i16(short);
        } else {
            self.buf.put_u8(FULL_WIDTH_ESCAPE);
            self.buf.put_i32(value);
        }
    }

    pub fn write_compact_long(&mut self, value: i64) {
        if (0..=MAX_INT_LITERAL).contains(&value) {
            self.buf.put_u8(value as u8);
        } else if let Ok(int) = i32::try_from(value) {
            self.buf.put_u8(INT_SHORT_ESCAPE);
            self.buf.put_i32(int);
        } else {
            self.buf.put_u8(FULL_WIDTH_ESCAPE);
            self.buf.put_i64(value);
        }
    }

    /// Writes a length as a compact int.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds `i32::MAX`; such a length has no encoding.
    pub fn write_compact_len(&mut self, len: usize) {
        match i32::try_from(len) {
            Ok(len) => self.write_compact_int(len),
            Err(_) => panic!("length {} does not fit a compact int", len),
        }
    }

    pub fn write_compact_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_len(bytes.len());
        self.buf.put_slice(bytes);
    }

    pub fn write_compact_string(&mut self, value: &str) {
        self.write_compact_bytes(value.as_bytes());
    }
}

/// Decoder over a shared, reference-counted buffer.
///
/// Sub-streams taken with [`MagicReader::read_sub_stream`] share the
/// backing allocation, which is what keeps lazily parsed child lists cheap.
#[derive(Debug, Clone)]
pub struct MagicReader {
    buf: Bytes,
}

impl MagicReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn require(&self, needed: usize) -> Result<()> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(MagicError::Truncated { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.require(8)?;
        Ok(f64::from_bits(self.buf.get_u64()))
    }

    pub fn read_compact_short(&mut self) -> Result<i16> {
        match self.read_u8()? {
            FULL_WIDTH_ESCAPE => {
                self.require(2)?;
                Ok(self.buf.get_i16())
            }
            literal => Ok(literal as i16),
        }
    }

    pub fn read_compact_int(&mut self) -> Result<i32> {
        match self.read_u8()? {
            INT_SHORT_ESCAPE => {
                self.require(2)?;
                Ok(self.buf.get_i16() as i32)
            }
            FULL_WIDTH_ESCAPE => {
                self.require(4)?;
                Ok(self.buf.get_i32())
            }
            literal => Ok(literal as i32),
        }
    }

    pub fn read_compact_long(&mut self) -> Result<i64> {
        match self.read_u8()? {
            INT_SHORT_ESCAPE => {
                self.require(4)?;
                Ok(self.buf.get_i32() as i64)
            }
            FULL_WIDTH_ESCAPE => {
                self.require(8)?;
                Ok(self.buf.get_i64())
            }
            literal => Ok(literal as i64),
        }
    }

    pub fn read_compact_len(&mut self) -> Result<usize> {
        let len = self.read_compact_int()?;
        usize::try_from(len).map_err(|_| MagicError::Truncated {
            needed: 0,
            remaining: self.remaining(),
        })
    }

    /// Splits off the next `len` bytes without copying.
    pub fn read_sub_stream(&mut self, len: usize) -> Result<Bytes> {
        self.require(len)?;
        Ok(self.buf.split_to(len))
    }

    pub fn read_compact_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_compact_len()?;
        Ok(self.read_sub_stream(len)?.to_vec())
    }

    pub fn read_compact_string(&mut self) -> Result<String> {
        let bytes = self.read_compact_bytes()?;
        String::from_utf8(bytes).map_err(|_| MagicError::InvalidUtf8)
    }
}
