//! Read-only byte windows
//!
//! Every matcher works on a `ByteWindow` instead of a copied buffer. Slicing
//! a window only moves its bounds, so following offsets through a rule tree
//! never allocates.

use std::fmt;
use std::ops::Index;

/// Byte order used when assembling multi-byte values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndianType {
    #[default]
    Big = 0,
    Little = 1,
    /// PDP-11 order: 16-bit halves stored little-endian, high half first.
    Middle = 2,
    Native = 3,
}

impl EndianType {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(EndianType::Big),
            1 => Some(EndianType::Little),
            2 => Some(EndianType::Middle),
            3 => Some(EndianType::Native),
            _ => None,
        }
    }

    /// Resolves `Native` to the host byte order.
    pub fn resolve(self) -> Self {
        match self {
            EndianType::Native if cfg!(target_endian = "little") => EndianType::Little,
            EndianType::Native => EndianType::Big,
            other => other,
        }
    }

    /// Assembles an unsigned value from `bytes` (1 to 8 bytes).
    pub fn assemble(self, bytes: &[u8]) -> u64 {
        match self.resolve() {
            EndianType::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64),
            EndianType::Middle if bytes.len() == 4 => {
                ((bytes[1] as u64) << 24)
                    | ((bytes[0] as u64) << 16)
                    | ((bytes[3] as u64) << 8)
                    | bytes[2] as u64
            }
            _ => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
        }
    }

    /// Assembles an ID3 synch-safe integer: 7 significant bits per byte.
    pub fn assemble_id3(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 7) | (*b & 0x7F) as u64;
        match self.resolve() {
            EndianType::Little => bytes.iter().rev().fold(0, fold),
            _ => bytes.iter().fold(0, fold),
        }
    }

    /// Returns the byte of a `width`-byte value that is stored first.
    pub fn first_stored_byte(self, value: u64, width: usize) -> u8 {
        match self.resolve() {
            EndianType::Little => value as u8,
            EndianType::Middle if width == 4 => (value >> 16) as u8,
            _ => (value >> ((width - 1) * 8)) as u8,
        }
    }
}

impl fmt::Display for EndianType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndianType::Big => "big",
            EndianType::Little => "little",
            EndianType::Middle => "middle",
            EndianType::Native => "native",
        };
        f.write_str(name)
    }
}

/// An immutable view `(backing, offset, length)` over caller-owned bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow<'a> {
    backing: &'a [u8],
    offset: usize,
    len: usize,
}

impl<'a> ByteWindow<'a> {
    pub fn new(backing: &'a [u8]) -> Self {
        Self {
            backing,
            offset: 0,
            len: backing.len(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of this window inside the backing buffer.
    #[inline]
    pub fn base_offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        &self.backing[self.offset..self.offset + self.len]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.backing[self.offset + index])
        } else {
            None
        }
    }

    /// Window starting at `offset` and running to the end. `None` when
    /// `offset` is past the end; an offset equal to the size yields an
    /// empty window.
    pub fn slice(&self, offset: usize) -> Option<ByteWindow<'a>> {
        if offset > self.len {
            return None;
        }
        Some(ByteWindow {
            backing: self.backing,
            offset: self.offset + offset,
            len: self.len - offset,
        })
    }

    /// Window of exactly `len` bytes at `offset`.
    pub fn slice_len(&self, offset: usize, len: usize) -> Option<ByteWindow<'a>> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        Some(ByteWindow {
            backing: self.backing,
            offset: self.offset + offset,
            len,
        })
    }

    /// Window truncated to at most `len` bytes.
    pub fn truncate(&self, len: usize) -> ByteWindow<'a> {
        ByteWindow {
            backing: self.backing,
            offset: self.offset,
            len: self.len.min(len),
        }
    }

    /// Reads a `width`-byte unsigned value at `offset`.
    pub fn read_uint(&self, offset: usize, width: usize, endian: EndianType) -> Option<u64> {
        let bytes = self.slice_len(offset, width)?;
        Some(endian.assemble(bytes.as_slice()))
    }

    pub fn read_id3(&self, offset: usize, width: usize, endian: EndianType) -> Option<u64> {
        let bytes = self.slice_len(offset, width)?;
        Some(endian.assemble_id3(bytes.as_slice()))
    }
}

impl Index<usize> for ByteWindow<'_> {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        assert!(
            index < self.len,
            "index {} out of range for window of {} bytes",
            index,
            self.len
        );
        &self.backing[self.offset + index]
    }
}

impl<'a> From<&'a [u8]> for ByteWindow<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ByteWindow::new(bytes)
    }
}

impl fmt::Debug for ByteWindow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteWindow")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}
