//! Indirect offsets: `(x.s+y)` in libmagic rule syntax.

use crate::codec::{field2, is_set, set_at, set_field2, MagicReader, MagicWriter};
use crate::error::{MagicError, Result};
use crate::window::{ByteWindow, EndianType};

const FLAG_ADD_OFFSET: u8 = 0;
const FLAG_ID3: u8 = 1;
const FLAG_ENDIAN_SHIFT: u8 = 2;

/// Reads a `size`-byte integer at `offset` and adds `add` to it.
///
/// With `add_offset` the read position is taken relative to the end of the
/// parent match instead of the start of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetInfo {
    offset: i32,
    endian: EndianType,
    add_offset: bool,
    is_id3: bool,
    size: u8,
    add: i32,
}

impl OffsetInfo {
    pub fn new(offset: i32, size: u8, endian: EndianType) -> Result<Self> {
        if !matches!(size, 1 | 2 | 4) {
            return Err(MagicError::InvalidOffsetSize(size));
        }
        Ok(Self {
            offset,
            endian,
            add_offset: false,
            is_id3: false,
            size,
            add: 0,
        })
    }

    pub fn relative(mut self) -> Self {
        self.add_offset = true;
        self
    }

    pub fn id3(mut self) -> Self {
        self.is_id3 = true;
        self
    }

    pub fn with_add(mut self, add: i32) -> Self {
        self.add = add;
        self
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn add(&self) -> i32 {
        self.add
    }

    pub fn endian(&self) -> EndianType {
        self.endian
    }

    pub fn is_relative(&self) -> bool {
        self.add_offset
    }

    pub fn is_id3(&self) -> bool {
        self.is_id3
    }

    /// Computes the target offset, or `None` when the pointer cannot be read
    /// or the result is negative.
    pub fn get_offset(&self, window: ByteWindow<'_>, prev_offset: usize) -> Option<i64> {
        let mut position = self.offset as i64;
        if self.add_offset {
            position += prev_offset as i64;
        }
        let position = usize::try_from(position).ok()?;
        let width = self.size as usize;
        let raw = if self.is_id3 {
            window.read_id3(position, width, self.endian)?
        } else {
            window.read_uint(position, width, self.endian)?
        };
        let target = raw as i64 + self.add as i64;
        (target >= 0).then_some(target)
    }

    pub fn write(&self, writer: &mut MagicWriter) {
        let mut flags = set_at(0, FLAG_ADD_OFFSET, self.add_offset);
        flags = set_at(flags, FLAG_ID3, self.is_id3);
        flags = set_field2(flags, FLAG_ENDIAN_SHIFT, self.endian.id());
        writer.write_u8(flags);
        writer.write_compact_int(self.offset);
        writer.write_compact_int(self.size as i32);
        writer.write_compact_int(self.add);
    }

    pub fn read(reader: &mut MagicReader) -> Result<Self> {
        let flags = reader.read_u8()?;
        let endian_id = field2(flags, FLAG_ENDIAN_SHIFT);
        let endian = EndianType::from_id(endian_id).ok_or(MagicError::InvalidEndian(endian_id))?;
        let offset = reader.read_compact_int()?;
        let size = reader.read_compact_int()?;
        let add = reader.read_compact_int()?;
        let size = u8::try_from(size).map_err(|_| MagicError::InvalidOffsetSize(u8::MAX))?;
        let mut info = OffsetInfo::new(offset, size, endian)?.with_add(add);
        info.add_offset = is_set(flags, FLAG_ADD_OFFSET);
        info.is_id3 = is_set(flags, FLAG_ID3);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_sizes() {
        for size in [0u8, 3, 8] {
            assert!(matches!(
                OffsetInfo::new(0, size, EndianType::Big),
                Err(MagicError::InvalidOffsetSize(s)) if s == size
            ));
        }
    }

    #[test]
    fn reads_pointer_and_adds_constant() {
        // little-endian u32 pointer at 4 → 0x10, plus 2
        let data = [0, 0, 0, 0, 0x10, 0, 0, 0];
        let info = OffsetInfo::new(4, 4, EndianType::Little).unwrap().with_add(2);
        assert_eq!(info.get_offset(ByteWindow::new(&data), 0), Some(0x12));
    }

    #[test]
    fn relative_pointer_uses_previous_offset() {
        let data = [0xAA, 0xAA, 0x05];
        let info = OffsetInfo::new(0, 1, EndianType::Big).unwrap().relative();
        assert_eq!(info.get_offset(ByteWindow::new(&data), 2), Some(5));
        assert_eq!(info.get_offset(ByteWindow::new(&data), 3), None);
    }

    #[test]
    fn negative_result_is_no_offset() {
        let info = OffsetInfo::new(0, 1, EndianType::Big).unwrap().with_add(-10);
        assert_eq!(info.get_offset(ByteWindow::new(&[4]), 0), None);
    }

    #[test]
    fn id3_pointer() {
        let info = OffsetInfo::new(0, 4, EndianType::Big).unwrap().id3().with_add(10);
        assert_eq!(info.get_offset(ByteWindow::new(&[0, 0, 1, 0x7F]), 0), Some(255 + 10));
    }

    #[test]
    fn invalid_size_in_stream_fails_to_load() {
        let mut writer = MagicWriter::new();
        writer.write_u8(0);
        writer.write_compact_int(0);
        writer.write_compact_int(3);
        writer.write_compact_int(0);
        let mut reader = MagicReader::new(writer.into_bytes());
        assert!(matches!(
            OffsetInfo::read(&mut reader),
            Err(MagicError::InvalidOffsetSize(3))
        ));
    }
}
