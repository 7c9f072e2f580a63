//! Built-in signature set covering common images, archives and executables.

use crate::entry::MagicEntry;
use crate::error::Result;
use crate::matchers::{
    Comparison, DateMatcher, IntegerMatcher, MagicMatcher, StringMatcher, TestOperator,
};
use crate::offset::OffsetInfo;
use crate::strength::order_by_strength;
use crate::window::EndianType;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

const ID3_HEADER_LEN: i32 = 10;

fn string(pattern: impl Into<Vec<u8>>) -> MagicEntry {
    MagicEntry::new(MagicMatcher::String(StringMatcher::new(pattern)))
}

fn equals(matcher: IntegerMatcher, operand: i64) -> IntegerMatcher {
    matcher.with_comparison(Comparison::new(TestOperator::Equal, operand))
}

fn byte_eq(operand: i64) -> MagicEntry {
    MagicEntry::new(MagicMatcher::Byte(equals(
        MagicMatcher::byte(EndianType::Big),
        operand,
    )))
}

fn any_byte() -> MagicEntry {
    MagicEntry::new(MagicMatcher::Byte(MagicMatcher::byte(EndianType::Big).unsigned()))
}

fn any_short(endian: EndianType) -> MagicEntry {
    MagicEntry::new(MagicMatcher::Short(MagicMatcher::short(endian).unsigned()))
}

fn any_int(endian: EndianType) -> MagicEntry {
    MagicEntry::new(MagicMatcher::Int(MagicMatcher::int(endian).unsigned()))
}

fn pdf() -> Result<MagicEntry> {
    Ok(string("%PDF-")
        .with_mime_type("application/pdf")
        .with_message("PDF document")?
        .with_child(string("").relative().with_message("\\b, version %s")?))
}

fn png() -> Result<MagicEntry> {
    let ihdr = string("IHDR").with_offset(12).with_children(vec![
        any_int(EndianType::Big)
            .with_offset(16)
            .with_message("\\b, %d x")?,
        any_int(EndianType::Big).with_offset(20).with_message("%d")?,
    ]);
    Ok(string(PNG_SIGNATURE)
        .with_mime_type("image/png")
        .with_message("PNG image data")?
        .with_child(ihdr))
}

fn jpeg() -> Result<MagicEntry> {
    Ok(MagicEntry::new(MagicMatcher::Short(equals(
        MagicMatcher::short(EndianType::Big).unsigned(),
        0xFFD8,
    )))
    .with_mime_type("image/jpeg")
    .with_message("JPEG image data")?
    .with_children(vec![
        string("JFIF")
            .with_offset(6)
            .optional()
            .with_message("\\b, JFIF standard")?,
        string("Exif")
            .with_offset(6)
            .optional()
            .with_message("\\b, Exif standard")?,
    ]))
}

fn gif() -> Result<MagicEntry> {
    Ok(string("GIF8")
        .with_mime_type("image/gif")
        .with_message("GIF image data")?
        .with_children(vec![
            string("7a")
                .with_offset(4)
                .optional()
                .with_message("\\b, version 87a")?,
            string("9a")
                .with_offset(4)
                .optional()
                .with_message("\\b, version 89a")?,
            any_short(EndianType::Little)
                .with_offset(6)
                .optional()
                .with_message("\\b, %d x")?,
            any_short(EndianType::Little)
                .with_offset(8)
                .optional()
                .with_message("%d")?,
        ]))
}

fn bmp() -> Result<MagicEntry> {
    // DIB header sizes run from 12 (OS/2) to 124 (V5)
    let dib = MagicEntry::new(MagicMatcher::Int(
        MagicMatcher::int(EndianType::Little)
            .unsigned()
            .with_comparison(Comparison::new(TestOperator::LessThan, 125)),
    ))
    .with_offset(14)
    .with_children(vec![
        any_int(EndianType::Little)
            .with_offset(18)
            .optional()
            .with_message("\\b, %d x")?,
        any_int(EndianType::Little)
            .with_offset(22)
            .optional()
            .with_message("%d")?,
    ]);
    Ok(string("BM")
        .with_mime_type("image/bmp")
        .with_message("PC bitmap")?
        .with_child(dib))
}

fn riff() -> Result<MagicEntry> {
    Ok(string("RIFF")
        .with_message("RIFF (little-endian) data")?
        .with_children(vec![
            string("WEBP")
                .with_offset(8)
                .with_mime_type("image/webp")
                .with_message("\\b, Web/P image")?,
            string("WAVE")
                .with_offset(8)
                .with_mime_type("audio/x-wav")
                .with_message("\\b, WAVE audio")?,
        ]))
}

fn tiff() -> Result<Vec<MagicEntry>> {
    Ok(vec![
        string("II*\0")
            .with_mime_type("image/tiff")
            .with_message("TIFF image data, little-endian")?,
        string("MM\0*")
            .with_mime_type("image/tiff")
            .with_message("TIFF image data, big-endian")?,
    ])
}

fn zip() -> Result<MagicEntry> {
    Ok(string("PK\x03\x04")
        .with_mime_type("application/zip")
        .with_message("Zip archive data")?
        .with_child(
            any_short(EndianType::Little)
                .with_offset(4)
                .with_message("\\b, extract version %d")?,
        ))
}

fn gzip() -> Result<MagicEntry> {
    let modified = MagicEntry::new(MagicMatcher::Date(
        DateMatcher::date(EndianType::Little)
            .with_comparison(Comparison::new(TestOperator::GreaterThan, 0)),
    ))
    .with_offset(4)
    .optional()
    .with_message("\\b, last modified: %s")?;
    Ok(MagicEntry::new(MagicMatcher::Short(equals(
        MagicMatcher::short(EndianType::Big).unsigned(),
        0x1F8B,
    )))
    .with_mime_type("application/gzip")
    .with_message("gzip compressed data")?
    .with_children(vec![
        byte_eq(8)
            .with_offset(2)
            .optional()
            .with_message("\\b, deflated")?,
        modified,
    ]))
}

fn elf() -> Result<MagicEntry> {
    Ok(string("\x7FELF")
        .with_mime_type("application/x-executable")
        .with_message("ELF")?
        .with_children(vec![
            byte_eq(1).with_offset(4).with_message("32-bit")?,
            byte_eq(2).with_offset(4).with_message("64-bit")?,
            MagicEntry::new(MagicMatcher::Default)
                .with_offset(4)
                .with_message("invalid class")?,
            byte_eq(1).with_offset(5).with_message("LSB")?,
            byte_eq(2).with_offset(5).with_message("MSB")?,
        ]))
}

/// ID3v2 tag; the audio stream starts after the tag, whose size is a
/// synch-safe integer at offset 6.
fn id3() -> Result<MagicEntry> {
    let skip_tag = OffsetInfo::new(6, 4, EndianType::Big)?
        .id3()
        .with_add(ID3_HEADER_LEN);
    Ok(string("ID3")
        .with_mime_type("audio/mpeg")
        .with_message("Audio file with ID3 version 2")?
        .with_children(vec![
            any_byte().with_offset(3).with_message("\\b.%d")?,
            any_byte().with_offset(4).with_message("\\b.%d")?,
            MagicEntry::new(MagicMatcher::Indirect)
                .with_offset_info(skip_tag)
                .with_message("\\b, contains:")?,
        ]))
}

fn mpeg_audio() -> Result<MagicEntry> {
    // MPEG-1 layer III frame sync, with or without CRC
    Ok(MagicEntry::new(MagicMatcher::Short(
        MagicMatcher::short(EndianType::Big)
            .unsigned()
            .with_and_mask(0xFFFE)
            .with_comparison(Comparison::new(TestOperator::Equal, 0xFFFA)),
    ))
    .with_mime_type("audio/mpeg")
    .with_message("MPEG ADTS, layer III, v1")?)
}

/// The built-in rules, strongest first.
pub fn default_entries() -> Result<Vec<MagicEntry>> {
    let mut entries = vec![
        pdf()?,
        png()?,
        jpeg()?,
        gif()?,
        bmp()?,
        riff()?,
        zip()?,
        gzip()?,
        elf()?,
        id3()?,
        mpeg_audio()?,
    ];
    entries.extend(tiff()?);
    order_by_strength(&mut entries);
    Ok(entries)
}
