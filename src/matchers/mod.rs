//! Value matchers
//!
//! One [`MagicMatcher`] variant per physical encoding. The variant order
//! below is not significant; the wire tag returned by [`MagicMatcher::tag`]
//! is, and must stay stable for stored rulesets to load.

mod numeric;
mod search;
mod string;

pub use numeric::{
    parse_number, Comparison, DateMatcher, FloatComparison, FloatMatcher, IntegerMatcher,
    TestOperator,
};
pub use search::{RegexMatcher, SearchMatcher, DEFAULT_MAX_OFFSET};
pub use string::{PStringMatcher, String16Matcher, StringFlags, StringMatcher};

use crate::codec::{MagicReader, MagicWriter};
use crate::error::{MagicError, Result};
use crate::formatter::MatchValue;
use crate::window::{ByteWindow, EndianType};

pub const TAG_BIG_ENDIAN_STRING16: u8 = 0;
pub const TAG_BYTE: u8 = 1;
pub const TAG_DATE: u8 = 2;
pub const TAG_DEFAULT: u8 = 3;
pub const TAG_DOUBLE: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_ID3_LENGTH: u8 = 6;
pub const TAG_INDIRECT: u8 = 7;
pub const TAG_INT: u8 = 8;
pub const TAG_LITTLE_ENDIAN_STRING16: u8 = 9;
pub const TAG_LONG_DATE: u8 = 10;
pub const TAG_LONG: u8 = 11;
pub const TAG_NAME: u8 = 12;
pub const TAG_PSTRING: u8 = 13;
pub const TAG_REGEX: u8 = 14;
pub const TAG_SEARCH: u8 = 15;
pub const TAG_SHORT: u8 = 16;
pub const TAG_STRING: u8 = 17;
pub const TAG_UNKNOWN: u8 = 18;
pub const TAG_USE: u8 = 19;

/// Result of a successful matcher test.
///
/// `value` is the extracted datum; it is only turned into text if the entry
/// ends up contributing to the final message.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome<'a> {
    pub consumed: usize,
    pub value: MatchValue<'a>,
}

impl<'a> MatchOutcome<'a> {
    pub fn new(consumed: usize, value: MatchValue<'a>) -> Self {
        Self { consumed, value }
    }

    fn empty() -> Self {
        Self::new(0, MatchValue::None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MagicMatcher {
    BigEndianString16(String16Matcher),
    Byte(IntegerMatcher),
    Date(DateMatcher),
    /// Always matches without consuming input.
    Default,
    Double(FloatMatcher),
    Float(FloatMatcher),
    Id3Length(IntegerMatcher),
    /// Jump: the entry's computed offset becomes the new probe origin.
    Indirect,
    Int(IntegerMatcher),
    LittleEndianString16(String16Matcher),
    LongDate(DateMatcher),
    Long(IntegerMatcher),
    /// Defines a named subtree reachable through `Use`.
    Name(String),
    PString(PStringMatcher),
    Regex(RegexMatcher),
    Search(SearchMatcher),
    Short(IntegerMatcher),
    String(StringMatcher),
    /// Placeholder for rule types this build cannot evaluate; never matches.
    Unknown,
    Use(String),
}

fn integer(reader: &mut MagicReader, width: usize) -> Result<IntegerMatcher> {
    IntegerMatcher::read(reader, width).map(|(matcher, _)| matcher)
}

impl MagicMatcher {
    pub fn byte(endian: EndianType) -> IntegerMatcher {
        IntegerMatcher::new(1, endian)
    }

    pub fn short(endian: EndianType) -> IntegerMatcher {
        IntegerMatcher::new(2, endian)
    }

    pub fn int(endian: EndianType) -> IntegerMatcher {
        IntegerMatcher::new(4, endian)
    }

    pub fn long(endian: EndianType) -> IntegerMatcher {
        IntegerMatcher::new(8, endian)
    }

    pub fn tag(&self) -> u8 {
        match self {
            MagicMatcher::BigEndianString16(_) => TAG_BIG_ENDIAN_STRING16,
            MagicMatcher::Byte(_) => TAG_BYTE,
            MagicMatcher::Date(_) => TAG_DATE,
            MagicMatcher::Default => TAG_DEFAULT,
            MagicMatcher::Double(_) => TAG_DOUBLE,
            MagicMatcher::Float(_) => TAG_FLOAT,
            MagicMatcher::Id3Length(_) => TAG_ID3_LENGTH,
            MagicMatcher::Indirect => TAG_INDIRECT,
            MagicMatcher::Int(_) => TAG_INT,
            MagicMatcher::LittleEndianString16(_) => TAG_LITTLE_ENDIAN_STRING16,
            MagicMatcher::LongDate(_) => TAG_LONG_DATE,
            MagicMatcher::Long(_) => TAG_LONG,
            MagicMatcher::Name(_) => TAG_NAME,
            MagicMatcher::PString(_) => TAG_PSTRING,
            MagicMatcher::Regex(_) => TAG_REGEX,
            MagicMatcher::Search(_) => TAG_SEARCH,
            MagicMatcher::Short(_) => TAG_SHORT,
            MagicMatcher::String(_) => TAG_STRING,
            MagicMatcher::Unknown => TAG_UNKNOWN,
            MagicMatcher::Use(_) => TAG_USE,
        }
    }

    /// libmagic type keyword, used in dumps and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            MagicMatcher::BigEndianString16(_) => "bestring16",
            MagicMatcher::Byte(_) => "byte",
            MagicMatcher::Date(_) => "date",
            MagicMatcher::Default => "default",
            MagicMatcher::Double(_) => "double",
            MagicMatcher::Float(_) => "float",
            MagicMatcher::Id3Length(_) => "id3",
            MagicMatcher::Indirect => "indirect",
            MagicMatcher::Int(_) => "long",
            MagicMatcher::LittleEndianString16(_) => "lestring16",
            MagicMatcher::LongDate(_) => "qdate",
            MagicMatcher::Long(_) => "quad",
            MagicMatcher::Name(_) => "name",
            MagicMatcher::PString(_) => "pstring",
            MagicMatcher::Regex(_) => "regex",
            MagicMatcher::Search(_) => "search",
            MagicMatcher::Short(_) => "short",
            MagicMatcher::String(_) => "string",
            MagicMatcher::Unknown => "unknown",
            MagicMatcher::Use(_) => "use",
        }
    }

    /// Tests `window`. `required` is false when the caller will not render
    /// the value, letting expensive conversions be skipped.
    pub fn is_match<'a>(&self, window: ByteWindow<'a>, required: bool) -> Option<MatchOutcome<'a>> {
        match self {
            MagicMatcher::BigEndianString16(m) | MagicMatcher::LittleEndianString16(m) => {
                m.is_match(window, required)
            }
            MagicMatcher::Byte(m)
            | MagicMatcher::Short(m)
            | MagicMatcher::Int(m)
            | MagicMatcher::Long(m) => m.is_match(window, false),
            MagicMatcher::Id3Length(m) => m.is_match(window, true),
            MagicMatcher::Date(m) | MagicMatcher::LongDate(m) => m.is_match(window, required),
            MagicMatcher::Double(m) | MagicMatcher::Float(m) => m.is_match(window),
            MagicMatcher::PString(m) => m.is_match(window),
            MagicMatcher::Regex(m) => m.is_match(window),
            MagicMatcher::Search(m) => m.is_match(window),
            MagicMatcher::String(m) => m.is_match(window),
            MagicMatcher::Default
            | MagicMatcher::Indirect
            | MagicMatcher::Name(_)
            | MagicMatcher::Use(_) => Some(MatchOutcome::empty()),
            MagicMatcher::Unknown => None,
        }
    }

    /// The only first input byte this matcher can accept at offset zero, if
    /// there is exactly one.
    pub fn starting_byte(&self) -> Option<u8> {
        match self {
            MagicMatcher::BigEndianString16(m) | MagicMatcher::LittleEndianString16(m) => {
                m.starting_byte()
            }
            MagicMatcher::Byte(m)
            | MagicMatcher::Short(m)
            | MagicMatcher::Int(m)
            | MagicMatcher::Long(m) => m.starting_byte(),
            MagicMatcher::Date(m) | MagicMatcher::LongDate(m) => m.integer().starting_byte(),
            MagicMatcher::String(m) => m.starting_byte(),
            _ => None,
        }
    }

    pub fn write(&self, writer: &mut MagicWriter) {
        writer.write_u8(self.tag());
        match self {
            MagicMatcher::BigEndianString16(m) | MagicMatcher::LittleEndianString16(m) => {
                m.write(writer)
            }
            MagicMatcher::Byte(m)
            | MagicMatcher::Short(m)
            | MagicMatcher::Int(m)
            | MagicMatcher::Long(m)
            | MagicMatcher::Id3Length(m) => m.write(writer, 0),
            MagicMatcher::Date(m) | MagicMatcher::LongDate(m) => m.write(writer),
            MagicMatcher::Double(m) | MagicMatcher::Float(m) => m.write(writer),
            MagicMatcher::PString(m) => m.write(writer),
            MagicMatcher::Regex(m) => m.write(writer),
            MagicMatcher::Search(m) => m.write(writer),
            MagicMatcher::String(m) => m.write(writer),
            MagicMatcher::Name(name) | MagicMatcher::Use(name) => writer.write_compact_string(name),
            MagicMatcher::Default | MagicMatcher::Indirect | MagicMatcher::Unknown => {}
        }
    }

    pub fn read(reader: &mut MagicReader) -> Result<Self> {
        let tag = reader.read_u8()?;
        let matcher = match tag {
            TAG_BIG_ENDIAN_STRING16 => {
                MagicMatcher::BigEndianString16(String16Matcher::read(reader, EndianType::Big)?)
            }
            TAG_BYTE => MagicMatcher::Byte(integer(reader, 1)?),
            TAG_DATE => MagicMatcher::Date(DateMatcher::read(reader, 4)?),
            TAG_DEFAULT => MagicMatcher::Default,
            TAG_DOUBLE => MagicMatcher::Double(FloatMatcher::read(reader, 8)?),
            TAG_FLOAT => MagicMatcher::Float(FloatMatcher::read(reader, 4)?),
            TAG_ID3_LENGTH => MagicMatcher::Id3Length(integer(reader, 4)?),
            TAG_INDIRECT => MagicMatcher::Indirect,
            TAG_INT => MagicMatcher::Int(integer(reader, 4)?),
            TAG_LITTLE_ENDIAN_STRING16 => MagicMatcher::LittleEndianString16(
                String16Matcher::read(reader, EndianType::Little)?,
            ),
            TAG_LONG_DATE => MagicMatcher::LongDate(DateMatcher::read(reader, 8)?),
            TAG_LONG => MagicMatcher::Long(integer(reader, 8)?),
            TAG_NAME => MagicMatcher::Name(reader.read_compact_string()?),
            TAG_PSTRING => MagicMatcher::PString(PStringMatcher::read(reader)?),
            TAG_REGEX => MagicMatcher::Regex(RegexMatcher::read(reader)?),
            TAG_SEARCH => MagicMatcher::Search(SearchMatcher::read(reader)?),
            TAG_SHORT => MagicMatcher::Short(integer(reader, 2)?),
            TAG_STRING => MagicMatcher::String(StringMatcher::read(reader)?),
            TAG_UNKNOWN => MagicMatcher::Unknown,
            TAG_USE => MagicMatcher::Use(reader.read_compact_string()?),
            other => return Err(MagicError::UnknownMatcherTag(other)),
        };
        Ok(matcher)
    }
}
