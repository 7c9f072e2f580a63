//! Fixed-width numeric matchers: integers, floats and dates.

use super::MatchOutcome;
use crate::codec::{field2, is_set, set_at, set_field2, MagicReader, MagicWriter};
use crate::error::{MagicError, Result};
use crate::formatter::MatchValue;
use crate::window::{ByteWindow, EndianType};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

const FLAG_ENDIAN_SHIFT: u8 = 0;
const FLAG_UNSIGNED: u8 = 2;
const FLAG_MASK: u8 = 3;
const FLAG_COMPARISON: u8 = 4;
const FLAG_LOCAL_TIME: u8 = 5;

const FLOAT_FLAG_COMPARISON: u8 = 2;

const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Relational test applied to an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestOperator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    /// Every operand bit is set in the value.
    AllSet,
    /// No operand bit is set in the value.
    AllClear,
    /// Value equals the bitwise complement of the operand.
    Negate,
}

impl TestOperator {
    pub fn as_char(self) -> char {
        match self {
            TestOperator::Equal => '=',
            TestOperator::NotEqual => '!',
            TestOperator::LessThan => '<',
            TestOperator::GreaterThan => '>',
            TestOperator::AllSet => '&',
            TestOperator::AllClear => '^',
            TestOperator::Negate => '~',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '=' => Some(TestOperator::Equal),
            '!' => Some(TestOperator::NotEqual),
            '<' => Some(TestOperator::LessThan),
            '>' => Some(TestOperator::GreaterThan),
            '&' => Some(TestOperator::AllSet),
            '^' => Some(TestOperator::AllClear),
            '~' => Some(TestOperator::Negate),
            _ => None,
        }
    }

    pub(crate) fn is_relational(self) -> bool {
        matches!(
            self,
            TestOperator::Equal
                | TestOperator::NotEqual
                | TestOperator::LessThan
                | TestOperator::GreaterThan
        )
    }

    pub(crate) fn read(reader: &mut MagicReader) -> Result<Self> {
        let c = reader.read_u8()? as char;
        Self::from_char(c).ok_or(MagicError::InvalidOperator(c))
    }

    pub(crate) fn write(self, writer: &mut MagicWriter) {
        writer.write_u8(self.as_char() as u8);
    }

    /// Splits a leading operator off `text`, defaulting to `Equal`.
    fn split(text: &str) -> (Self, &str) {
        let mut chars = text.chars();
        match chars.next().and_then(TestOperator::from_char) {
            Some(op) => (op, chars.as_str().trim_start()),
            None => (TestOperator::Equal, text),
        }
    }
}

impl fmt::Display for TestOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Parses a libmagic number: decimal, `0x` hex or leading-zero octal, with
/// an optional sign. Values wrap into `i64` the way C's `strtoull` does.
pub fn parse_number(text: &str) -> Result<i64> {
    let invalid = || MagicError::InvalidOperand(text.to_string());
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<u64>()
    }
    .map_err(|_| invalid())?;

    let value = magnitude as i64;
    Ok(if negative { value.wrapping_neg() } else { value })
}

/// An operator and integer operand, e.g. `=0x1234` or `&0x80`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Comparison {
    pub operator: TestOperator,
    pub operand: i64,
}

impl Comparison {
    pub fn new(operator: TestOperator, operand: i64) -> Self {
        Self { operator, operand }
    }

    /// Parses a test such as `=0x1234`, `<10` or a bare number. `x` means
    /// "any value" and yields `None`.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text == "x" {
            return Ok(None);
        }
        let (operator, rest) = TestOperator::split(text);
        let operand = parse_number(rest)?;
        Ok(Some(Comparison { operator, operand }))
    }
}

impl FromStr for Comparison {
    type Err = MagicError;

    fn from_str(s: &str) -> Result<Self> {
        Comparison::parse(s)?.ok_or_else(|| MagicError::InvalidOperand(s.to_string()))
    }
}

/// An operator and floating-point operand. Bitwise operators are rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatComparison {
    pub operator: TestOperator,
    pub operand: f64,
}

impl FloatComparison {
    pub fn new(operator: TestOperator, operand: f64) -> Result<Self> {
        if !operator.is_relational() {
            return Err(MagicError::UnsupportedOperator {
                operator: operator.as_char(),
                matcher: "float",
            });
        }
        Ok(Self { operator, operand })
    }

    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text == "x" {
            return Ok(None);
        }
        let (operator, rest) = TestOperator::split(text);
        let operand = rest
            .trim()
            .parse::<f64>()
            .map_err(|_| MagicError::InvalidOperand(text.to_string()))?;
        FloatComparison::new(operator, operand).map(Some)
    }

    fn test(&self, value: f64) -> bool {
        match self.operator {
            TestOperator::Equal => value == self.operand,
            TestOperator::NotEqual => value != self.operand,
            TestOperator::LessThan => value < self.operand,
            TestOperator::GreaterThan => value > self.operand,
            _ => false,
        }
    }
}

#[inline]
fn width_mask(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

#[inline]
fn sign_extend(value: u64, width: usize) -> i64 {
    if width >= 8 {
        return value as i64;
    }
    let shift = 64 - width * 8;
    ((value << shift) as i64) >> shift
}

/// Integer matcher shared by the byte/short/int/long/id3 variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntegerMatcher {
    width: usize,
    endian: EndianType,
    unsigned: bool,
    and_mask: Option<u64>,
    comparison: Option<Comparison>,
}

impl IntegerMatcher {
    /// `width` is the value size in bytes: 1, 2, 4 or 8.
    pub fn new(width: usize, endian: EndianType) -> Self {
        Self {
            width,
            endian,
            unsigned: false,
            and_mask: None,
            comparison: None,
        }
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    pub fn with_and_mask(mut self, mask: u64) -> Self {
        self.and_mask = Some(mask);
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn endian(&self) -> EndianType {
        self.endian
    }

    pub fn comparison(&self) -> Option<&Comparison> {
        self.comparison.as_ref()
    }

    pub fn and_mask(&self) -> Option<u64> {
        self.and_mask
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    fn extract(&self, window: ByteWindow<'_>, id3: bool) -> Option<i64> {
        let raw = if id3 {
            window.read_id3(0, self.width, self.endian)?
        } else {
            window.read_uint(0, self.width, self.endian)?
        };
        let masked = self.and_mask.map_or(raw, |mask| raw & mask);
        Some(if self.unsigned {
            masked as i64
        } else {
            sign_extend(masked, self.width)
        })
    }

    fn test(&self, value: i64) -> bool {
        let Some(comparison) = self.comparison else {
            return true;
        };
        let mask = width_mask(self.width);
        let v = value as u64 & mask;
        let operand = comparison.operand as u64 & mask;
        match comparison.operator {
            TestOperator::Equal => v == operand,
            TestOperator::NotEqual => v != operand,
            TestOperator::LessThan if self.unsigned => v < operand,
            TestOperator::LessThan => value < sign_extend(operand, self.width),
            TestOperator::GreaterThan if self.unsigned => v > operand,
            TestOperator::GreaterThan => value > sign_extend(operand, self.width),
            TestOperator::AllSet => v & operand == operand,
            TestOperator::AllClear => v & operand == 0,
            TestOperator::Negate => v == !operand & mask,
        }
    }

    fn value_of(&self, value: i64) -> MatchValue<'static> {
        if self.unsigned {
            MatchValue::Unsigned(value as u64 & width_mask(self.width))
        } else {
            MatchValue::Signed(value)
        }
    }

    pub(crate) fn match_value(&self, window: ByteWindow<'_>, id3: bool) -> Option<i64> {
        let value = self.extract(window, id3)?;
        self.test(value).then_some(value)
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>, id3: bool) -> Option<MatchOutcome<'a>> {
        let value = self.match_value(window, id3)?;
        Some(MatchOutcome::new(self.width, self.value_of(value)))
    }

    /// First byte of the input when this matcher can only accept one value.
    pub(crate) fn starting_byte(&self) -> Option<u8> {
        let comparison = self.comparison?;
        if comparison.operator != TestOperator::Equal {
            return None;
        }
        let mask = width_mask(self.width);
        if self.and_mask.is_some_and(|m| m & mask != mask) {
            return None;
        }
        let operand = comparison.operand as u64 & mask;
        Some(self.endian.first_stored_byte(operand, self.width))
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter, extra_flags: u8) {
        let mut flags = extra_flags;
        flags = set_field2(flags, FLAG_ENDIAN_SHIFT, self.endian.id());
        flags = set_at(flags, FLAG_UNSIGNED, self.unsigned);
        flags = set_at(flags, FLAG_MASK, self.and_mask.is_some());
        flags = set_at(flags, FLAG_COMPARISON, self.comparison.is_some());
        writer.write_u8(flags);
        if let Some(mask) = self.and_mask {
            writer.write_compact_long(mask as i64);
        }
        if let Some(comparison) = self.comparison {
            comparison.operator.write(writer);
            writer.write_compact_long(comparison.operand);
        }
    }

    /// Reads the payload; returns the matcher and its raw flags byte so
    /// wrappers can recover their own bits.
    pub(crate) fn read(reader: &mut MagicReader, width: usize) -> Result<(Self, u8)> {
        let flags = reader.read_u8()?;
        let endian_id = field2(flags, FLAG_ENDIAN_SHIFT);
        let endian = EndianType::from_id(endian_id).ok_or(MagicError::InvalidEndian(endian_id))?;
        let and_mask = if is_set(flags, FLAG_MASK) {
            Some(reader.read_compact_long()? as u64)
        } else {
            None
        };
        let comparison = if is_set(flags, FLAG_COMPARISON) {
            let operator = TestOperator::read(reader)?;
            Some(Comparison::new(operator, reader.read_compact_long()?))
        } else {
            None
        };
        let matcher = Self {
            width,
            endian,
            unsigned: is_set(flags, FLAG_UNSIGNED),
            and_mask,
            comparison,
        };
        Ok((matcher, flags))
    }
}

/// 4-byte float or 8-byte double.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMatcher {
    width: usize,
    endian: EndianType,
    comparison: Option<FloatComparison>,
}

impl FloatMatcher {
    pub fn float(endian: EndianType) -> Self {
        Self {
            width: 4,
            endian,
            comparison: None,
        }
    }

    pub fn double(endian: EndianType) -> Self {
        Self {
            width: 8,
            endian,
            comparison: None,
        }
    }

    pub fn with_comparison(mut self, comparison: FloatComparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn comparison(&self) -> Option<&FloatComparison> {
        self.comparison.as_ref()
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>) -> Option<MatchOutcome<'a>> {
        let raw = window.read_uint(0, self.width, self.endian)?;
        let value = if self.width == 4 {
            f32::from_bits(raw as u32) as f64
        } else {
            f64::from_bits(raw)
        };
        if let Some(comparison) = &self.comparison {
            if !comparison.test(value) {
                return None;
            }
        }
        Some(MatchOutcome::new(self.width, MatchValue::Float(value)))
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        let mut flags = set_field2(0, FLAG_ENDIAN_SHIFT, self.endian.id());
        flags = set_at(flags, FLOAT_FLAG_COMPARISON, self.comparison.is_some());
        writer.write_u8(flags);
        if let Some(comparison) = &self.comparison {
            comparison.operator.write(writer);
            writer.write_f64(comparison.operand);
        }
    }

    pub(crate) fn read(reader: &mut MagicReader, width: usize) -> Result<Self> {
        let flags = reader.read_u8()?;
        let endian_id = field2(flags, FLAG_ENDIAN_SHIFT);
        let endian = EndianType::from_id(endian_id).ok_or(MagicError::InvalidEndian(endian_id))?;
        let comparison = if is_set(flags, FLOAT_FLAG_COMPARISON) {
            let operator = TestOperator::read(reader)?;
            Some(FloatComparison::new(operator, reader.read_f64()?)?)
        } else {
            None
        };
        Ok(Self {
            width,
            endian,
            comparison,
        })
    }
}

/// Seconds since the Unix epoch, compared as an integer and rendered as a
/// calendar timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateMatcher {
    int: IntegerMatcher,
    local: bool,
}

impl DateMatcher {
    /// 4-byte `date`.
    pub fn date(endian: EndianType) -> Self {
        Self {
            int: IntegerMatcher::new(4, endian),
            local: false,
        }
    }

    /// 8-byte `qdate`.
    pub fn long_date(endian: EndianType) -> Self {
        Self {
            int: IntegerMatcher::new(8, endian),
            local: false,
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.int = self.int.with_comparison(comparison);
        self
    }

    pub fn integer(&self) -> &IntegerMatcher {
        &self.int
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>, required: bool) -> Option<MatchOutcome<'a>> {
        let seconds = self.int.match_value(window, false)?;
        let value = if required {
            MatchValue::Text(self.render_timestamp(seconds).into())
        } else {
            MatchValue::Signed(seconds)
        };
        Some(MatchOutcome::new(self.int.width(), value))
    }

    fn render_timestamp(&self, seconds: i64) -> String {
        let rendered = if self.local {
            Local
                .timestamp_opt(seconds, 0)
                .single()
                .map(|t| t.format(DATE_FORMAT).to_string())
        } else {
            DateTime::<Utc>::from_timestamp(seconds, 0).map(|t| t.format(DATE_FORMAT).to_string())
        };
        rendered.unwrap_or_else(|| seconds.to_string())
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        self.int.write(writer, set_at(0, FLAG_LOCAL_TIME, self.local));
    }

    pub(crate) fn read(reader: &mut MagicReader, width: usize) -> Result<Self> {
        let (int, flags) = IntegerMatcher::read(reader, width)?;
        Ok(Self {
            int,
            local: is_set(flags, FLAG_LOCAL_TIME),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(bytes: &[u8]) -> ByteWindow<'_> {
        ByteWindow::new(bytes)
    }

    #[test]
    fn parses_numbers_in_all_bases() {
        assert_eq!(parse_number("42").unwrap(), 42);
        assert_eq!(parse_number("0x1F").unwrap(), 31);
        assert_eq!(parse_number("010").unwrap(), 8);
        assert_eq!(parse_number("-3").unwrap(), -3);
        assert_eq!(parse_number("0").unwrap(), 0);
        assert!(matches!(
            parse_number("PDF"),
            Err(MagicError::InvalidOperand(_))
        ));
    }

    #[test]
    fn parses_comparisons() {
        assert_eq!(
            Comparison::parse("=0x1234").unwrap(),
            Some(Comparison::new(TestOperator::Equal, 0x1234))
        );
        assert_eq!(
            Comparison::parse("&0x80").unwrap(),
            Some(Comparison::new(TestOperator::AllSet, 0x80))
        );
        assert_eq!(
            Comparison::parse("7").unwrap(),
            Some(Comparison::new(TestOperator::Equal, 7))
        );
        assert_eq!(Comparison::parse("x").unwrap(), None);
        assert!(Comparison::parse("<abc").is_err());
        assert!("~5".parse::<Comparison>().is_ok());
    }

    #[test]
    fn float_comparisons_reject_bitwise_operators() {
        assert!(matches!(
            FloatComparison::parse("&1.0"),
            Err(MagicError::UnsupportedOperator { operator: '&', .. })
        ));
        assert_eq!(
            FloatComparison::parse("<2.5").unwrap().unwrap().operand,
            2.5
        );
    }

    #[test]
    fn signed_and_unsigned_ordering() {
        let signed = IntegerMatcher::new(1, EndianType::Big)
            .with_comparison(Comparison::new(TestOperator::LessThan, 0));
        assert!(signed.is_match(window(&[0xFF]), false).is_some());

        let unsigned = signed.clone().unsigned();
        assert!(unsigned.is_match(window(&[0xFF]), false).is_none());
    }

    #[test]
    fn bitwise_operators() {
        let all_set = IntegerMatcher::new(1, EndianType::Big)
            .with_comparison(Comparison::new(TestOperator::AllSet, 0x81));
        assert!(all_set.is_match(window(&[0xC1]), false).is_some());
        assert!(all_set.is_match(window(&[0x41]), false).is_none());

        let all_clear = IntegerMatcher::new(1, EndianType::Big)
            .with_comparison(Comparison::new(TestOperator::AllClear, 0x80));
        assert!(all_clear.is_match(window(&[0x7F]), false).is_some());

        let negate = IntegerMatcher::new(2, EndianType::Big)
            .with_comparison(Comparison::new(TestOperator::Negate, 0x00FF));
        assert!(negate.is_match(window(&[0xFF, 0x00]), false).is_some());
    }

    #[test]
    fn and_mask_applies_before_comparison() {
        let matcher = IntegerMatcher::new(4, EndianType::Little)
            .with_and_mask(0xFF)
            .with_comparison(Comparison::new(TestOperator::Equal, 0x2A));
        assert!(matcher.is_match(window(&[0x2A, 0x11, 0x22, 0x33]), false).is_some());
        assert_eq!(matcher.starting_byte(), None);
    }

    #[test]
    fn id3_length_reads_synchsafe() {
        let matcher = IntegerMatcher::new(4, EndianType::Big)
            .with_comparison(Comparison::new(TestOperator::Equal, 257));
        assert!(matcher.is_match(window(&[0, 0, 2, 1]), true).is_some());
    }

    #[test]
    fn float_and_double_extract() {
        let bytes = 1.5f32.to_le_bytes();
        let matcher = FloatMatcher::float(EndianType::Little)
            .with_comparison(FloatComparison::new(TestOperator::Equal, 1.5).unwrap());
        let outcome = matcher.is_match(window(&bytes)).unwrap();
        assert_eq!(outcome.consumed, 4);
        assert_eq!(outcome.value, MatchValue::Float(1.5));

        let bytes = (-2.0f64).to_be_bytes();
        let matcher = FloatMatcher::double(EndianType::Big)
            .with_comparison(FloatComparison::new(TestOperator::LessThan, 0.0).unwrap());
        assert!(matcher.is_match(window(&bytes)).is_some());
    }

    #[test]
    fn date_renders_utc() {
        let matcher = DateMatcher::date(EndianType::Big);
        let outcome = matcher.is_match(window(&[0, 0, 0, 0]), true).unwrap();
        assert_eq!(
            outcome.value,
            MatchValue::Text("Thu Jan  1 00:00:00 1970".into())
        );
        let outcome = matcher.is_match(window(&[0, 0, 0, 0]), false).unwrap();
        assert_eq!(outcome.value, MatchValue::Signed(0));
    }
}
