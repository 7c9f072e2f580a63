//! String matchers built on one generalized scan.
//!
//! The scan walks pattern and input through index accessors, so the same
//! loop serves 8-bit strings, length-prefixed strings, bounded searches and
//! UTF-16 code units. Encodings only decide how a character is read.

use super::numeric::TestOperator;
use super::MatchOutcome;
use crate::codec::{is_set, set_at, MagicReader, MagicWriter};
use crate::error::{MagicError, Result};
use crate::formatter::MatchValue;
use crate::window::{ByteWindow, EndianType};

const FLAG_COMPACT_WHITESPACE: u8 = 0;
const FLAG_OPTIONAL_WHITESPACE: u8 = 1;
const FLAG_CASE_LOWER: u8 = 2;
const FLAG_CASE_UPPER: u8 = 3;

/// Longest "any string" value captured for rendering.
const MAX_ANY_STRING: usize = 256;

/// libmagic string modifiers: `W`, `w`, `c` and `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringFlags {
    /// A pattern blank matches one or more blanks in the input.
    pub compact_whitespace: bool,
    /// A pattern blank matches zero or more blanks in the input.
    pub optional_whitespace: bool,
    pub case_insensitive_lower: bool,
    pub case_insensitive_upper: bool,
}

impl StringFlags {
    pub fn is_empty(&self) -> bool {
        *self == StringFlags::default()
    }

    /// Parses a modifier string such as `"Wc"`; unknown letters are ignored.
    pub fn parse(modifiers: &str) -> Self {
        let mut flags = StringFlags::default();
        for c in modifiers.chars() {
            match c {
                'W' => flags.compact_whitespace = true,
                'w' => flags.optional_whitespace = true,
                'c' => flags.case_insensitive_lower = true,
                'C' => flags.case_insensitive_upper = true,
                _ => {}
            }
        }
        flags
    }

    pub(crate) fn to_bits(self) -> u8 {
        let mut bits = 0;
        bits = set_at(bits, FLAG_COMPACT_WHITESPACE, self.compact_whitespace);
        bits = set_at(bits, FLAG_OPTIONAL_WHITESPACE, self.optional_whitespace);
        bits = set_at(bits, FLAG_CASE_LOWER, self.case_insensitive_lower);
        set_at(bits, FLAG_CASE_UPPER, self.case_insensitive_upper)
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        StringFlags {
            compact_whitespace: is_set(bits, FLAG_COMPACT_WHITESPACE),
            optional_whitespace: is_set(bits, FLAG_OPTIONAL_WHITESPACE),
            case_insensitive_lower: is_set(bits, FLAG_CASE_LOWER),
            case_insensitive_upper: is_set(bits, FLAG_CASE_UPPER),
        }
    }
}

#[inline]
fn is_whitespace(c: u32) -> bool {
    char::from_u32(c).is_some_and(char::is_whitespace)
}

#[inline]
fn fold_lower(c: u32) -> u32 {
    char::from_u32(c).map_or(c, |ch| ch.to_ascii_lowercase() as u32)
}

#[inline]
fn fold_upper(c: u32) -> u32 {
    char::from_u32(c).map_or(c, |ch| ch.to_ascii_uppercase() as u32)
}

/// Character test for one pattern position. Ordering operators only apply
/// to the last character; earlier characters must be equal.
#[inline]
fn do_test(operator: TestOperator, input: u32, pattern: u32, last_char: bool) -> bool {
    match operator {
        TestOperator::LessThan if last_char => input < pattern,
        TestOperator::GreaterThan if last_char => input > pattern,
        _ => input == pattern,
    }
}

/// Walks `pattern` against `input` in lock-step and returns the number of
/// input units consumed, or `None` when the pattern cannot be satisfied.
pub(crate) fn scan<P, I>(
    pattern_len: usize,
    pattern: P,
    input: I,
    operator: TestOperator,
    flags: StringFlags,
) -> Option<usize>
where
    P: Fn(usize) -> u32,
    I: Fn(usize) -> Option<u32>,
{
    let mut pattern_pos = 0;
    let mut input_pos = 0;
    let mut previous_was_whitespace = false;

    while pattern_pos < pattern_len {
        let wanted = pattern(pattern_pos);
        let last_char = pattern_pos + 1 == pattern_len;

        if flags.optional_whitespace && is_whitespace(wanted) {
            while input(input_pos).is_some_and(is_whitespace) {
                input_pos += 1;
            }
            pattern_pos += 1;
            previous_was_whitespace = true;
            continue;
        }

        let got = input(input_pos)?;
        if do_test(operator, got, wanted, last_char) {
            input_pos += 1;
            pattern_pos += 1;
            previous_was_whitespace = is_whitespace(wanted);
            continue;
        }

        if flags.compact_whitespace && previous_was_whitespace && is_whitespace(got) {
            while input(input_pos).is_some_and(is_whitespace) {
                input_pos += 1;
            }
            // retry the same pattern character after the run
            continue;
        }

        let folded = (flags.case_insensitive_lower
            && do_test(operator, fold_lower(got), fold_lower(wanted), last_char))
            || (flags.case_insensitive_upper
                && do_test(operator, fold_upper(got), fold_upper(wanted), last_char));
        if folded {
            input_pos += 1;
            pattern_pos += 1;
            previous_was_whitespace = false;
            continue;
        }

        return None;
    }

    Some(input_pos)
}

/// Scans an 8-bit pattern against a byte window.
pub(crate) fn scan_bytes(
    pattern: &[u8],
    window: ByteWindow<'_>,
    operator: TestOperator,
    flags: StringFlags,
) -> Option<usize> {
    scan(
        pattern.len(),
        |i| pattern[i] as u32,
        |i| window.get(i).map(u32::from),
        operator,
        flags,
    )
}

fn check_string_operator(operator: TestOperator) -> Result<TestOperator> {
    if operator.is_relational() {
        Ok(operator)
    } else {
        Err(MagicError::UnsupportedOperator {
            operator: operator.as_char(),
            matcher: "string",
        })
    }
}

/// Applies the string operator to an equality-style scan. `!` succeeds when
/// the pattern does not match and then consumes the pattern length.
fn apply_operator<F>(
    operator: TestOperator,
    pattern_len: usize,
    available: usize,
    run: F,
) -> Option<usize>
where
    F: Fn(TestOperator) -> Option<usize>,
{
    if operator == TestOperator::NotEqual {
        match run(TestOperator::Equal) {
            Some(_) => None,
            None => Some(pattern_len.min(available)),
        }
    } else {
        run(operator)
    }
}

/// Bytes up to the first NUL or newline, used when the pattern is empty
/// (libmagic's `string x`).
fn any_string(window: ByteWindow<'_>) -> usize {
    let limited = window.truncate(MAX_ANY_STRING);
    memchr::memchr2(0, b'\n', limited.as_slice()).unwrap_or(limited.size())
}

/// Fixed string test (`string`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringMatcher {
    pattern: Vec<u8>,
    operator: TestOperator,
    flags: StringFlags,
}

impl StringMatcher {
    /// An empty pattern matches any string and captures it for rendering.
    pub fn new(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
            operator: TestOperator::Equal,
            flags: StringFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: StringFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_operator(mut self, operator: TestOperator) -> Result<Self> {
        self.operator = check_string_operator(operator)?;
        Ok(self)
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn operator(&self) -> TestOperator {
        self.operator
    }

    pub fn flags(&self) -> StringFlags {
        self.flags
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>) -> Option<MatchOutcome<'a>> {
        let consumed = self.match_len(window)?;
        let matched = window.truncate(consumed);
        Some(MatchOutcome::new(consumed, MatchValue::Bytes(matched)))
    }

    fn match_len(&self, window: ByteWindow<'_>) -> Option<usize> {
        if self.pattern.is_empty() {
            return Some(any_string(window));
        }
        apply_operator(self.operator, self.pattern.len(), window.size(), |op| {
            scan_bytes(&self.pattern, window, op, self.flags)
        })
    }

    pub(crate) fn starting_byte(&self) -> Option<u8> {
        if self.operator != TestOperator::Equal || !self.flags.is_empty() {
            return None;
        }
        self.pattern.first().copied()
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        writer.write_u8(self.flags.to_bits());
        self.operator.write(writer);
        writer.write_compact_bytes(&self.pattern);
    }

    pub(crate) fn read(reader: &mut MagicReader) -> Result<Self> {
        let flags = StringFlags::from_bits(reader.read_u8()?);
        let operator = check_string_operator(TestOperator::read(reader)?)?;
        let pattern = reader.read_compact_bytes()?;
        Ok(Self {
            pattern,
            operator,
            flags,
        })
    }
}

/// Pascal string (`pstring`): a 1-byte length followed by the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PStringMatcher {
    inner: StringMatcher,
}

impl PStringMatcher {
    pub fn new(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: StringMatcher::new(pattern),
        }
    }

    pub fn with_flags(mut self, flags: StringFlags) -> Self {
        self.inner = self.inner.with_flags(flags);
        self
    }

    pub fn with_operator(mut self, operator: TestOperator) -> Result<Self> {
        self.inner = self.inner.with_operator(operator)?;
        Ok(self)
    }

    pub fn pattern(&self) -> &[u8] {
        self.inner.pattern()
    }

    pub fn operator(&self) -> TestOperator {
        self.inner.operator()
    }

    pub fn flags(&self) -> StringFlags {
        self.inner.flags()
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>) -> Option<MatchOutcome<'a>> {
        let declared = window.get(0)? as usize;
        let content = window.slice_len(1, declared)?;
        if !self.inner.pattern.is_empty() {
            apply_operator(self.inner.operator, self.inner.pattern.len(), declared, |op| {
                scan_bytes(&self.inner.pattern, content, op, self.inner.flags)
            })?;
        }
        Some(MatchOutcome::new(1 + declared, MatchValue::Bytes(content)))
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        self.inner.write(writer);
    }

    pub(crate) fn read(reader: &mut MagicReader) -> Result<Self> {
        Ok(Self {
            inner: StringMatcher::read(reader)?,
        })
    }
}

/// UTF-16 string in big- or little-endian code units.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct String16Matcher {
    pattern: String,
    units: Vec<u16>,
    endian: EndianType,
    operator: TestOperator,
    flags: StringFlags,
}

impl String16Matcher {
    pub fn new(pattern: impl Into<String>, endian: EndianType) -> Self {
        let pattern = pattern.into();
        let units = pattern.encode_utf16().collect();
        Self {
            pattern,
            units,
            endian,
            operator: TestOperator::Equal,
            flags: StringFlags::default(),
        }
    }

    pub fn big_endian(pattern: impl Into<String>) -> Self {
        Self::new(pattern, EndianType::Big)
    }

    pub fn little_endian(pattern: impl Into<String>) -> Self {
        Self::new(pattern, EndianType::Little)
    }

    pub fn with_flags(mut self, flags: StringFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_operator(mut self, operator: TestOperator) -> Result<Self> {
        self.operator = check_string_operator(operator)?;
        Ok(self)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn operator(&self) -> TestOperator {
        self.operator
    }

    pub fn flags(&self) -> StringFlags {
        self.flags
    }

    pub fn endian(&self) -> EndianType {
        self.endian
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn unit_at(&self, window: ByteWindow<'_>, index: usize) -> Option<u32> {
        window
            .read_uint(index.checked_mul(2)?, 2, self.endian)
            .map(|unit| unit as u32)
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>, required: bool) -> Option<MatchOutcome<'a>> {
        let units = apply_operator(self.operator, self.units.len(), window.size() / 2, |op| {
            scan(
                self.units.len(),
                |i| self.units[i] as u32,
                |i| self.unit_at(window, i),
                op,
                self.flags,
            )
        })?;
        let value = if required {
            let decoded: Vec<u16> = (0..units)
                .filter_map(|i| self.unit_at(window, i).map(|u| u as u16))
                .collect();
            MatchValue::Text(String::from_utf16_lossy(&decoded).into())
        } else {
            MatchValue::None
        };
        Some(MatchOutcome::new(units * 2, value))
    }

    pub(crate) fn starting_byte(&self) -> Option<u8> {
        if self.operator != TestOperator::Equal || !self.flags.is_empty() {
            return None;
        }
        let first = *self.units.first()? as u64;
        Some(self.endian.first_stored_byte(first, 2))
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        writer.write_u8(self.flags.to_bits());
        self.operator.write(writer);
        writer.write_compact_string(&self.pattern);
    }

    pub(crate) fn read(reader: &mut MagicReader, endian: EndianType) -> Result<Self> {
        let flags = StringFlags::from_bits(reader.read_u8()?);
        let operator = check_string_operator(TestOperator::read(reader)?)?;
        let pattern = reader.read_compact_string()?;
        Ok(Self::new(pattern, endian)
            .with_flags(flags)
            .with_operator(operator)?)
    }
}
