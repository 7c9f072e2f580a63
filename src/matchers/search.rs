//! Bounded look-ahead matchers: `search` and `regex`.

use super::numeric::TestOperator;
use super::string::{scan_bytes, StringFlags};
use super::MatchOutcome;
use crate::codec::{is_set, set_at, MagicReader, MagicWriter};
use crate::error::{MagicError, Result};
use crate::formatter::MatchValue;
use crate::window::ByteWindow;
use memchr::memmem;
use regex::bytes::{Regex, RegexBuilder};
use std::fmt;

/// Default look-ahead for `search` and `regex` when no range is given.
pub const DEFAULT_MAX_OFFSET: usize = 8 * 1024;

const SEARCH_FLAG_UPDATE_OFFSET_START: u8 = 4;

const REGEX_FLAG_CASE_INSENSITIVE: u8 = 0;
const REGEX_FLAG_UPDATE_OFFSET_START: u8 = 1;

fn read_max_offset(reader: &mut MagicReader) -> Result<usize> {
    let value = reader.read_compact_int()?;
    usize::try_from(value).map_err(|_| MagicError::InvalidOperand(value.to_string()))
}

/// Reports consumption from the window origin to the start or the end of
/// the located match.
fn consumed(start: usize, len: usize, update_offset_start: bool) -> usize {
    if update_offset_start {
        start
    } else {
        start + len
    }
}

/// Finds the first position in `[0, max_offset)` where the pattern matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchMatcher {
    pattern: Vec<u8>,
    flags: StringFlags,
    max_offset: usize,
    update_offset_start: bool,
}

impl SearchMatcher {
    pub fn new(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: StringFlags::default(),
            max_offset: DEFAULT_MAX_OFFSET,
            update_offset_start: false,
        }
    }

    pub fn with_flags(mut self, flags: StringFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_max_offset(mut self, max_offset: usize) -> Self {
        self.max_offset = max_offset;
        self
    }

    pub fn update_offset_start(mut self) -> Self {
        self.update_offset_start = true;
        self
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    fn locate(&self, window: ByteWindow<'_>) -> Option<(usize, usize)> {
        if self.pattern.is_empty() {
            return Some((0, 0));
        }
        if self.flags.is_empty() {
            let span = self
                .max_offset
                .saturating_add(self.pattern.len())
                .saturating_sub(1);
            let haystack = window.truncate(span);
            let start = memmem::find(haystack.as_slice(), &self.pattern)?;
            return Some((start, self.pattern.len()));
        }
        let limit = window.size().min(self.max_offset);
        (0..limit).find_map(|start| {
            let candidate = window.slice(start)?;
            scan_bytes(&self.pattern, candidate, TestOperator::Equal, self.flags)
                .map(|len| (start, len))
        })
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>) -> Option<MatchOutcome<'a>> {
        let (start, len) = self.locate(window)?;
        let matched = window.slice_len(start, len)?;
        Some(MatchOutcome::new(
            consumed(start, len, self.update_offset_start),
            MatchValue::Bytes(matched),
        ))
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        let flags = set_at(
            self.flags.to_bits(),
            SEARCH_FLAG_UPDATE_OFFSET_START,
            self.update_offset_start,
        );
        writer.write_u8(flags);
        writer.write_compact_bytes(&self.pattern);
        writer.write_compact_len(self.max_offset);
    }

    pub(crate) fn read(reader: &mut MagicReader) -> Result<Self> {
        let flags = reader.read_u8()?;
        let pattern = reader.read_compact_bytes()?;
        let max_offset = read_max_offset(reader)?;
        Ok(Self {
            pattern,
            flags: StringFlags::from_bits(flags),
            max_offset,
            update_offset_start: is_set(flags, SEARCH_FLAG_UPDATE_OFFSET_START),
        })
    }
}

/// Line-oriented regular expression over the first `max_offset` bytes.
#[derive(Clone)]
pub struct RegexMatcher {
    pattern: String,
    case_insensitive: bool,
    update_offset_start: bool,
    max_offset: usize,
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        Self::build(pattern.into(), false, false, DEFAULT_MAX_OFFSET)
    }

    fn build(
        pattern: String,
        case_insensitive: bool,
        update_offset_start: bool,
        max_offset: usize,
    ) -> Result<Self> {
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| MagicError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            pattern,
            case_insensitive,
            update_offset_start,
            max_offset,
            regex,
        })
    }

    pub fn case_insensitive(self) -> Result<Self> {
        Self::build(self.pattern, true, self.update_offset_start, self.max_offset)
    }

    pub fn update_offset_start(mut self) -> Self {
        self.update_offset_start = true;
        self
    }

    pub fn with_max_offset(mut self, max_offset: usize) -> Self {
        self.max_offset = max_offset;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of literal (non-meta) characters, used for strength.
    pub fn literal_len(&self) -> usize {
        let mut len = 0;
        let mut escaped = false;
        for c in self.pattern.chars() {
            if escaped {
                escaped = false;
                len += 1;
            } else if c == '\\' {
                escaped = true;
            } else if !"[](){}.*+?^$|".contains(c) {
                len += 1;
            }
        }
        len
    }

    pub(crate) fn is_match<'a>(&self, window: ByteWindow<'a>) -> Option<MatchOutcome<'a>> {
        let region = window.truncate(self.max_offset);
        let mut line_start = 0;
        for line in region.as_slice().split(|&b| b == b'\n') {
            if let Some(found) = self.regex.find(line) {
                let start = line_start + found.start();
                let len = found.len();
                let matched = window.slice_len(start, len)?;
                return Some(MatchOutcome::new(
                    consumed(start, len, self.update_offset_start),
                    MatchValue::Bytes(matched),
                ));
            }
            line_start += line.len() + 1;
        }
        None
    }

    pub(crate) fn write(&self, writer: &mut MagicWriter) {
        let mut flags = set_at(0, REGEX_FLAG_CASE_INSENSITIVE, self.case_insensitive);
        flags = set_at(flags, REGEX_FLAG_UPDATE_OFFSET_START, self.update_offset_start);
        writer.write_u8(flags);
        writer.write_compact_string(&self.pattern);
        writer.write_compact_len(self.max_offset);
    }

    pub(crate) fn read(reader: &mut MagicReader) -> Result<Self> {
        let flags = reader.read_u8()?;
        let pattern = reader.read_compact_string()?;
        let max_offset = read_max_offset(reader)?;
        Self::build(
            pattern,
            is_set(flags, REGEX_FLAG_CASE_INSENSITIVE),
            is_set(flags, REGEX_FLAG_UPDATE_OFFSET_START),
            max_offset,
        )
    }
}

impl PartialEq for RegexMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.case_insensitive == other.case_insensitive
            && self.update_offset_start == other.update_offset_start
            && self.max_offset == other.max_offset
    }
}

impl Eq for RegexMatcher {}

impl fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexMatcher")
            .field("pattern", &self.pattern)
            .field("case_insensitive", &self.case_insensitive)
            .field("update_offset_start", &self.update_offset_start)
            .field("max_offset", &self.max_offset)
            .finish()
    }
}
