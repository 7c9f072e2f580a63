//! Rule tree nodes and the recursive matching protocol.

use crate::codec::{is_set, set_at, MagicReader, MagicWriter};
use crate::error::Result;
use crate::formatter::MagicFormatter;
use crate::matchers::MagicMatcher;
use crate::offset::OffsetInfo;
use crate::window::ByteWindow;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

const FLAG_NAME: u8 = 0;
const FLAG_MIME_TYPE: u8 = 1;
const FLAG_OFFSET_INFO: u8 = 2;
const FLAG_ADD_OFFSET: u8 = 3;
const FLAG_SPACE_PREFIX: u8 = 4;
const FLAG_CLEAR_FORMAT: u8 = 5;
const FLAG_OPTIONAL: u8 = 6;
const FLAG_FORMATTER: u8 = 7;

/// Deepest chain of `use` delegations followed during one probe.
pub const MAX_USE_DEPTH: usize = 50;

/// Named subtrees reachable through `use`.
pub type NameTable = HashMap<String, Arc<MagicEntry>>;

/// Accumulator for one probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentData {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub mime_type_level: usize,
    /// True until a leaf (or an all-optional child list) is reached.
    pub partial: bool,
    /// Set by an `indirect` entry; `offset` is then the jump target.
    pub indirect: bool,
    pub offset: usize,
    pub message: String,
}

impl ContentData {
    fn seeded(indirect: Option<&ContentData>) -> Self {
        let mut data = ContentData {
            partial: true,
            ..ContentData::default()
        };
        if let Some(previous) = indirect {
            data.mime_type = previous.mime_type.clone();
            data.message = previous.message.clone();
        }
        data
    }
}

/// What a node sees besides the bytes: the name table and, after an
/// indirection, the result gathered before the jump.
#[derive(Clone, Copy)]
pub struct MatchScope<'s> {
    pub names: &'s NameTable,
    pub indirect: Option<&'s ContentData>,
    /// `base_offset` of the window the probe started on. Jump targets are
    /// reported relative to it.
    pub root_base: usize,
    /// Number of `use` delegations above the current node.
    pub use_depth: usize,
}

impl<'s> MatchScope<'s> {
    pub fn new(names: &'s NameTable) -> Self {
        Self {
            names,
            indirect: None,
            root_base: 0,
            use_depth: 0,
        }
    }

    pub fn with_indirect(mut self, indirect: Option<&'s ContentData>) -> Self {
        self.indirect = indirect;
        self
    }

    pub fn with_root_base(mut self, root_base: usize) -> Self {
        self.root_base = root_base;
        self
    }

    /// Offset of `offset` in `bytes`, measured from the probe's root window.
    fn root_offset(&self, bytes: ByteWindow<'_>, offset: usize) -> usize {
        (bytes.base_offset() + offset).saturating_sub(self.root_base)
    }
}

#[derive(Clone)]
enum Children {
    Parsed(Vec<MagicEntry>),
    /// Still-encoded child records; parsed on first access.
    Lazy {
        raw: Bytes,
        parsed: OnceLock<Vec<MagicEntry>>,
    },
}

impl Children {
    fn get(&self) -> &[MagicEntry] {
        match self {
            Children::Parsed(entries) => entries,
            Children::Lazy { raw, parsed } => parsed.get_or_init(|| {
                MagicEntry::read_all(raw.clone()).unwrap_or_else(|e| {
                    tracing::warn!("Dropping undecodable child list ({} bytes): {}", raw.len(), e);
                    Vec::new()
                })
            }),
        }
    }

    fn try_get(&self) -> Result<&[MagicEntry]> {
        match self {
            Children::Parsed(entries) => Ok(entries),
            Children::Lazy { raw, parsed } => {
                if let Some(entries) = parsed.get() {
                    return Ok(entries);
                }
                let entries = MagicEntry::read_all(raw.clone())?;
                Ok(parsed.get_or_init(|| entries))
            }
        }
    }
}

impl Default for Children {
    fn default() -> Self {
        Children::Parsed(Vec::new())
    }
}

/// One rule: a matcher at an offset, optional metadata and the children that
/// refine it.
#[derive(Clone)]
pub struct MagicEntry {
    name: Option<String>,
    mime_type: Option<String>,
    matcher: MagicMatcher,
    offset: i32,
    offset_info: Option<OffsetInfo>,
    add_offset: bool,
    format_space_prefix: bool,
    clear_format: bool,
    optional: bool,
    formatter: Option<MagicFormatter>,
    children: Children,
}

impl MagicEntry {
    pub fn new(matcher: MagicMatcher) -> Self {
        Self {
            name: None,
            mime_type: None,
            matcher,
            offset: 0,
            offset_info: None,
            add_offset: false,
            format_space_prefix: true,
            clear_format: false,
            optional: false,
            formatter: None,
            children: Children::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_offset_info(mut self, info: OffsetInfo) -> Self {
        self.offset_info = Some(info);
        self
    }

    /// Offset is taken relative to the end of the parent match (`&` prefix).
    #[must_use]
    pub fn relative(mut self) -> Self {
        self.add_offset = true;
        self
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: MagicFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Parses `format` as the message. A leading `\b` suppresses the space
    /// that normally separates this message from the previous one.
    pub fn with_message(mut self, format: &str) -> Result<Self> {
        let format = match format.strip_prefix("\\b") {
            Some(rest) => {
                self.format_space_prefix = false;
                rest
            }
            None => format,
        };
        self.formatter = Some(MagicFormatter::parse(format)?);
        Ok(self)
    }

    #[must_use]
    pub fn no_space_prefix(mut self) -> Self {
        self.format_space_prefix = false;
        self
    }

    #[must_use]
    pub fn clear_format(mut self) -> Self {
        self.clear_format = true;
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<MagicEntry>) -> Self {
        self.children = Children::Parsed(children);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: MagicEntry) -> Self {
        let mut children = self.children().to_vec();
        children.push(child);
        self.children = Children::Parsed(children);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn matcher(&self) -> &MagicMatcher {
        &self.matcher
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn offset_info(&self) -> Option<&OffsetInfo> {
        self.offset_info.as_ref()
    }

    pub fn is_relative(&self) -> bool {
        self.add_offset
    }

    pub fn formatter(&self) -> Option<&MagicFormatter> {
        self.formatter.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn has_space_prefix(&self) -> bool {
        self.format_space_prefix
    }

    pub fn clears_format(&self) -> bool {
        self.clear_format
    }

    /// Child entries, decoding them on first access.
    pub fn children(&self) -> &[MagicEntry] {
        self.children.get()
    }

    /// Like [`MagicEntry::children`] but surfaces decode errors.
    pub fn try_children(&self) -> Result<&[MagicEntry]> {
        self.children.try_get()
    }

    /// The single first byte a probe must start with for this entry to
    /// match, when it can be known without reading the input.
    pub fn starting_byte(&self) -> Option<u8> {
        if self.offset == 0 && self.offset_info.is_none() && !self.add_offset {
            self.matcher.starting_byte()
        } else {
            None
        }
    }

    pub fn can_start_with_byte(&self, byte: u8) -> bool {
        self.starting_byte().is_none_or(|b| b == byte)
    }

    fn effective_offset(&self, bytes: ByteWindow<'_>, prev_offset: usize) -> Option<usize> {
        let mut offset = match &self.offset_info {
            Some(info) => info.get_offset(bytes, prev_offset)?,
            None => self.offset as i64,
        };
        if self.add_offset {
            offset += prev_offset as i64;
        }
        let offset = usize::try_from(offset).ok()?;
        (offset <= bytes.size()).then_some(offset)
    }

    /// Tests this entry and its subtree against `bytes`.
    ///
    /// Returns false when this entry's own matcher fails. On success
    /// `content` holds the accumulated result, which is still partial if no
    /// leaf was reached.
    pub fn match_bytes(
        &self,
        bytes: ByteWindow<'_>,
        scope: MatchScope<'_>,
        content: &mut Option<ContentData>,
        prev_offset: usize,
        level: usize,
    ) -> bool {
        let Some(offset) = self.effective_offset(bytes, prev_offset) else {
            return false;
        };
        let Some(window) = bytes.slice(offset) else {
            return false;
        };
        let Some(outcome) = self.matcher.is_match(window, self.formatter.is_some()) else {
            return false;
        };
        tracing::trace!(
            "{} matched at {} (level {}, {} bytes)",
            self.matcher.type_name(),
            window.base_offset(),
            level,
            outcome.consumed
        );

        let data = content.get_or_insert_with(|| ContentData::seeded(scope.indirect));
        if self.clear_format {
            data.message.clear();
        }
        if let Some(formatter) = &self.formatter {
            if self.format_space_prefix && !data.message.is_empty() {
                data.message.push(' ');
            }
            formatter.format(&outcome.value, &mut data.message);
        }
        if data.name.is_none() {
            data.name.clone_from(&self.name);
        }
        if let Some(mime_type) = &self.mime_type {
            if data.mime_type.is_none() || level > data.mime_type_level {
                data.mime_type = Some(mime_type.clone());
                data.mime_type_level = level;
            }
        }

        match &self.matcher {
            MagicMatcher::Use(name) => {
                let Some(target) = scope.names.get(name) else {
                    tracing::warn!("Unresolved use of '{}'", name);
                    return false;
                };
                if scope.use_depth >= MAX_USE_DEPTH {
                    tracing::warn!("Use of '{}' nested deeper than {}", name, MAX_USE_DEPTH);
                    return false;
                }
                let nested = MatchScope {
                    use_depth: scope.use_depth + 1,
                    ..scope
                };
                return target.match_bytes(window, nested, content, 0, level);
            }
            MagicMatcher::Indirect => {
                data.indirect = true;
                data.offset = scope.root_offset(bytes, offset);
            }
            _ => {}
        }

        let children = self.children();
        if children.is_empty() {
            if !data.indirect {
                data.offset = scope.root_offset(bytes, offset);
            }
            data.partial = false;
            return true;
        }

        let child_offset = offset + outcome.consumed;
        let mut sibling_matched = false;
        for child in children {
            if sibling_matched && matches!(child.matcher, MagicMatcher::Default) {
                continue;
            }
            if child.match_bytes(bytes, scope, content, child_offset, level + 1) {
                sibling_matched = true;
            }
        }
        if children.iter().all(MagicEntry::is_optional) {
            if let Some(data) = content.as_mut() {
                data.partial = false;
            }
        }
        true
    }

    pub fn write(&self, writer: &mut MagicWriter) {
        let mut flags = set_at(0, FLAG_NAME, self.name.is_some());
        flags = set_at(flags, FLAG_MIME_TYPE, self.mime_type.is_some());
        flags = set_at(flags, FLAG_OFFSET_INFO, self.offset_info.is_some());
        flags = set_at(flags, FLAG_ADD_OFFSET, self.add_offset);
        flags = set_at(flags, FLAG_SPACE_PREFIX, self.format_space_prefix);
        flags = set_at(flags, FLAG_CLEAR_FORMAT, self.clear_format);
        flags = set_at(flags, FLAG_OPTIONAL, self.optional);
        flags = set_at(flags, FLAG_FORMATTER, self.formatter.is_some());
        writer.write_u8(flags);
        self.matcher.write(writer);
        writer.write_compact_int(self.offset);
        if let Some(name) = &self.name {
            writer.write_compact_string(name);
        }
        if let Some(mime_type) = &self.mime_type {
            writer.write_compact_string(mime_type);
        }
        if let Some(info) = &self.offset_info {
            info.write(writer);
        }
        if let Some(formatter) = &self.formatter {
            formatter.write(writer);
        }

        match &self.children {
            Children::Lazy { raw, parsed } if parsed.get().is_none() => {
                writer.write_compact_len(raw.len());
                writer.write_raw(raw);
            }
            _ => {
                let mut sub = MagicWriter::new();
                for child in self.children() {
                    child.write(&mut sub);
                }
                let sub = sub.into_bytes();
                writer.write_compact_len(sub.len());
                writer.write_raw(&sub);
            }
        }
    }

    /// Reads one entry. Children stay encoded until first accessed.
    pub fn read(reader: &mut MagicReader) -> Result<Self> {
        let flags = reader.read_u8()?;
        let matcher = MagicMatcher::read(reader)?;
        let offset = reader.read_compact_int()?;
        let name = if is_set(flags, FLAG_NAME) {
            Some(reader.read_compact_string()?)
        } else {
            None
        };
        let mime_type = if is_set(flags, FLAG_MIME_TYPE) {
            Some(reader.read_compact_string()?)
        } else {
            None
        };
        let offset_info = if is_set(flags, FLAG_OFFSET_INFO) {
            Some(OffsetInfo::read(reader)?)
        } else {
            None
        };
        let formatter = if is_set(flags, FLAG_FORMATTER) {
            Some(MagicFormatter::read(reader)?)
        } else {
            None
        };
        let children_len = reader.read_compact_len()?;
        let raw = reader.read_sub_stream(children_len)?;
        let children = if raw.is_empty() {
            Children::default()
        } else {
            Children::Lazy {
                raw,
                parsed: OnceLock::new(),
            }
        };
        Ok(Self {
            name,
            mime_type,
            matcher,
            offset,
            offset_info,
            add_offset: is_set(flags, FLAG_ADD_OFFSET),
            format_space_prefix: is_set(flags, FLAG_SPACE_PREFIX),
            clear_format: is_set(flags, FLAG_CLEAR_FORMAT),
            optional: is_set(flags, FLAG_OPTIONAL),
            formatter,
            children,
        })
    }

    /// Reads concatenated entries until the buffer is exhausted.
    pub fn read_all(bytes: Bytes) -> Result<Vec<MagicEntry>> {
        let mut reader = MagicReader::new(bytes);
        let mut entries = Vec::new();
        while !reader.is_empty() {
            entries.push(MagicEntry::read(&mut reader)?);
        }
        Ok(entries)
    }

    pub fn write_all(entries: &[MagicEntry]) -> Bytes {
        let mut writer = MagicWriter::new();
        for entry in entries {
            entry.write(&mut writer);
        }
        writer.into_bytes()
    }
}

impl PartialEq for MagicEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.mime_type == other.mime_type
            && self.matcher == other.matcher
            && self.offset == other.offset
            && self.offset_info == other.offset_info
            && self.add_offset == other.add_offset
            && self.format_space_prefix == other.format_space_prefix
            && self.clear_format == other.clear_format
            && self.optional == other.optional
            && self.formatter == other.formatter
            && self.children() == other.children()
    }
}

impl fmt::Debug for MagicEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MagicEntry");
        debug
            .field("matcher", &self.matcher)
            .field("offset", &self.offset);
        if let Some(name) = &self.name {
            debug.field("name", name);
        }
        if let Some(mime_type) = &self.mime_type {
            debug.field("mime_type", mime_type);
        }
        if let Some(info) = &self.offset_info {
            debug.field("offset_info", info);
        }
        if let Some(formatter) = &self.formatter {
            debug.field("formatter", &formatter.to_string());
        }
        debug
            .field("add_offset", &self.add_offset)
            .field("optional", &self.optional)
            .field("children", &self.children())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::{Comparison, StringMatcher, TestOperator};
    use crate::window::EndianType;

    fn string(pattern: &str) -> MagicEntry {
        MagicEntry::new(MagicMatcher::String(StringMatcher::new(pattern)))
    }

    fn probe(entry: &MagicEntry, data: &[u8]) -> Option<ContentData> {
        let names = NameTable::new();
        let mut content = None;
        entry
            .match_bytes(ByteWindow::new(data), MatchScope::new(&names), &mut content, 0, 0)
            .then_some(())?;
        content
    }

    #[test]
    fn leaf_match_is_full() {
        let entry = string("GIF8").with_mime_type("image/gif");
        let content = probe(&entry, b"GIF89a").unwrap();
        assert!(!content.partial);
        assert_eq!(content.mime_type.as_deref(), Some("image/gif"));
        assert!(probe(&entry, b"PNG").is_none());
    }

    #[test]
    fn failing_children_leave_partial_match() {
        let entry = string("RIFF").with_child(string("WEBP").with_offset(8));
        let content = probe(&entry, b"RIFF\0\0\0\0WAVE").unwrap();
        assert!(content.partial);
        let content = probe(&entry, b"RIFF\0\0\0\0WEBP").unwrap();
        assert!(!content.partial);
    }

    #[test]
    fn optional_children_still_complete_the_match() {
        let entry = string("RIFF").with_child(string("WEBP").with_offset(8).optional());
        assert!(!probe(&entry, b"RIFF\0\0\0\0WAVE").unwrap().partial);
    }

    #[test]
    fn relative_child_offset_follows_parent_match() {
        let child = MagicEntry::new(MagicMatcher::Byte(
            MagicMatcher::byte(EndianType::Big)
                .with_comparison(Comparison::new(TestOperator::Equal, 7)),
        ))
        .relative()
        .with_offset(1);
        let entry = string("AB").with_child(child);
        assert!(!probe(&entry, b"ABx\x07").unwrap().partial);
        assert!(probe(&entry, b"AB\x07x").unwrap().partial);
    }

    #[test]
    fn out_of_range_offset_is_no_match() {
        let entry = string("A").with_offset(100);
        assert!(probe(&entry, b"A").is_none());
        let entry = string("").with_offset(-1);
        assert!(probe(&entry, b"A").is_none());
    }

    #[test]
    fn messages_join_with_spaces_unless_suppressed() {
        let entry = string("PK")
            .with_message("Zip archive")
            .unwrap()
            .with_children(vec![
                string("\x03\x04")
                    .with_offset(2)
                    .with_message("data")
                    .unwrap(),
                string("\x03\x04")
                    .with_offset(2)
                    .with_message("\\b,v2")
                    .unwrap(),
            ]);
        let content = probe(&entry, b"PK\x03\x04").unwrap();
        assert_eq!(content.message, "Zip archive data,v2");
    }

    #[test]
    fn clear_format_discards_previous_text() {
        let entry = string("A")
            .with_message("first")
            .unwrap()
            .with_child(string("B").with_offset(1).clear_format().with_message("second").unwrap());
        assert_eq!(probe(&entry, b"AB").unwrap().message, "second");
    }

    #[test]
    fn default_child_only_when_no_sibling_matched() {
        let entry = string("V").with_children(vec![
            string("1").with_offset(1).with_message("one").unwrap(),
            MagicEntry::new(MagicMatcher::Default)
                .with_offset(1)
                .with_message("other")
                .unwrap(),
        ]);
        assert_eq!(probe(&entry, b"V1").unwrap().message, "one");
        assert_eq!(probe(&entry, b"V9").unwrap().message, "other");
    }

    #[test]
    fn starting_byte_requires_offset_zero() {
        assert_eq!(string("%PDF").starting_byte(), Some(b'%'));
        assert_eq!(string("%PDF").with_offset(1).starting_byte(), None);
        assert_eq!(string("%PDF").relative().starting_byte(), None);
        assert!(string("%PDF").can_start_with_byte(b'%'));
        assert!(!string("%PDF").can_start_with_byte(b'P'));
        assert!(string("%PDF").with_offset(4).can_start_with_byte(b'P'));
    }

    #[test]
    fn children_are_decoded_lazily() {
        let entry = string("A").with_child(string("B").with_offset(1).with_mime_type("x/b"));
        let encoded = MagicEntry::write_all(std::slice::from_ref(&entry));
        let decoded = MagicEntry::read_all(encoded.clone()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0].children, Children::Lazy { .. }));
        // re-encoding untouched lazy children reuses the raw bytes
        assert_eq!(MagicEntry::write_all(&decoded), encoded);
        assert_eq!(decoded[0], entry);
        assert_eq!(decoded[0].children()[0].mime_type(), Some("x/b"));
    }

    #[test]
    fn corrupt_children_fail_validation_but_not_matching() {
        let mut writer = MagicWriter::new();
        writer.write_u8(set_at(0, FLAG_SPACE_PREFIX, true));
        MagicMatcher::String(StringMatcher::new("A")).write(&mut writer);
        writer.write_compact_int(0);
        writer.write_compact_len(1);
        writer.write_u8(0xEE);
        let decoded = MagicEntry::read_all(writer.into_bytes()).unwrap();
        assert!(decoded[0].try_children().is_err());
        assert!(probe(&decoded[0], b"A").is_some());
    }
}
