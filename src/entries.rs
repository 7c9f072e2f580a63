//! Compiled rule database
//!
//! Buckets top-level entries by the first byte they can match so a probe
//! only evaluates plausible candidates, then follows indirections with a
//! loop instead of recursion.

use crate::builtin;
use crate::entry::{ContentData, MagicEntry, MatchScope, NameTable};
use crate::error::{MagicError, Result};
use crate::matchers::MagicMatcher;
use crate::store;
use crate::window::ByteWindow;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

const BUCKET_COUNT: usize = 256;

/// Deepest child nesting accepted when a database is built.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Default cap on indirection hops per probe.
pub const DEFAULT_MAX_INDIRECTIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    pub max_indirections: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_indirections: DEFAULT_MAX_INDIRECTIONS,
        }
    }
}

/// Description of identified content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub message: String,
    /// No leaf rule completed; the result is a best-effort guess.
    pub partial: bool,
}

impl ContentInfo {
    /// Result for zero-length input.
    pub fn empty() -> Self {
        Self {
            name: Some("empty".to_string()),
            mime_type: Some("application/x-empty".to_string()),
            message: "empty".to_string(),
            partial: false,
        }
    }
}

impl From<ContentData> for ContentInfo {
    fn from(data: ContentData) -> Self {
        Self {
            name: data.name,
            mime_type: data.mime_type,
            message: data.message.trim().to_string(),
            partial: data.partial,
        }
    }
}

/// An immutable rule database ready for probing.
///
/// # Example
///
/// ```
/// use argos_magic::{MagicEntries, MagicEntry, MagicMatcher, StringMatcher};
///
/// let pdf = MagicEntry::new(MagicMatcher::String(StringMatcher::new("%PDF-")))
///     .with_mime_type("application/pdf");
/// let entries = MagicEntries::build(vec![pdf]).unwrap();
///
/// let info = entries.find_match(b"%PDF-1.4\n").unwrap();
/// assert_eq!(info.mime_type.as_deref(), Some("application/pdf"));
/// assert!(entries.find_match(b"not a pdf").is_none());
/// ```
#[derive(Debug)]
pub struct MagicEntries {
    entries: Vec<Arc<MagicEntry>>,
    buckets: Vec<Vec<Arc<MagicEntry>>>,
    names: NameTable,
    config: MatchConfig,
}

impl MagicEntries {
    /// Builds a database with an explicit name table. Every `use` reference
    /// in `entries` and in the named subtrees must resolve, and no tree may
    /// nest deeper than [`MAX_NESTING_DEPTH`].
    pub fn new(entries: Vec<MagicEntry>, names: NameTable) -> Result<Self> {
        let entries: Vec<Arc<MagicEntry>> = entries.into_iter().map(Arc::new).collect();
        for entry in entries.iter().chain(names.values()) {
            validate(entry, &names, 0)?;
        }

        let mut buckets: Vec<Vec<Arc<MagicEntry>>> = vec![Vec::new(); BUCKET_COUNT];
        let mut indexed = 0;
        for entry in &entries {
            if matches!(entry.matcher(), MagicMatcher::Name(_)) {
                continue;
            }
            indexed += 1;
            match entry.starting_byte() {
                Some(byte) => buckets[byte as usize].push(Arc::clone(entry)),
                None => buckets.iter_mut().for_each(|b| b.push(Arc::clone(entry))),
            }
        }
        tracing::debug!(
            "Indexed {} entries ({} named rules)",
            indexed,
            names.len()
        );

        Ok(Self {
            entries,
            buckets,
            names,
            config: MatchConfig::default(),
        })
    }

    /// Builds a database, registering top-level `name` entries under their
    /// names.
    pub fn build(entries: Vec<MagicEntry>) -> Result<Self> {
        let mut names = NameTable::new();
        let mut rules = Vec::with_capacity(entries.len());
        for entry in entries {
            if let MagicMatcher::Name(name) = entry.matcher() {
                names.insert(name.clone(), Arc::new(entry));
            } else {
                rules.push(entry);
            }
        }
        Self::new(rules, names)
    }

    /// The built-in signature set.
    pub fn default_images() -> Result<Self> {
        Self::build(builtin::default_entries()?)
    }

    /// Loads a ruleset file written by [`MagicEntries::save`]. Building
    /// validates every subtree, so the whole file is decoded here rather
    /// than on first match.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(store::load_file(path)?)
    }

    /// Writes named rules (sorted by name) followed by the top-level rules.
    /// Only entries whose matcher is a `name` rule are found again as names
    /// when the file is loaded.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut named: Vec<_> = self.names.iter().collect();
        named.sort_by(|a, b| a.0.cmp(b.0));
        let all: Vec<MagicEntry> = named
            .into_iter()
            .map(|(_, entry)| entry.as_ref().clone())
            .chain(self.entries.iter().map(|entry| entry.as_ref().clone()))
            .collect();
        store::save_file(path, &all)
    }

    #[must_use]
    pub fn with_config(mut self, config: MatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> MatchConfig {
        self.config
    }

    pub fn entries(&self) -> impl Iterator<Item = &MagicEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidates for input starting with `byte`, in registration order.
    pub fn bucket(&self, byte: u8) -> &[Arc<MagicEntry>] {
        &self.buckets[byte as usize]
    }

    pub fn find_match(&self, bytes: &[u8]) -> Option<ContentInfo> {
        self.find_match_window(ByteWindow::new(bytes))
    }

    /// Identifies `bytes`: the first full match in its bucket, else the
    /// first partial one, else `None`.
    pub fn find_match_window(&self, bytes: ByteWindow<'_>) -> Option<ContentInfo> {
        if bytes.is_empty() {
            return Some(ContentInfo::empty());
        }

        let mut window = bytes;
        let mut carried: Option<ContentData> = None;
        let mut hops = 0;
        loop {
            let Some(content) = self.match_once(window, carried.as_ref()) else {
                return carried.map(ContentInfo::from);
            };
            let target = content.offset;
            if !content.indirect || target == 0 || hops >= self.config.max_indirections {
                return Some(content.into());
            }
            match window.slice(target).filter(|w| !w.is_empty()) {
                Some(next) => {
                    tracing::trace!("Following indirection to {} (hop {})", target, hops + 1);
                    hops += 1;
                    window = next;
                    carried = Some(ContentData {
                        indirect: false,
                        ..content
                    });
                }
                None => return Some(content.into()),
            }
        }
    }

    fn match_once(&self, window: ByteWindow<'_>, indirect: Option<&ContentData>) -> Option<ContentData> {
        let scope = MatchScope::new(&self.names)
            .with_indirect(indirect)
            .with_root_base(window.base_offset());
        let mut first_partial = None;
        for entry in self.bucket(window[0]) {
            let mut content = None;
            if !entry.match_bytes(window, scope, &mut content, 0, 0) {
                continue;
            }
            match content {
                Some(data) if !data.partial => return Some(data),
                Some(data) if first_partial.is_none() => first_partial = Some(data),
                _ => {}
            }
        }
        first_partial
    }
}

/// Checks `use` references and nesting depth below `entry`. Every lazily
/// stored child list is decoded on the way.
fn validate(entry: &MagicEntry, names: &NameTable, depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(MagicError::TooDeep(MAX_NESTING_DEPTH));
    }
    if let MagicMatcher::Use(name) = entry.matcher() {
        if !names.contains_key(name) {
            return Err(MagicError::UnknownName(name.clone()));
        }
    }
    for child in entry.try_children()? {
        validate(child, names, depth + 1)?;
    }
    Ok(())
}
