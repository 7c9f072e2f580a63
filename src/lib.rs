pub mod builtin;
pub mod codec;
pub mod entries;
pub mod entry;
pub mod error;
pub mod formatter;
pub mod matchers;
pub mod offset;
pub mod store;
pub mod strength;
pub mod window;

pub use entries::{ContentInfo, MagicEntries, MatchConfig};
pub use entry::{ContentData, MagicEntry, NameTable};
pub use error::{MagicError, Result};
pub use formatter::{MagicFormatter, MatchValue};
pub use matchers::{
    Comparison, DateMatcher, FloatComparison, FloatMatcher, IntegerMatcher, MagicMatcher,
    PStringMatcher, RegexMatcher, SearchMatcher, String16Matcher, StringFlags, StringMatcher,
    TestOperator,
};
pub use offset::OffsetInfo;
pub use window::{ByteWindow, EndianType};
