//! Rule specificity scores, after libmagic's `apprentice_magic_strength`.
//!
//! Scores only order rules while a database is assembled. Probing never
//! looks at them.

use crate::entry::MagicEntry;
use crate::matchers::{MagicMatcher, TestOperator};

const MULT: usize = 10;

fn scaled_by_length(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    len * (MULT / len).max(1)
}

fn matcher_strength(matcher: &MagicMatcher) -> usize {
    match matcher {
        MagicMatcher::Byte(m)
        | MagicMatcher::Short(m)
        | MagicMatcher::Int(m)
        | MagicMatcher::Long(m)
        | MagicMatcher::Id3Length(m) => m.width() * MULT,
        MagicMatcher::Date(m) | MagicMatcher::LongDate(m) => m.integer().width() * MULT,
        MagicMatcher::Float(m) | MagicMatcher::Double(m) => m.width() * MULT,
        MagicMatcher::String(m) => m.pattern().len() * MULT,
        MagicMatcher::PString(m) => m.pattern().len() * MULT,
        MagicMatcher::BigEndianString16(m) | MagicMatcher::LittleEndianString16(m) => {
            m.unit_count() * MULT / 2
        }
        MagicMatcher::Search(m) => scaled_by_length(m.pattern().len()),
        MagicMatcher::Regex(m) => scaled_by_length(m.literal_len()),
        MagicMatcher::Default
        | MagicMatcher::Indirect
        | MagicMatcher::Name(_)
        | MagicMatcher::Use(_)
        | MagicMatcher::Unknown => 0,
    }
}

/// The operator the matcher tests with; `None` for "any value".
fn operator(matcher: &MagicMatcher) -> Option<TestOperator> {
    match matcher {
        MagicMatcher::Byte(m)
        | MagicMatcher::Short(m)
        | MagicMatcher::Int(m)
        | MagicMatcher::Long(m)
        | MagicMatcher::Id3Length(m) => m.comparison().map(|c| c.operator),
        MagicMatcher::Date(m) | MagicMatcher::LongDate(m) => {
            m.integer().comparison().map(|c| c.operator)
        }
        MagicMatcher::Float(m) | MagicMatcher::Double(m) => m.comparison().map(|c| c.operator),
        MagicMatcher::String(m) if m.pattern().is_empty() => None,
        MagicMatcher::String(m) => Some(m.operator()),
        MagicMatcher::PString(m) if m.pattern().is_empty() => None,
        MagicMatcher::PString(m) => Some(m.operator()),
        MagicMatcher::BigEndianString16(m) | MagicMatcher::LittleEndianString16(m) => {
            Some(m.operator())
        }
        _ => Some(TestOperator::Equal),
    }
}

/// Specificity of `entry`. Higher means the rule is more selective.
pub fn strength(entry: &MagicEntry) -> usize {
    let matcher = entry.matcher();
    if matches!(matcher, MagicMatcher::Default) {
        return 0;
    }

    let mut value = (2 * MULT + matcher_strength(matcher)) as i64;
    value = match operator(matcher) {
        None | Some(TestOperator::NotEqual) => 0,
        Some(TestOperator::Equal) => value + MULT as i64,
        Some(TestOperator::LessThan | TestOperator::GreaterThan) => value - 2 * MULT as i64,
        Some(TestOperator::AllSet | TestOperator::AllClear) => value - MULT as i64,
        Some(TestOperator::Negate) => value,
    };

    if value <= 0 {
        1
    } else {
        value as usize
    }
}

/// Stable sort, strongest first. Equal scores keep their relative order.
pub fn order_by_strength(entries: &mut [MagicEntry]) {
    entries.sort_by_cached_key(|entry| std::cmp::Reverse(strength(entry)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::{Comparison, SearchMatcher, StringMatcher};
    use crate::window::EndianType;

    fn int(width: usize, operator: TestOperator) -> MagicEntry {
        let matcher = crate::matchers::IntegerMatcher::new(width, EndianType::Big)
            .with_comparison(Comparison::new(operator, 1));
        MagicEntry::new(match width {
            1 => MagicMatcher::Byte(matcher),
            2 => MagicMatcher::Short(matcher),
            _ => MagicMatcher::Int(matcher),
        })
    }

    #[test]
    fn numeric_strength_scales_with_width() {
        assert_eq!(strength(&int(1, TestOperator::Equal)), 20 + 10 + 10);
        assert_eq!(strength(&int(4, TestOperator::Equal)), 20 + 40 + 10);
        assert_eq!(strength(&int(2, TestOperator::AllSet)), 20 + 20 - 10);
        assert_eq!(strength(&int(1, TestOperator::LessThan)), 10);
    }

    #[test]
    fn string_and_search_strength() {
        let pdf = MagicEntry::new(MagicMatcher::String(StringMatcher::new("%PDF-")));
        assert_eq!(strength(&pdf), 20 + 50 + 10);
        let search = MagicEntry::new(MagicMatcher::Search(SearchMatcher::new("ab")));
        assert_eq!(strength(&search), 20 + 10 + 10);
        let long = MagicEntry::new(MagicMatcher::Search(SearchMatcher::new("abcdefghijkl")));
        assert_eq!(strength(&long), 20 + 12 + 10);
    }

    #[test]
    fn default_and_any_value_are_weakest() {
        assert_eq!(strength(&MagicEntry::new(MagicMatcher::Default)), 0);
        let any = MagicEntry::new(MagicMatcher::Byte(crate::matchers::IntegerMatcher::new(
            1,
            EndianType::Big,
        )));
        assert_eq!(strength(&any), 1);
    }

    #[test]
    fn ordering_is_stable_and_descending() {
        let mut entries = vec![
            int(1, TestOperator::Equal).with_name("a"),
            int(4, TestOperator::Equal).with_name("b"),
            int(1, TestOperator::Equal).with_name("c"),
        ];
        order_by_strength(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name().unwrap()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }
}
