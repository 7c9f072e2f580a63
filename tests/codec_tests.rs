//! Rule codec tests
//!
//! Encoding of matchers, offsets and entry trees, plus decoding of
//! arbitrary input.

use argos_magic::codec::{MagicReader, MagicWriter};
use argos_magic::matchers::{TAG_STRING, TAG_USE};
use argos_magic::{
    Comparison, DateMatcher, EndianType, FloatComparison, FloatMatcher, MagicEntries,
    MagicEntry, MagicError, MagicFormatter, MagicMatcher, OffsetInfo, PStringMatcher,
    RegexMatcher, SearchMatcher, String16Matcher, StringFlags, StringMatcher, TestOperator,
};
use bytes::Bytes;
use proptest::prelude::*;
use rstest::*;

fn round_trip(matcher: MagicMatcher) -> MagicMatcher {
    let mut writer = MagicWriter::new();
    matcher.write(&mut writer);
    let mut reader = MagicReader::new(writer.into_bytes());
    let decoded = MagicMatcher::read(&mut reader).unwrap();
    assert!(reader.is_empty());
    decoded
}

// ============================================================================
// Matchers
// ============================================================================

#[rstest]
#[case(MagicMatcher::Byte(MagicMatcher::byte(EndianType::Big)))]
#[case(MagicMatcher::Short(
    MagicMatcher::short(EndianType::Little)
        .unsigned()
        .with_and_mask(0xFFF0)
        .with_comparison(Comparison::new(TestOperator::Equal, 0x1230))
))]
#[case(MagicMatcher::Int(
    MagicMatcher::int(EndianType::Middle).with_comparison(Comparison::new(TestOperator::LessThan, -7))
))]
#[case(MagicMatcher::Long(
    MagicMatcher::long(EndianType::Native).with_comparison(Comparison::new(TestOperator::AllClear, i64::MIN))
))]
#[case(MagicMatcher::Id3Length(MagicMatcher::int(EndianType::Big)))]
#[case(MagicMatcher::Float(
    FloatMatcher::float(EndianType::Little)
        .with_comparison(FloatComparison::new(TestOperator::GreaterThan, 1.5).unwrap())
))]
#[case(MagicMatcher::Double(FloatMatcher::double(EndianType::Big)))]
#[case(MagicMatcher::Date(DateMatcher::date(EndianType::Big).local()))]
#[case(MagicMatcher::LongDate(
    DateMatcher::long_date(EndianType::Little).with_comparison(Comparison::new(TestOperator::NotEqual, 0))
))]
#[case(MagicMatcher::String(
    StringMatcher::new("Hello  World")
        .with_flags(StringFlags::parse("Wc"))
        .with_operator(TestOperator::GreaterThan)
        .unwrap()
))]
#[case(MagicMatcher::PString(PStringMatcher::new(b"\x00binary\xFF".to_vec())))]
#[case(MagicMatcher::Search(
    SearchMatcher::new("needle")
        .with_flags(StringFlags::parse("C"))
        .with_max_offset(100)
        .update_offset_start()
))]
#[case(MagicMatcher::Regex(RegexMatcher::new("^#!/bin/[a-z]+sh").unwrap().with_max_offset(3)))]
#[case(MagicMatcher::BigEndianString16(String16Matcher::big_endian("héllo")))]
#[case(MagicMatcher::LittleEndianString16(
    String16Matcher::little_endian("x").with_operator(TestOperator::NotEqual).unwrap()
))]
#[case(MagicMatcher::Name("tail".into()))]
#[case(MagicMatcher::Use("tail".into()))]
#[case(MagicMatcher::Default)]
#[case(MagicMatcher::Indirect)]
#[case(MagicMatcher::Unknown)]
fn test_matcher_round_trip(#[case] matcher: MagicMatcher) {
    assert_eq!(round_trip(matcher.clone()), matcher);
}

#[test]
fn test_case_insensitive_regex_round_trip() {
    let matcher = MagicMatcher::Regex(
        RegexMatcher::new("begin")
            .unwrap()
            .case_insensitive()
            .unwrap()
            .update_offset_start(),
    );
    assert_eq!(round_trip(matcher.clone()), matcher);
}

#[rstest]
#[case(TAG_STRING, "string")]
#[case(TAG_USE, "use")]
fn test_tag_prefixes_payload(#[case] tag: u8, #[case] type_name: &str) {
    let matcher = match tag {
        TAG_STRING => MagicMatcher::String(StringMatcher::new("x")),
        _ => MagicMatcher::Use("x".into()),
    };
    let mut writer = MagicWriter::new();
    matcher.write(&mut writer);
    assert_eq!(writer.into_bytes()[0], tag);
    assert_eq!(matcher.type_name(), type_name);
}

#[rstest]
#[case(vec![20])]
#[case(vec![200, 1, 2])]
fn test_unknown_tag_is_rejected(#[case] data: Vec<u8>) {
    let mut reader = MagicReader::new(Bytes::from(data));
    assert!(matches!(
        MagicMatcher::read(&mut reader),
        Err(MagicError::UnknownMatcherTag(_))
    ));
}

// ============================================================================
// Entry Trees
// ============================================================================

#[fixture]
fn sample_tree() -> Vec<MagicEntry> {
    let indirect = OffsetInfo::new(6, 4, EndianType::Big)
        .unwrap()
        .id3()
        .with_add(10);
    vec![
        MagicEntry::new(MagicMatcher::Name("trailer".into()))
            .with_child(MagicEntry::new(MagicMatcher::String(StringMatcher::new("END")))),
        MagicEntry::new(MagicMatcher::String(StringMatcher::new("HEAD")))
            .with_name("head")
            .with_mime_type("x/head")
            .with_message("head %s, 100%%")
            .unwrap()
            .with_children(vec![
                MagicEntry::new(MagicMatcher::Byte(MagicMatcher::byte(EndianType::Big)))
                    .with_offset(-4)
                    .relative()
                    .optional()
                    .no_space_prefix(),
                MagicEntry::new(MagicMatcher::Indirect)
                    .with_offset_info(indirect)
                    .clear_format(),
                MagicEntry::new(MagicMatcher::Use("trailer".into()))
                    .with_offset(100)
                    .with_formatter(MagicFormatter::parse("%-8.3s|").unwrap()),
            ]),
    ]
}

#[rstest]
fn test_entry_tree_round_trip(sample_tree: Vec<MagicEntry>) {
    let encoded = MagicEntry::write_all(&sample_tree);
    let decoded = MagicEntry::read_all(encoded.clone()).unwrap();
    assert_eq!(decoded, sample_tree);
    // re-encoding is stable
    assert_eq!(MagicEntry::write_all(&decoded), encoded);
}

#[rstest]
fn test_decoded_tree_builds(sample_tree: Vec<MagicEntry>) {
    let decoded = MagicEntry::read_all(MagicEntry::write_all(&sample_tree)).unwrap();
    let entries = MagicEntries::build(decoded).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries.names().contains_key("trailer"));
}

#[test]
fn test_offset_info_round_trip() {
    let info = OffsetInfo::new(-3, 2, EndianType::Little)
        .unwrap()
        .relative()
        .with_add(-1);
    let mut writer = MagicWriter::new();
    info.write(&mut writer);
    let mut reader = MagicReader::new(writer.into_bytes());
    assert_eq!(OffsetInfo::read(&mut reader).unwrap(), info);
}

#[rstest]
#[case(0)]
#[case(3)]
#[case(8)]
fn test_offset_info_rejects_bad_size(#[case] size: u8) {
    assert!(OffsetInfo::new(0, size, EndianType::Big).is_err());
}

#[rstest]
fn test_truncated_tree_fails(sample_tree: Vec<MagicEntry>) {
    let encoded = MagicEntry::write_all(&sample_tree);
    for len in [1, 2, encoded.len() - 1] {
        assert!(MagicEntry::read_all(encoded.slice(..len)).is_err());
    }
}

// ============================================================================
// Compact Integers
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn compact_integers_round_trip(a in any::<i16>(), b in any::<i32>(), c in any::<i64>(), len in 0usize..1 << 20) {
        let mut writer = MagicWriter::new();
        writer.write_compact_short(a);
        writer.write_compact_int(b);
        writer.write_compact_long(c);
        writer.write_compact_len(len);
        let mut reader = MagicReader::new(writer.into_bytes());
        prop_assert_eq!(reader.read_compact_short().unwrap(), a);
        prop_assert_eq!(reader.read_compact_int().unwrap(), b);
        prop_assert_eq!(reader.read_compact_long().unwrap(), c);
        prop_assert_eq!(reader.read_compact_len().unwrap(), len);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn string_entries_round_trip(
        pattern in prop::collection::vec(any::<u8>(), 0..64),
        offset in any::<i32>(),
        mime in "[a-z]{1,8}/[a-z0-9.+-]{1,16}",
    ) {
        let entry = MagicEntry::new(MagicMatcher::String(StringMatcher::new(pattern)))
            .with_offset(offset)
            .with_mime_type(mime);
        let decoded = MagicEntry::read_all(MagicEntry::write_all(std::slice::from_ref(&entry))).unwrap();
        prop_assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn arbitrary_bytes_never_panic_the_decoder(input in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(entries) = MagicEntry::read_all(Bytes::from(input)) {
            // child lists decode on first use
            for entry in &entries {
                let _ = entry.try_children();
            }
        }
    }
}
