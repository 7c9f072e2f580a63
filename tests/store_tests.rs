//! Ruleset file tests

use argos_magic::store::{STORE_MAGIC, decode_ruleset, encode_ruleset, load_file, save_file};
use argos_magic::{MagicEntries, MagicEntry, MagicError, MagicMatcher, StringMatcher};
use proptest::prelude::*;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[rstest]
fn test_builtin_rules_survive_save_and_load(temp_dir: TempDir) {
    let path = temp_dir.path().join("builtin.amgc");
    let original = MagicEntries::default_images().unwrap();
    original.save(&path).unwrap();

    let loaded = MagicEntries::load(&path).unwrap();
    assert_eq!(loaded.len(), original.len());
    for (a, b) in loaded.entries().zip(original.entries()) {
        assert_eq!(a, b);
    }

    let info = loaded.find_match(b"%PDF-2.0\n").unwrap();
    assert_eq!(info.message, "PDF document, version 2.0");
}

#[rstest]
fn test_named_rules_survive_save_and_load(temp_dir: TempDir) {
    let path = temp_dir.path().join("named.amgc");
    let tail = MagicEntry::new(MagicMatcher::Name("tail".into())).with_child(
        MagicEntry::new(MagicMatcher::String(StringMatcher::new("ok")))
            .with_message("tail ok")
            .unwrap(),
    );
    let root = MagicEntry::new(MagicMatcher::String(StringMatcher::new("<<")))
        .with_child(MagicEntry::new(MagicMatcher::Use("tail".into())).with_offset(2));
    MagicEntries::build(vec![root, tail]).unwrap().save(&path).unwrap();

    let loaded = MagicEntries::load(&path).unwrap();
    assert!(loaded.names().contains_key("tail"));
    assert_eq!(loaded.find_match(b"<<ok").unwrap().message, "tail ok");
}

#[rstest]
fn test_file_level_helpers(temp_dir: TempDir) {
    let path = temp_dir.path().join("plain.amgc");
    let entries = vec![MagicEntry::new(MagicMatcher::String(StringMatcher::new("xyz")))];
    save_file(&path, &entries).unwrap();
    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..4], STORE_MAGIC);
    assert_eq!(load_file(&path).unwrap(), entries);
}

#[rstest]
fn test_missing_file_is_io_error(temp_dir: TempDir) {
    let path = temp_dir.path().join("absent.amgc");
    assert!(matches!(MagicEntries::load(&path), Err(MagicError::Io(_))));
}

#[rstest]
fn test_dangling_use_fails_on_load(temp_dir: TempDir) {
    let path = temp_dir.path().join("dangling.amgc");
    let root = MagicEntry::new(MagicMatcher::String(StringMatcher::new("A")))
        .with_child(MagicEntry::new(MagicMatcher::Use("gone".into())));
    save_file(&path, &[root]).unwrap();
    assert!(matches!(
        MagicEntries::load(&path),
        Err(MagicError::UnknownName(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn corrupted_rulesets_are_rejected_without_panicking(
        index in 0usize..4096,
        flip in 1u8..=255,
    ) {
        let entries = MagicEntries::default_images().unwrap();
        let entries: Vec<MagicEntry> = entries.entries().cloned().collect();
        let mut encoded = encode_ruleset(&entries);
        let index = index % encoded.len();
        encoded[index] ^= flip;
        prop_assert!(decode_ruleset(encoded).is_err());
    }
}
