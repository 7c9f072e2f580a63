//! Property tests over arbitrary input

use argos_magic::builtin::PNG_SIGNATURE;
use argos_magic::store::decode_ruleset;
use argos_magic::MagicEntries;
use proptest::prelude::*;

fn builtin() -> MagicEntries {
    MagicEntries::default_images().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn find_match_never_panics(input in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = builtin().find_match(&input);
    }

    #[test]
    fn signature_prefix_keeps_identification(tail in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut input = b"GIF89a".to_vec();
        input.extend_from_slice(&tail);
        let info = builtin().find_match(&input);
        let mime = info.and_then(|i| i.mime_type);
        prop_assert_eq!(mime.as_deref(), Some("image/gif"));
    }

    #[test]
    fn decode_ruleset_never_panics(input in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = decode_ruleset(input);
    }

    #[test]
    fn png_with_any_header_never_panics(tail in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut input = PNG_SIGNATURE.to_vec();
        input.extend_from_slice(&tail);
        let info = builtin().find_match(&input);
        prop_assert!(info.is_some());
    }
}
