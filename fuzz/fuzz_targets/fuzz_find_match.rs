#![no_main]

use argos_magic::MagicEntries;
use libfuzzer_sys::fuzz_target;
use std::sync::LazyLock;

static ENTRIES: LazyLock<Option<MagicEntries>> =
    LazyLock::new(|| MagicEntries::default_images().ok());

fuzz_target!(|data: &[u8]| {
    if let Some(entries) = ENTRIES.as_ref() {
        let _ = entries.find_match(data);
    }
});
