#![no_main]

use argos_magic::store::decode_ruleset;
use argos_magic::{MagicEntries, MagicEntry};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_ruleset(data.to_vec());

    // the body decoder alone, since random headers rarely pass the checksum
    if let Ok(entries) = MagicEntry::read_all(Bytes::copy_from_slice(data)) {
        if let Ok(db) = MagicEntries::build(entries) {
            let _ = db.find_match(data);
        }
    }
});
