//! Ruleset files: a short header, a CRC-32 of the body and the encoded
//! entry sequence.

use crate::entry::MagicEntry;
use crate::error::{MagicError, Result};
use bytes::Bytes;
use std::fs;
use std::path::Path;

pub const STORE_MAGIC: &[u8; 4] = b"AMGC";
pub const STORE_VERSION: u8 = 1;

const HEADER_LEN: usize = 4 + 1 + 4;

fn checksum(body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    hasher.finalize()
}

pub fn encode_ruleset(entries: &[MagicEntry]) -> Vec<u8> {
    let body = MagicEntry::write_all(entries);
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(STORE_MAGIC);
    out.push(STORE_VERSION);
    out.extend_from_slice(&checksum(&body).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decodes a ruleset. Child lists stay encoded until the database is built,
/// which decodes all of them while validating.
pub fn decode_ruleset(data: impl Into<Bytes>) -> Result<Vec<MagicEntry>> {
    let data: Bytes = data.into();
    if data.len() < HEADER_LEN {
        return Err(MagicError::InvalidHeader(format!(
            "{} bytes is shorter than the {} byte header",
            data.len(),
            HEADER_LEN
        )));
    }
    if &data[..4] != STORE_MAGIC {
        return Err(MagicError::InvalidHeader(format!(
            "bad magic {}",
            hex::encode(&data[..4])
        )));
    }
    if data[4] != STORE_VERSION {
        return Err(MagicError::InvalidHeader(format!(
            "unsupported version {}",
            data[4]
        )));
    }

    let expected = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
    let body = data.slice(HEADER_LEN..);
    let actual = checksum(&body);
    if expected != actual {
        return Err(MagicError::ChecksumMismatch { expected, actual });
    }

    MagicEntry::read_all(body)
}

pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<MagicEntry>> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    let entries = decode_ruleset(data)?;
    tracing::debug!("Loaded {} rules from {}", entries.len(), path.display());
    Ok(entries)
}

pub fn save_file(path: impl AsRef<Path>, entries: &[MagicEntry]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, encode_ruleset(entries))?;
    tracing::debug!("Wrote {} rules to {}", entries.len(), path.display());
    Ok(())
}
