// src/sheets/identifier.rs
//! Time-ordered row identifiers (UUID version 7).
//!
//! Layout: 48-bit unix millisecond timestamp, version nibble `7`, 12 random bits,
//! variant bits `10`, 62 random bits. The hyphenated lowercase form sorts
//! lexicographically in generation order across distinct milliseconds.

use chrono::{DateTime, Utc};
use uuid::{Builder, Uuid, Variant};

/// Length of the canonical `8-4-4-4-12` textual form.
const CANONICAL_LEN: usize = 36;
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub uuid: Uuid,
    pub timestamp: DateTime<Utc>,
    pub version: usize,
}

/// Generate a fresh identifier stamped with the current time.
pub fn generate() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    generate_at(millis)
}

/// Generate an identifier for an explicit unix millisecond timestamp.
pub fn generate_at(unix_millis: u64) -> String {
    let random_bytes: [u8; 10] = rand::random();
    Builder::from_unix_timestamp_millis(unix_millis, &random_bytes)
        .into_uuid()
        .hyphenated()
        .to_string()
}

pub fn is_valid(text: &str) -> bool {
    parse_canonical(text).is_some()
}

/// Recover the embedded timestamp. Returns `None` for anything that is not a
/// canonical version 7 identifier.
pub fn extract_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let uuid = parse_canonical(text)?;
    let bytes = uuid.as_bytes();
    let millis = bytes[..6]
        .iter()
        .fold(0i64, |acc, b| (acc << 8) | i64::from(*b));
    DateTime::from_timestamp_millis(millis)
}

pub fn parse(text: &str) -> Option<ParsedIdentifier> {
    let uuid = parse_canonical(text)?;
    let timestamp = extract_timestamp(text)?;
    Some(ParsedIdentifier {
        uuid,
        timestamp,
        version: uuid.get_version_num(),
    })
}

fn parse_canonical(text: &str) -> Option<Uuid> {
    if text.len() != CANONICAL_LEN {
        return None;
    }
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        let is_hyphen_slot = HYPHEN_POSITIONS.contains(&i);
        if is_hyphen_slot != (*b == b'-') {
            return None;
        }
        if !is_hyphen_slot && !b.is_ascii_hexdigit() {
            return None;
        }
    }

    let uuid = Uuid::try_parse(text).ok()?;
    if uuid.get_version_num() != 7 || uuid.get_variant() != Variant::RFC4122 {
        return None;
    }
    Some(uuid)
}
