//! Utility functions shared across the monitor core.
//!
//! `entry_fingerprint`/`calculate_update` are the default implementation of
//! the external `calculate_update` collaborator: a concrete,
//! overridable helper rather than a hard requirement, grounded in this
//! codebase's own BLAKE3 checksum helper.

use blake3::Hasher;

use crate::model::Entry;

/// BLAKE3 fingerprint of an entry, hex-encoded.
///
/// Prefers the entry's link (stable across re-fetches); falls back to
/// title+summary for feeds whose entries carry no permalink.
pub fn entry_fingerprint(entry: &Entry) -> String {
    let mut hasher = Hasher::new();
    match &entry.link {
        Some(link) if !link.is_empty() => hasher.update(link.as_bytes()),
        _ => {
            hasher.update(entry.title.as_deref().unwrap_or("").as_bytes());
            hasher.update(entry.summary.as_deref().unwrap_or("").as_bytes())
        }
    };
    hasher.finalize().to_hex().to_string()
}

/// Default `calculate_update`: diffs freshly-fetched `entries` (assumed
/// newest-first, as parsers conventionally order them) against the
/// previously stored fingerprints.
///
/// Returns `(new_hashes, updated_entries)`, both newest-first: `new_hashes`
/// is the full fingerprint list to retain (subject to the caller's
/// retention-length truncation), `updated_entries` is the
/// prefix of `entries` not already present in `prev_hashes`.
pub fn calculate_update<'a>(
    prev_hashes: Option<&[String]>,
    entries: &'a [Entry],
) -> (Vec<String>, Vec<&'a Entry>) {
    let prev_hashes = prev_hashes.unwrap_or(&[]);
    let mut new_hashes = Vec::with_capacity(entries.len());
    let mut updated = Vec::new();

    for entry in entries {
        let fp = entry_fingerprint(entry);
        if prev_hashes.contains(&fp) {
            break;
        }
        new_hashes.push(fp);
        updated.push(entry);
    }

    new_hashes.extend(prev_hashes.iter().cloned());
    (new_hashes, updated)
}

/// Retention cap for stored entry hashes: never fewer than
/// `floor`, never more than `2 * entry_count`.
pub fn hash_retention_cap(entry_count: usize, floor: usize) -> usize {
    (entry_count * 2).max(floor)
}
