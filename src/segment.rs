//! Separator-based segmentation of raw blobs into document stubs.
//!
//! Splitting is an exact literal match on the configured separator. A blob
//! without the separator is a single document. Whitespace around each split
//! point is trimmed, and spans that are empty after trimming are skipped, so
//! ordinals stay contiguous from 0. Segmentation is total: it cannot fail.

use sha2::{Digest, Sha256};

use crate::models::{DocumentId, DocumentStub};

/// Every span between separators, untrimmed. `N` separators yield `N + 1` spans.
pub fn candidate_spans<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return vec![text];
    }
    text.split(separator).collect()
}

/// Split `text` into ordered, trimmed, non-empty document stubs.
pub fn segment(text: &str, separator: &str) -> Vec<DocumentStub> {
    candidate_spans(text, separator)
        .into_iter()
        .map(str::trim)
        .filter(|span| !span.is_empty())
        .enumerate()
        .map(|(ordinal, span)| DocumentStub {
            ordinal,
            text: span.to_string(),
        })
        .collect()
}

/// Positional document ID: the first 16 hex chars of
/// `SHA-256(blob_path || 0x00 || ordinal_le)`.
///
/// Stable across rebuilds as long as the blob path and ordinal are unchanged.
pub fn document_id(blob_path: &str, ordinal: usize) -> DocumentId {
    let mut hasher = Sha256::new();
    hasher.update(blob_path.as_bytes());
    hasher.update([0u8]);
    hasher.update((ordinal as u64).to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// SHA-256 of `text` with all whitespace runs collapsed to a single space.
pub fn normalized_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(word.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
