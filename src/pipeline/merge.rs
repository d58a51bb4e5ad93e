//! Merge per-chunk records into one document-level record.
//!
//! Chunks are folded strictly in chunk order. For a key seen before:
//!
//! | Accumulator | Incoming | Result |
//! |---|---|---|
//! | Group | Group | shallow merge, incoming wins on child collision |
//! | Sequence | Sequence | concatenation |
//! | anything else | | accumulator becomes a Sequence, incoming appended |
//!
//! After the fold, top-level single-element sequences collapse back to their
//! only element.

use crate::record::{ExtractedRecord, FieldValue};
use tracing::debug;

/// Merge chunk records in the given order.
pub fn merge_records<I>(chunks: I) -> ExtractedRecord
where
    I: IntoIterator<Item = ExtractedRecord>,
{
    let mut merged = ExtractedRecord::new();
    for (idx, chunk) in chunks.into_iter().enumerate() {
        debug!("Merging chunk {} ({} fields)", idx + 1, chunk.len());
        merge_chunk(&mut merged, chunk);
    }
    collapse_singletons(&mut merged);
    merged
}

/// Fold one chunk's record into the accumulator.
pub fn merge_chunk(acc: &mut ExtractedRecord, chunk: ExtractedRecord) {
    for (key, incoming) in chunk {
        match acc.get_mut(&key) {
            Some(existing) => absorb(existing, incoming),
            None => {
                acc.insert(key, incoming);
            }
        }
    }
}

fn absorb(existing: &mut FieldValue, incoming: FieldValue) {
    match (existing, incoming) {
        (FieldValue::Group(ours), FieldValue::Group(theirs)) => ours.extend(theirs),
        (FieldValue::Sequence(ours), FieldValue::Sequence(theirs)) => ours.extend(theirs),
        (FieldValue::Sequence(ours), other) => ours.push(other),
        (slot, other) => {
            let first = std::mem::replace(slot, FieldValue::Sequence(Vec::with_capacity(2)));
            if let FieldValue::Sequence(items) = slot {
                items.push(first);
                items.push(other);
            }
        }
    }
}

/// Replace every top-level `[x]` with `x`.
pub fn collapse_singletons(record: &mut ExtractedRecord) {
    for value in record.values_mut() {
        let only = match value {
            FieldValue::Sequence(items) if items.len() == 1 => items.pop(),
            _ => None,
        };
        if let Some(only) = only {
            *value = only;
        }
    }
}
