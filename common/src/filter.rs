//! Removal of placeholder records from contract responses.
//!
//! `getMsgTimed()` returns one slot per stored message; slots that are still
//! locked come back zero-filled. Only records with a non-zero id are real.

use crate::message::StoredMessage;

/// Keep only unlocked records, in their original order.
pub fn filter(records: &[StoredMessage]) -> Vec<StoredMessage> {
    records
        .iter()
        .filter(|m| !m.is_placeholder())
        .cloned()
        .collect()
}

/// Owning variant of [`filter`] for results that are not needed afterwards.
pub fn into_unlocked(records: Vec<StoredMessage>) -> Vec<StoredMessage> {
    records.into_iter().filter(|m| !m.is_placeholder()).collect()
}
