//! # Domain Invariants
//!
//! Ordering and admission rules for batches and votes.

use super::entities::{BridgeBatch, PendingBridgeBatch};

/// A batch covers a non-empty inclusive range.
pub fn invariant_valid_range(batch: &BridgeBatch) -> bool {
    batch.end_id >= batch.start_id
}

/// `next` may follow `tail` in one direction's pending list.
///
/// Batches all start at the committed cursor, so each new one must reach
/// further than the last.
pub fn invariant_ordered_append(tail: Option<&PendingBridgeBatch>, next: &PendingBridgeBatch) -> bool {
    if !invariant_valid_range(&next.batch) {
        return false;
    }
    tail.is_none_or(|tail| next.batch.end_id > tail.batch.end_id)
}

/// Votes are accepted for the current epoch and the one after it.
pub fn invariant_vote_epoch_window(current_epoch: u64, vote_epoch: u64) -> bool {
    vote_epoch >= current_epoch && vote_epoch <= current_epoch.saturating_add(1)
}

/// An unexecuted batch becomes eligible for rollback once the
/// destination chain reaches its threshold.
pub fn invariant_rollback_due(threshold: u64, destination_height: u64) -> bool {
    destination_height >= threshold
}
