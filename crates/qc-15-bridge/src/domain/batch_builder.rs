//! Batch construction.
//!
//! Turns a contiguous run of pending messages into a canonical
//! [`PendingBridgeBatch`], and computes execution deadlines.

use std::sync::Arc;

use super::entities::{BridgeBatch, BridgeMessageEvent, PendingBridgeBatch};
use super::value_objects::{keccak256_concat, Hash};

/// Default cap on messages per batch.
pub const DEFAULT_MAX_EVENTS_PER_BATCH: u64 = 10;

/// Default round-up step for thresholds.
pub const DEFAULT_THRESHOLD_GRANULARITY: u64 = 10;

/// Computes the destination-side deadline for a new batch.
pub trait ThresholdPolicy: Send + Sync {
    /// Deadline for a batch built while the destination chain is at `block_number`.
    fn threshold(&self, block_number: u64) -> u64;
}

/// Round the height up to a multiple of `granularity`, then add `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundUpThreshold {
    /// Round-up step.
    pub granularity: u64,
    /// Blocks added after rounding.
    pub offset: u64,
}

impl RoundUpThreshold {
    /// Policy with the default step of ten blocks.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            granularity: DEFAULT_THRESHOLD_GRANULARITY,
            offset,
        }
    }
}

impl ThresholdPolicy for RoundUpThreshold {
    fn threshold(&self, block_number: u64) -> u64 {
        let step = self.granularity.max(1);
        block_number
            .div_ceil(step)
            .saturating_mul(step)
            .saturating_add(self.offset)
    }
}

/// Content hash of an ordered message run.
pub fn root_hash(events: &[BridgeMessageEvent]) -> Hash {
    let leaves: Vec<Hash> = events.iter().map(BridgeMessageEvent::leaf_hash).collect();
    let parts: Vec<&[u8]> = leaves.iter().map(|leaf| leaf.as_slice()).collect();
    keccak256_concat(&parts)
}

/// Builds pending batches from message runs.
#[derive(Clone)]
pub struct BatchBuilder {
    max_events: u64,
    threshold_policy: Arc<dyn ThresholdPolicy>,
}

impl BatchBuilder {
    /// Builder with an explicit cap and deadline policy.
    pub fn new(max_events: u64, threshold_policy: Arc<dyn ThresholdPolicy>) -> Self {
        Self {
            max_events: max_events.max(1),
            threshold_policy,
        }
    }

    /// Maximum messages per batch.
    pub fn max_events(&self) -> u64 {
        self.max_events
    }

    /// Inclusive ID window to fetch for a batch starting at `from`.
    pub fn window(&self, from: u64) -> (u64, u64) {
        (from, from.saturating_add(self.max_events - 1))
    }

    /// Deadline for a batch built at destination height `block_number`.
    pub fn threshold(&self, block_number: u64) -> u64 {
        self.threshold_policy.threshold(block_number)
    }

    /// Build a batch over `events`.
    ///
    /// Returns `None` for an empty or non-contiguous run. At most
    /// `max_events` leading messages are taken.
    pub fn build(
        &self,
        events: &[BridgeMessageEvent],
        epoch: u64,
        destination_height: u64,
    ) -> Option<PendingBridgeBatch> {
        let take = usize::try_from(self.max_events).unwrap_or(usize::MAX);
        let events = &events[..events.len().min(take)];
        let first = events.first()?;
        let last = events.last()?;

        let contiguous = events
            .windows(2)
            .all(|pair| pair[1].id == pair[0].id + 1 && same_route(&pair[0], &pair[1]));
        if !contiguous {
            return None;
        }

        Some(PendingBridgeBatch {
            epoch,
            batch: BridgeBatch {
                root_hash: root_hash(events),
                start_id: first.id,
                end_id: last.id,
                source_chain_id: first.source_chain_id,
                destination_chain_id: first.destination_chain_id,
                threshold: self.threshold(destination_height),
                is_rollback: false,
            },
        })
    }
}

impl std::fmt::Debug for BatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBuilder")
            .field("max_events", &self.max_events)
            .finish_non_exhaustive()
    }
}

fn same_route(a: &BridgeMessageEvent, b: &BridgeMessageEvent) -> bool {
    a.source_chain_id == b.source_chain_id && a.destination_chain_id == b.destination_chain_id
}
