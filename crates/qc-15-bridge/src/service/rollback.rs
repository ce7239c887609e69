//! Rollback of committed batches that missed their deadline.
//!
//! A committed batch stays in the unexecuted list until a batch-result
//! log confirms it. Once the destination chain passes the batch's
//! threshold, a flagged copy is signed under the current epoch and queued
//! for submission so the destination can void it.

use tracing::{debug, error, info};

use super::BridgeEventManager;
use crate::domain::{invariant_rollback_due, BridgeError, Direction, Hash, PendingBridgeBatch};
use crate::store::StoreTx;

impl BridgeEventManager {
    /// Roll back external→internal batches once the internal chain
    /// reaches their threshold.
    pub fn internal_chain_rollback_handler(
        &self,
        block_number: u64,
        tx: Option<&mut StoreTx>,
    ) -> Result<usize, BridgeError> {
        self.create_rollback_batches(Direction::ExternalToInternal, block_number, tx)
    }

    /// Roll back internal→external batches once the external chain
    /// reaches their threshold.
    ///
    /// External height failures are logged and retried on the next block.
    pub async fn external_chain_rollback_handler(
        &self,
        tx: Option<&mut StoreTx>,
    ) -> Result<usize, BridgeError> {
        let awaiting = self
            .state
            .read()
            .unexecuted
            .iter()
            .any(|b| self.is_direction(b, Direction::InternalToExternal));
        if !awaiting {
            return Ok(0);
        }

        let client = match self.external_client() {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "[qc-15] External rollback check skipped");
                return Ok(0);
            }
        };
        let height = match client.latest_block_number().await {
            Ok(height) => height,
            Err(e) => {
                error!(error = %e, "[qc-15] Failed to read external chain height");
                return Ok(0);
            }
        };
        self.create_rollback_batches(Direction::InternalToExternal, height, tx)
    }

    fn is_direction(&self, pending: &PendingBridgeBatch, direction: Direction) -> bool {
        self.chains.direction_of(
            pending.batch.source_chain_id,
            pending.batch.destination_chain_id,
        ) == Some(direction)
    }

    fn create_rollback_batches(
        &self,
        direction: Direction,
        destination_height: u64,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<usize, BridgeError> {
        if !self.deps.runtime.is_active_validator() {
            return Ok(0);
        }

        let (epoch, candidates) = {
            let state = self.state.read();
            if state.validator_set.is_none() {
                return Ok(0);
            }
            let candidates: Vec<(Hash, PendingBridgeBatch)> = state
                .unexecuted
                .iter()
                .filter(|b| self.is_direction(b, direction))
                .filter(|b| invariant_rollback_due(b.threshold(), destination_height))
                .map(|b| (b.hash(), b.clone().into_rollback(state.epoch)))
                .filter(|(_, rollback)| {
                    let hash = rollback.hash();
                    !state.rollback.iter().any(|r| r.hash() == hash)
                })
                .collect();
            (state.epoch, candidates)
        };

        let mut created = 0;
        for (original, rollback) in candidates {
            self.sign_and_publish(&rollback, tx.as_deref_mut())?;

            let mut state = self.state.write();
            if state.epoch != epoch {
                break;
            }
            let hash = rollback.hash();
            let still_unexecuted = state.unexecuted.iter().any(|b| b.hash() == original);
            let queued = state.rollback.iter().any(|r| r.hash() == hash);
            if !still_unexecuted || queued {
                continue;
            }
            info!(
                %direction,
                start = rollback.batch.start_id,
                end = rollback.batch.end_id,
                threshold = rollback.batch.threshold,
                destination_height,
                "[qc-15] Batch expired, rollback proposed"
            );
            state.rollback.push(rollback);
            created += 1;
        }
        Ok(created)
    }
}
