//! Batch construction, block/epoch hooks and the submission query.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::BridgeEventManager;
use crate::domain::{
    invariant_ordered_append, BlockHeader, BridgeBatchSigned, BridgeError, ChainError, ChainType,
    Direction, EventKind, Log, LogFilters,
};
use crate::ports::inbound::{
    BridgeBatchProvider, BridgeEventSubscriber, PostBlockRequest, PostEpochRequest,
};
use crate::ports::outbound::ExternalChainClient;
use crate::store::{EventRun, StoreTx};

impl BridgeEventManager {
    pub(crate) fn external_client(&self) -> Result<Arc<dyn ExternalChainClient>, ChainError> {
        self.external_client
            .read()
            .clone()
            .ok_or_else(|| ChainError::Connection("external chain client not connected".into()))
    }

    /// Current height of a direction's destination chain.
    async fn destination_height(&self, direction: Direction) -> Result<u64, BridgeError> {
        match direction.destination() {
            ChainType::Internal => Ok(self.deps.blockchain.current_header().number),
            ChainType::External => Ok(self.external_client()?.latest_block_number().await?),
        }
    }

    /// Build, sign and gossip the next batch for `direction`.
    ///
    /// No-op for non-validators, before the first epoch, when no new
    /// messages are stored, and when the newest pending batch already
    /// covers the available messages.
    pub async fn build_bridge_batch(
        &self,
        direction: Direction,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        if !self.deps.runtime.is_active_validator() {
            return Ok(());
        }

        let (epoch, cursor, tail_end) = {
            let state = self.state.read();
            if state.validator_set.is_none() {
                debug!(%direction, "[qc-15] Batch skipped, no validator set yet");
                return Ok(());
            }
            let (cursor, tail_end) = state.batch_origin(direction);
            (state.epoch, cursor, tail_end)
        };

        let (source, destination) = self.chains.route(direction);
        let (from, to) = self.builder.window(cursor);
        let run = self.deps.store.get_bridge_message_events_for_bridge_batch(
            from,
            to,
            tx.as_deref(),
            source,
            destination,
        )?;
        if let EventRun::Partial(events) = &run {
            debug!(
                %direction,
                from,
                available = events.len(),
                "[qc-15] Fewer messages than batch capacity"
            );
        }
        let events = run.into_events();
        let Some(last) = events.last() else {
            return Ok(());
        };
        if tail_end.is_some_and(|end| end >= last.id) {
            debug!(%direction, end = last.id, "[qc-15] Batch already proposed");
            return Ok(());
        }

        let destination_height = self.destination_height(direction).await?;
        let Some(pending) = self.builder.build(&events, epoch, destination_height) else {
            warn!(%direction, from, "[qc-15] Stored messages are not contiguous");
            return Ok(());
        };

        let vote = self.sign_and_publish(&pending, tx.as_deref_mut())?;

        let mut state = self.state.write();
        if state.epoch != epoch {
            debug!(%direction, "[qc-15] Epoch changed while building, batch dropped");
            return Ok(());
        }
        if !invariant_ordered_append(state.pending(direction).last(), &pending) {
            debug!(%direction, "[qc-15] Newer batch already appended");
            return Ok(());
        }
        info!(
            %direction,
            start = pending.batch.start_id,
            end = pending.batch.end_id,
            threshold = pending.batch.threshold,
            epoch,
            hash = %hex::encode(vote.hash),
            "[qc-15] Bridge batch proposed"
        );
        state.pending_mut(direction).push(pending);
        Ok(())
    }

    /// Re-read committed cursors from chain state and drop pending batches
    /// that start behind them. Those can no longer be submitted.
    fn refresh_cursors(&self, header: &BlockHeader) -> Result<(), BridgeError> {
        let system_state = self.deps.blockchain.system_state(header)?;
        let external =
            system_state.next_committed_index(self.chains.external, ChainType::External)?;
        let internal =
            system_state.next_committed_index(self.chains.external, ChainType::Internal)?;

        let mut state = self.state.write();
        for (direction, next) in [
            (Direction::ExternalToInternal, external),
            (Direction::InternalToExternal, internal),
        ] {
            state.set_cursor(direction, next);
            state.pending_mut(direction).retain(|p| p.batch.start_id >= next);
        }
        Ok(())
    }
}

#[async_trait]
impl BridgeEventSubscriber for BridgeEventManager {
    fn log_filters(&self) -> LogFilters {
        let mut filters = LogFilters::new();
        filters
            .entry(self.config.internal_gateway_addr)
            .or_default()
            .extend(self.topics.topics(&[
                EventKind::BridgeMessage,
                EventKind::BridgeMessageResult,
                EventKind::BridgeBatchResult,
            ]));
        filters
            .entry(self.config.bridge_storage_addr)
            .or_default()
            .push(self.topics.topic(EventKind::NewBatch));
        filters
    }

    fn process_log(
        &self,
        header: &BlockHeader,
        log: &Log,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        self.handle_internal_log(header, log, tx)
    }

    async fn post_block(
        &self,
        req: &PostBlockRequest,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        if req.header.number > 0 {
            self.refresh_cursors(&req.header)?;
        }

        for direction in [Direction::InternalToExternal, Direction::ExternalToInternal] {
            if let Err(e) = self.build_bridge_batch(direction, tx.as_deref_mut()).await {
                error!(
                    %direction,
                    block = req.header.number,
                    error = %e,
                    "[qc-15] Failed to build bridge batch"
                );
            }
        }

        let block = req.header.number;
        if let Err(e) = self.internal_chain_rollback_handler(block, tx.as_deref_mut()) {
            error!(block, error = %e, "[qc-15] Internal chain rollback failed");
        }
        if let Err(e) = self.external_chain_rollback_handler(tx).await {
            error!(block, error = %e, "[qc-15] External chain rollback failed");
        }
        Ok(())
    }

    fn post_epoch(
        &self,
        req: &PostEpochRequest,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        let store = &self.deps.store;
        let keep_from = req
            .new_epoch
            .saturating_add(1)
            .saturating_sub(self.config.epoch_retention);
        for chain_id in [self.chains.internal, self.chains.external] {
            store.insert_epoch(req.new_epoch, chain_id, tx.as_deref_mut())?;
            if let Err(e) = store.prune_epochs(chain_id, keep_from, tx.as_deref_mut()) {
                warn!(chain_id, error = %e, "[qc-15] Epoch pruning failed");
            }
        }

        let mut state = self.state.write();
        state.epoch = req.new_epoch;
        state.validator_set = Some(Arc::new(req.validator_set.clone()));
        state.pending_external.clear();
        state.pending_internal.clear();
        state.unexecuted.clear();
        state.rollback.clear();
        info!(
            epoch = req.new_epoch,
            validators = req.validator_set.len(),
            "[qc-15] Bridge entered new epoch"
        );
        Ok(())
    }
}

impl BridgeBatchProvider for BridgeEventManager {
    fn bridge_batch(&self, block_number: u64) -> Result<Vec<BridgeBatchSigned>, BridgeError> {
        let state = self.state.read();
        let Some(validator_set) = state.validator_set.clone() else {
            return Ok(Vec::new());
        };

        let mut ready = Vec::new();
        for direction in Direction::ALL {
            let cursor = state.cursor(direction);
            for pending in state.pending(direction).iter().rev() {
                if pending.batch.start_id != cursor {
                    continue;
                }
                match self.aggregate_signature(block_number, pending, &validator_set) {
                    Ok(signature) => {
                        ready.push(BridgeBatchSigned {
                            batch: pending.batch.clone(),
                            signature,
                        });
                        break;
                    }
                    Err(e) if e.is_quorum_not_reached() => {
                        debug!(
                            %direction,
                            start = pending.batch.start_id,
                            end = pending.batch.end_id,
                            "[qc-15] Quorum not reached"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let mut seen = HashSet::new();
        for rollback in &state.rollback {
            if !seen.insert(rollback.hash()) {
                continue;
            }
            match self.aggregate_signature(block_number, rollback, &validator_set) {
                Ok(signature) => ready.push(BridgeBatchSigned {
                    batch: rollback.batch.clone(),
                    signature,
                }),
                Err(e) if e.is_quorum_not_reached() => {
                    debug!(
                        start = rollback.batch.start_id,
                        end = rollback.batch.end_id,
                        "[qc-15] Rollback quorum not reached"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ready)
    }
}
