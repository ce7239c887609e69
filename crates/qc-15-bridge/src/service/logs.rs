//! Log ingestion from both chains.

use tracing::{debug, info, trace};

use super::BridgeEventManager;
use crate::domain::{
    BlockHeader, BridgeBatchResultEvent, BridgeError, EventKind, Log, PendingBridgeBatch,
};
use crate::ports::inbound::ExternalLogSink;
use crate::store::StoreTx;

impl BridgeEventManager {
    fn classify(&self, log: &Log) -> Result<EventKind, BridgeError> {
        let topic = log.topics.first().ok_or(BridgeError::EmptyLog)?;
        self.topics
            .kind_of(topic)
            .ok_or(BridgeError::UnknownBridgeEvent { topic: *topic })
    }

    /// Handle a log emitted on the internal chain.
    pub(crate) fn handle_internal_log(
        &self,
        header: &BlockHeader,
        log: &Log,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        let chains = self.chains;
        match self.classify(log)? {
            EventKind::BridgeMessageResult => {
                let result = self.topics.decode_message_result(log)?;
                if result.source_chain_id != chains.external
                    || result.destination_chain_id != chains.internal
                {
                    return Ok(());
                }
                if !result.status {
                    debug!(id = result.counter, "[qc-15] Bridge message execution failed");
                    return Ok(());
                }
                self.deps.store.remove_bridge_events(&result, tx)?;
            }
            EventKind::BridgeMessage => {
                let event = self.topics.decode_message(log)?;
                if event.source_chain_id != chains.internal
                    || event.destination_chain_id != chains.external
                {
                    return Ok(());
                }
                self.deps.store.insert_bridge_message_event(&event, tx)?;
            }
            EventKind::BridgeBatchResult => {
                let result = self.topics.decode_batch_result(log)?;
                if result.source_chain_id != chains.external {
                    return Ok(());
                }
                self.retire_executed(&result);
            }
            EventKind::NewBatch => {
                let event = self.topics.decode_new_batch(log)?;
                let batch = self
                    .deps
                    .blockchain
                    .system_state(header)?
                    .committed_batch(event.batch_id)?;
                if batch.is_rollback {
                    debug!(batch_id = event.batch_id, "[qc-15] Committed rollback batch not tracked");
                    return Ok(());
                }
                if chains
                    .direction_of(batch.source_chain_id, batch.destination_chain_id)
                    .is_none()
                {
                    return Ok(());
                }

                let mut state = self.state.write();
                let epoch = state.epoch;
                if state.unexecuted.iter().any(|b| b.batch == batch) {
                    return Ok(());
                }
                info!(
                    batch_id = event.batch_id,
                    start = batch.start_id,
                    end = batch.end_id,
                    threshold = batch.threshold,
                    "[qc-15] Batch committed, awaiting execution"
                );
                state.unexecuted.push(PendingBridgeBatch { epoch, batch });
            }
        }
        Ok(())
    }

    /// Remove a confirmed batch from the unexecuted and rollback lists.
    fn retire_executed(&self, result: &BridgeBatchResultEvent) {
        let mut state = self.state.write();
        let before = state.unexecuted.len() + state.rollback.len();
        state.unexecuted.retain(|b| !b.batch.matches_result(result));
        state.rollback.retain(|b| !b.batch.matches_result(result));
        let removed = before - state.unexecuted.len() - state.rollback.len();
        debug!(
            source = result.source_chain_id,
            start = result.start_id,
            end = result.end_id,
            removed,
            "[qc-15] Batch execution confirmed"
        );
    }
}

impl ExternalLogSink for BridgeEventManager {
    fn add_log(&self, chain_id: u64, log: &Log) -> Result<(), BridgeError> {
        let chains = self.chains;
        match self.classify(log)? {
            EventKind::BridgeMessage => {
                if chain_id != chains.external {
                    trace!(chain_id, "[qc-15] Message from foreign chain ignored");
                    return Ok(());
                }
                let event = self.topics.decode_message(log)?;
                if event.source_chain_id != chains.external
                    || event.destination_chain_id != chains.internal
                {
                    return Ok(());
                }
                self.deps.store.insert_bridge_message_event(&event, None)?;
            }
            EventKind::BridgeBatchResult => {
                let result = self.topics.decode_batch_result(log)?;
                if chains
                    .direction_of(result.source_chain_id, result.destination_chain_id)
                    .is_some()
                {
                    self.retire_executed(&result);
                }
            }
            EventKind::BridgeMessageResult => {
                let result = self.topics.decode_message_result(log)?;
                if result.status
                    && result.source_chain_id == chains.internal
                    && result.destination_chain_id == chains.external
                {
                    self.deps.store.remove_bridge_events(&result, None)?;
                }
            }
            // The batch record lives in external contract storage and the
            // external client only reports heights. Internal→external batches
            // are tracked from the internal chain's own NewBatch log instead.
            EventKind::NewBatch => {
                debug!(chain_id, "[qc-15] External batch commitment ignored");
            }
        }
        Ok(())
    }
}
