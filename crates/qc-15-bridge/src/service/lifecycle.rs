//! Startup, gossip loop and shutdown.

use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::BridgeEventManager;
use crate::config::RuntimeConfig;
use crate::domain::{BridgeBatchVote, BridgeError, EventKind, LogFilters};
use crate::ports::inbound::{BridgeLifecycle, ExternalLogSink};
use crate::ports::outbound::{EventTrackerConfig, TransportMessage};

impl BridgeEventManager {
    /// Contract address → topics the external tracker must deliver.
    pub fn external_tracker_filter(&self) -> LogFilters {
        let topics = self.topics.topics(&[
            EventKind::BridgeMessage,
            EventKind::BridgeBatchResult,
            EventKind::NewBatch,
        ]);
        LogFilters::from([(self.config.external_gateway_addr, topics)])
    }

    /// Configuration for the external log tracker.
    pub fn external_tracker_config(&self, runtime: &RuntimeConfig) -> EventTrackerConfig {
        let settings = &runtime.event_tracker;
        EventTrackerConfig {
            chain_id: self.chains.external,
            rpc_endpoint: self.config.json_rpc_endpoint.clone(),
            state_data_dir: format!(
                "{}/bridge-tracker-{}",
                runtime.state_data_dir.trim_end_matches('/'),
                self.chains.external
            ),
            log_filter: self.external_tracker_filter().into_iter().collect(),
            start_block: self.config.event_tracker_start_block,
            sync_batch_size: settings.sync_batch_size,
            num_block_confirmations: settings.num_block_confirmations,
            num_of_blocks_to_reconcile: settings.num_of_blocks_to_reconcile,
            poll_interval: settings.poll_interval(),
        }
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn spawn_gossip_loop(self: &Arc<Self>, receiver: broadcast::Receiver<TransportMessage>) {
        let manager = Arc::downgrade(self);
        let handle = tokio::spawn(run_gossip_loop(manager, receiver));
        if let Some(previous) = self.gossip_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Decode and store one gossiped vote.
    pub(crate) fn handle_gossip(&self, message: &TransportMessage) {
        let vote: BridgeBatchVote = match serde_json::from_slice(&message.data) {
            Ok(vote) => vote,
            Err(e) => {
                warn!(error = %e, "[qc-15] Dropping malformed bridge vote");
                return;
            }
        };
        if let Err(e) = self.save_vote(&vote) {
            warn!(
                sender = %vote.sender,
                epoch = vote.epoch_number,
                error = %e,
                "[qc-15] Bridge vote rejected"
            );
        }
    }
}

async fn run_gossip_loop(
    manager: Weak<BridgeEventManager>,
    mut receiver: broadcast::Receiver<TransportMessage>,
) {
    loop {
        match receiver.recv().await {
            Ok(message) => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if !manager.deps.runtime.is_active_validator() {
                    continue;
                }
                tokio::spawn(async move { manager.handle_gossip(&message) });
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("[qc-15] Bridge gossip lagged by {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("[qc-15] Bridge gossip topic closed, exiting");
                break;
            }
        }
    }
}

#[async_trait]
impl BridgeLifecycle for BridgeEventManager {
    async fn start(self: Arc<Self>, config: &RuntimeConfig) -> Result<(), BridgeError> {
        let receiver = self.deps.topic.subscribe()?;

        let tracker_config = self.external_tracker_config(config);
        let sink: Arc<dyn ExternalLogSink> = self.clone();
        self.deps
            .tracker
            .start(tracker_config, sink)
            .await
            .inspect_err(|e| error!(error = %e, "[qc-15] External event tracker failed to start"))?;

        let client = self
            .deps
            .external_clients
            .connect(&self.config.json_rpc_endpoint)
            .await
            .inspect_err(|e| {
                error!(error = %e, "[qc-15] External chain client failed to connect");
                self.deps.tracker.close();
            })?;
        *self.external_client.write() = Some(client);

        self.spawn_gossip_loop(receiver);
        self.closed.store(false, Ordering::SeqCst);

        info!(
            internal_chain = self.chains.internal,
            external_chain = self.chains.external,
            validator = %self.deps.key.address(),
            "[qc-15] Bridge started"
        );
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("[qc-15] Bridge already closed");
            return;
        }
        self.deps.tracker.close();
        if let Some(task) = self.gossip_task.lock().take() {
            task.abort();
        }
        info!(external_chain = self.chains.external, "[qc-15] Bridge closed");
    }
}
