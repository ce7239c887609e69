//! # Inbound Ports
//!
//! Capabilities the bridge exposes, split by consumer:
//!
//! - [`BridgeLifecycle`]: node startup and shutdown
//! - [`BridgeEventSubscriber`]: block-processing pipeline
//! - [`BridgeBatchProvider`]: submission poller
//! - [`ExternalLogSink`]: external event tracker

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::domain::{BlockHeader, BridgeBatchSigned, BridgeError, Log, LogFilters, ValidatorSet};
use crate::store::StoreTx;

/// A finalized internal block.
#[derive(Clone, Debug)]
pub struct PostBlockRequest {
    /// Header of the finalized block.
    pub header: BlockHeader,
}

/// An epoch transition.
#[derive(Clone, Debug)]
pub struct PostEpochRequest {
    /// Number of the epoch being entered.
    pub new_epoch: u64,
    /// Validator set of that epoch.
    pub validator_set: ValidatorSet,
}

/// Startup and shutdown.
#[async_trait]
pub trait BridgeLifecycle: Send + Sync {
    /// Subscribe to gossip, start the external tracker and connect the
    /// external client. Failures are fatal for node startup.
    async fn start(self: Arc<Self>, config: &RuntimeConfig) -> Result<(), BridgeError>;

    /// Stop background work. Safe to call more than once.
    fn close(&self);
}

/// Hooks driven by internal block processing.
#[async_trait]
pub trait BridgeEventSubscriber: Send + Sync {
    /// Contract address → topics this subscriber needs from internal blocks.
    fn log_filters(&self) -> LogFilters;

    /// Handle one internal-chain log.
    fn process_log(
        &self,
        header: &BlockHeader,
        log: &Log,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError>;

    /// Handle a finalized block.
    async fn post_block(
        &self,
        req: &PostBlockRequest,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError>;

    /// Handle an epoch transition.
    fn post_epoch(
        &self,
        req: &PostEpochRequest,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError>;
}

/// Read side used by the submission poller.
pub trait BridgeBatchProvider: Send + Sync {
    /// Quorum-certified batches ready for submission at `block_number`.
    fn bridge_batch(&self, block_number: u64) -> Result<Vec<BridgeBatchSigned>, BridgeError>;
}

/// Receives confirmed external-chain logs.
pub trait ExternalLogSink: Send + Sync {
    /// Handle one external-chain log from `chain_id`.
    fn add_log(&self, chain_id: u64, log: &Log) -> Result<(), BridgeError>;
}
