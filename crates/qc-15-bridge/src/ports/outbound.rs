//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the bridge requires from the host node.
//!
//! | Port | Production | Testing |
//! |------|-----------|---------|
//! | `KeyValueStore` | `RocksDbStore` (feature `rocksdb`) | `InMemoryKVStore` |
//! | `Topic` | p2p gossip | `InMemoryTopic` |
//! | `EventTracker` | JSON-RPC log poller | `RecordingEventTracker` |
//! | `Runtime` | consensus runtime | `StaticRuntime` |
//! | `Blockchain` / `SystemState` | block pipeline | `InMemoryChain` |
//! | `ExternalClientFactory` | JSON-RPC relayer | `StaticExternalClient` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::domain::{
    Address, BlockHeader, BridgeBatch, ChainError, ChainType, Hash, KVStoreError, TrackerError,
    TransportError,
};
use crate::ports::inbound::ExternalLogSink;

/// Abstract key-value database.
///
/// Keys are compared bytewise; `prefix_scan` returns entries in key order.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Apply all operations or none of them.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Entries whose key starts with `prefix`, in key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Generic gossip envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportMessage {
    /// Opaque payload.
    pub data: Vec<u8>,
}

/// Gossip topic votes are exchanged on.
pub trait Topic: Send + Sync {
    /// Broadcast to peers.
    fn publish(&self, message: TransportMessage) -> Result<(), TransportError>;

    /// Receive messages from peers.
    fn subscribe(&self) -> Result<broadcast::Receiver<TransportMessage>, TransportError>;
}

/// Settings handed to the external log tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTrackerConfig {
    /// Chain the tracker polls.
    pub chain_id: u64,
    /// JSON-RPC endpoint of that chain.
    pub rpc_endpoint: String,
    /// Directory for the tracker's own progress database.
    pub state_data_dir: String,
    /// Contract address → topics of interest.
    pub log_filter: Vec<(Address, Vec<Hash>)>,
    /// First block to scan when no progress is recorded.
    pub start_block: u64,
    /// Blocks fetched per request.
    pub sync_batch_size: u64,
    /// Confirmations before a log is delivered.
    pub num_block_confirmations: u64,
    /// Depth of reorg reconciliation.
    pub num_of_blocks_to_reconcile: u64,
    /// Delay between polls.
    pub poll_interval: Duration,
}

/// Delivers confirmed external-chain logs in order.
#[async_trait]
pub trait EventTracker: Send + Sync {
    /// Begin polling and pushing logs into `sink`.
    async fn start(
        &self,
        config: EventTrackerConfig,
        sink: Arc<dyn ExternalLogSink>,
    ) -> Result<(), TrackerError>;

    /// Stop polling.
    fn close(&self);
}

/// Node runtime facts the bridge depends on.
pub trait Runtime: Send + Sync {
    /// Whether this node is currently an active validator.
    fn is_active_validator(&self) -> bool;
}

/// Read access to internal-chain contract state at a block.
pub trait SystemState: Send + Sync {
    /// Next message ID not yet committed for the bridge to `external_chain_id`.
    ///
    /// `ChainType::External` is the cursor for external-origin messages,
    /// `ChainType::Internal` for internal-origin ones.
    fn next_committed_index(
        &self,
        external_chain_id: u64,
        origin: ChainType,
    ) -> Result<u64, ChainError>;

    /// Committed batch by sequence number.
    fn committed_batch(&self, batch_id: u64) -> Result<BridgeBatch, ChainError>;
}

/// Internal chain access.
pub trait Blockchain: Send + Sync {
    /// Latest finalized header.
    fn current_header(&self) -> BlockHeader;

    /// State view at `header`.
    fn system_state(&self, header: &BlockHeader) -> Result<Arc<dyn SystemState>, ChainError>;
}

/// Read-only client for the external chain.
#[async_trait]
pub trait ExternalChainClient: Send + Sync {
    /// Latest block number.
    async fn latest_block_number(&self) -> Result<u64, ChainError>;
}

/// Opens external chain clients.
#[async_trait]
pub trait ExternalClientFactory: Send + Sync {
    /// Connect to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ExternalChainClient>, ChainError>;
}
