//! In-memory chain readers.
//!
//! `InMemoryChain` stands in for the internal block pipeline and its
//! bridge contract state. `StaticExternalClient` stands in for the
//! external chain's JSON-RPC endpoint.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{BlockHeader, BridgeBatch, ChainError, ChainType};
use crate::ports::outbound::{
    Blockchain, ExternalChainClient, ExternalClientFactory, SystemState,
};

#[derive(Debug, Default)]
struct ChainState {
    head: u64,
    next_index: HashMap<(u64, ChainType), u64>,
    committed: HashMap<u64, BridgeBatch>,
    unavailable: bool,
}

/// Internal chain with mutable bridge contract state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryChain {
    state: Arc<RwLock<ChainState>>,
}

impl InMemoryChain {
    /// Chain at genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the head to `number`.
    pub fn set_head(&self, number: u64) {
        self.state.write().head = number;
    }

    /// Record the next uncommitted message ID for an origin.
    pub fn set_next_committed_index(&self, external_chain_id: u64, origin: ChainType, next: u64) {
        self.state
            .write()
            .next_index
            .insert((external_chain_id, origin), next);
    }

    /// Store a committed batch under `batch_id`.
    pub fn commit_batch(&self, batch_id: u64, batch: BridgeBatch) {
        self.state.write().committed.insert(batch_id, batch);
    }

    /// Make state reads fail until re-enabled.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }
}

impl Blockchain for InMemoryChain {
    fn current_header(&self) -> BlockHeader {
        BlockHeader::at(self.state.read().head)
    }

    fn system_state(&self, _header: &BlockHeader) -> Result<Arc<dyn SystemState>, ChainError> {
        if self.state.read().unavailable {
            return Err(ChainError::StateRead("state provider unavailable".into()));
        }
        Ok(Arc::new(self.clone()))
    }
}

impl SystemState for InMemoryChain {
    fn next_committed_index(
        &self,
        external_chain_id: u64,
        origin: ChainType,
    ) -> Result<u64, ChainError> {
        Ok(self
            .state
            .read()
            .next_index
            .get(&(external_chain_id, origin))
            .copied()
            .unwrap_or(1))
    }

    fn committed_batch(&self, batch_id: u64) -> Result<BridgeBatch, ChainError> {
        self.state
            .read()
            .committed
            .get(&batch_id)
            .cloned()
            .ok_or(ChainError::BatchNotFound(batch_id))
    }
}

/// External chain client reporting a settable height.
#[derive(Debug, Default)]
pub struct StaticExternalClient {
    height: AtomicU64,
    failing: AtomicBool,
}

impl StaticExternalClient {
    /// Client at `height`.
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            failing: AtomicBool::new(false),
        }
    }

    /// Move the reported height.
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Make height reads fail until re-enabled.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExternalChainClient for StaticExternalClient {
    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChainError::Connection("endpoint unreachable".into()));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }
}

/// Hands out one shared [`StaticExternalClient`] and records endpoints.
#[derive(Debug)]
pub struct StaticClientFactory {
    client: Arc<StaticExternalClient>,
    endpoints: Mutex<Vec<String>>,
}

impl StaticClientFactory {
    /// Factory handing out `client`.
    pub fn new(client: Arc<StaticExternalClient>) -> Self {
        Self {
            client,
            endpoints: Mutex::new(Vec::new()),
        }
    }

    /// Endpoints connected to so far.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }
}

#[async_trait]
impl ExternalClientFactory for StaticClientFactory {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ExternalChainClient>, ChainError> {
        debug!(endpoint, "[qc-15] External client connected");
        self.endpoints.lock().push(endpoint.to_string());
        Ok(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_state_defaults_cursor_to_first_id() {
        let chain = InMemoryChain::new();
        let state = chain.system_state(&chain.current_header()).unwrap();
        assert_eq!(state.next_committed_index(2, ChainType::External).unwrap(), 1);

        chain.set_next_committed_index(2, ChainType::External, 6);
        assert_eq!(state.next_committed_index(2, ChainType::External).unwrap(), 6);
        assert_eq!(state.next_committed_index(2, ChainType::Internal).unwrap(), 1);
    }

    #[test]
    fn test_unavailable_state() {
        let chain = InMemoryChain::new();
        chain.set_unavailable(true);
        assert!(chain.system_state(&BlockHeader::at(1)).is_err());
    }

    #[tokio::test]
    async fn test_factory_shares_client() {
        let client = Arc::new(StaticExternalClient::new(10));
        let factory = StaticClientFactory::new(client.clone());
        let connected = factory.connect("http://127.0.0.1:8545").await.unwrap();

        client.set_height(25);
        assert_eq!(connected.latest_block_number().await.unwrap(), 25);
        assert_eq!(factory.endpoints(), vec!["http://127.0.0.1:8545".to_string()]);

        client.set_failing(true);
        assert!(connected.latest_block_number().await.is_err());
    }
}
