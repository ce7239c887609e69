//! # Multi-Bridge Fan-Out
//!
//! A node bridges its chain to zero or more external chains. [`Bridge`]
//! is the tag callers branch on; [`BridgeSet`] fans every capability out
//! to one [`BridgeEventManager`] per external chain.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::config::RuntimeConfig;
use crate::domain::{BlockHeader, BridgeBatchSigned, BridgeError, ConfigError, Log, LogFilters};
use crate::ports::inbound::{
    BridgeBatchProvider, BridgeEventSubscriber, BridgeLifecycle, PostBlockRequest,
    PostEpochRequest,
};
use crate::service::BridgeEventManager;
use crate::store::StoreTx;

/// Whether bridging is configured on this node.
#[derive(Debug)]
pub enum Bridge {
    /// At least one external chain is bridged.
    Enabled(BridgeSet),
    /// Bridging is off.
    Disabled,
}

impl Bridge {
    /// `Disabled` for no managers, otherwise an `Enabled` set.
    pub fn new(managers: Vec<Arc<BridgeEventManager>>) -> Result<Self, BridgeError> {
        if managers.is_empty() {
            return Ok(Bridge::Disabled);
        }
        Ok(Bridge::Enabled(BridgeSet::new(managers)?))
    }

    /// The active set, if enabled.
    pub fn enabled(&self) -> Option<&BridgeSet> {
        match self {
            Bridge::Enabled(set) => Some(set),
            Bridge::Disabled => None,
        }
    }
}

/// Managers keyed by external chain ID.
#[derive(Debug)]
pub struct BridgeSet {
    managers: BTreeMap<u64, Arc<BridgeEventManager>>,
}

impl BridgeSet {
    /// Every manager must share one internal chain and bridge a distinct
    /// external chain.
    pub fn new(managers: Vec<Arc<BridgeEventManager>>) -> Result<Self, BridgeError> {
        let mut by_chain = BTreeMap::new();
        let mut internal = None;
        for manager in managers {
            let chains = manager.chains();
            if *internal.get_or_insert(chains.internal) != chains.internal {
                return Err(ConfigError::InvalidValue {
                    field: "internal_chain_id",
                    reason: "bridges disagree on the internal chain".into(),
                }
                .into());
            }
            if by_chain.insert(chains.external, manager).is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "external_chain_id",
                    reason: format!("chain {} bridged twice", chains.external),
                }
                .into());
            }
        }
        Ok(Self { managers: by_chain })
    }

    /// Manager for an external chain.
    pub fn get(&self, external_chain_id: u64) -> Option<&Arc<BridgeEventManager>> {
        self.managers.get(&external_chain_id)
    }

    /// Bridged external chain IDs, ascending.
    pub fn external_chain_ids(&self) -> Vec<u64> {
        self.managers.keys().copied().collect()
    }

    /// Number of bridges.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Always false for a constructed set reached through [`Bridge::enabled`].
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Start every bridge. Stops at the first failure.
    pub async fn start(&self, config: &RuntimeConfig) -> Result<(), BridgeError> {
        for manager in self.managers.values() {
            Arc::clone(manager).start(config).await?;
        }
        Ok(())
    }

    /// Close every bridge.
    pub fn close(&self) {
        for manager in self.managers.values() {
            manager.close();
        }
    }

    fn wants(manager: &BridgeEventManager, log: &Log) -> bool {
        let Some(topic) = log.topics.first() else {
            return false;
        };
        manager
            .log_filters()
            .get(&log.address)
            .is_some_and(|topics| topics.contains(topic))
    }
}

#[async_trait]
impl BridgeEventSubscriber for BridgeSet {
    fn log_filters(&self) -> LogFilters {
        let mut merged = LogFilters::new();
        for manager in self.managers.values() {
            for (address, topics) in manager.log_filters() {
                let entry = merged.entry(address).or_default();
                for topic in topics {
                    if !entry.contains(&topic) {
                        entry.push(topic);
                    }
                }
            }
        }
        merged
    }

    fn process_log(
        &self,
        header: &BlockHeader,
        log: &Log,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        let topic = log.topics.first().ok_or(BridgeError::EmptyLog)?;
        let mut handled = false;
        for manager in self.managers.values() {
            if Self::wants(manager, log) {
                manager.process_log(header, log, tx.as_deref_mut())?;
                handled = true;
            }
        }
        if handled {
            Ok(())
        } else {
            Err(BridgeError::UnknownBridgeEvent { topic: *topic })
        }
    }

    async fn post_block(
        &self,
        req: &PostBlockRequest,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        let mut first_error = None;
        for (chain_id, manager) in &self.managers {
            if let Err(e) = manager.post_block(req, tx.as_deref_mut()).await {
                error!(
                    external_chain = chain_id,
                    block = req.header.number,
                    error = %e,
                    "[qc-15] Bridge block processing failed"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn post_epoch(
        &self,
        req: &PostEpochRequest,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<(), BridgeError> {
        for manager in self.managers.values() {
            manager.post_epoch(req, tx.as_deref_mut())?;
        }
        Ok(())
    }
}

impl BridgeBatchProvider for BridgeSet {
    fn bridge_batch(&self, block_number: u64) -> Result<Vec<BridgeBatchSigned>, BridgeError> {
        let mut ready = Vec::new();
        for manager in self.managers.values() {
            ready.extend(manager.bridge_batch(block_number)?);
        }
        Ok(ready)
    }
}
