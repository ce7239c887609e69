//! # Bridge Event Manager
//!
//! Orchestrates one internal↔external bridge:
//!
//! - ingests confirmed logs from both chains
//! - builds, signs and gossips batches for both traffic directions
//! - verifies and persists votes from peers
//! - aggregates signatures once quorum is reached
//! - tracks unexecuted batches and produces rollback batches past their deadline
//!
//! ## Concurrency
//!
//! Block processing, gossip delivery and submission polling share one
//! manager. Epoch state sits behind a single reader/writer lock that is
//! never held across network I/O: a snapshot is taken under the lock, the
//! lock is released for I/O, and the lock is re-acquired only to apply the
//! result.
//!
//! ## Per-direction lifecycle
//!
//! ```text
//! NoPendingEvents → Building → AwaitingQuorum → QuorumReached → Submitted
//!                                                                  │
//!                      Executed (removed) ◄────────────────────────┤
//!                      RollbackEligible → RollbackAwaitingQuorum → RollbackReady
//! ```

mod batches;
mod lifecycle;
mod logs;
mod rollback;
mod votes;


use parking_lot::{Mutex, RwLock};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::domain::{
    BatchBuilder, BridgeError, ChainPair, Direction, EventTopics, PendingBridgeBatch,
    RoundUpThreshold, SigningDomain, ThresholdPolicy, ValidatorKey, ValidatorSet,
};
use crate::ports::outbound::{
    Blockchain, EventTracker, ExternalChainClient, ExternalClientFactory, Runtime, Topic,
};
use crate::store::VoteStore;

/// First message ID on every route.
pub const FIRST_EVENT_ID: u64 = 1;

/// Collaborators of a [`BridgeEventManager`].
#[derive(Clone)]
pub struct BridgeDeps {
    /// Ledger shared by every bridge of the node.
    pub store: Arc<VoteStore>,
    /// Gossip topic for votes.
    pub topic: Arc<dyn Topic>,
    /// External log source.
    pub tracker: Arc<dyn EventTracker>,
    /// Validator status.
    pub runtime: Arc<dyn Runtime>,
    /// Internal chain access.
    pub blockchain: Arc<dyn Blockchain>,
    /// External chain connector.
    pub external_clients: Arc<dyn ExternalClientFactory>,
    /// This node's signing key.
    pub key: Arc<ValidatorKey>,
}

/// Mutable state replaced wholesale at every epoch transition.
#[derive(Debug)]
struct EpochState {
    epoch: u64,
    validator_set: Option<Arc<ValidatorSet>>,
    pending_external: Vec<PendingBridgeBatch>,
    pending_internal: Vec<PendingBridgeBatch>,
    unexecuted: Vec<PendingBridgeBatch>,
    rollback: Vec<PendingBridgeBatch>,
    cursor_external: u64,
    cursor_internal: u64,
}

impl EpochState {
    fn new() -> Self {
        Self {
            epoch: 0,
            validator_set: None,
            pending_external: Vec::new(),
            pending_internal: Vec::new(),
            unexecuted: Vec::new(),
            rollback: Vec::new(),
            cursor_external: FIRST_EVENT_ID,
            cursor_internal: FIRST_EVENT_ID,
        }
    }

    fn pending(&self, direction: Direction) -> &Vec<PendingBridgeBatch> {
        match direction {
            Direction::ExternalToInternal => &self.pending_external,
            Direction::InternalToExternal => &self.pending_internal,
        }
    }

    fn pending_mut(&mut self, direction: Direction) -> &mut Vec<PendingBridgeBatch> {
        match direction {
            Direction::ExternalToInternal => &mut self.pending_external,
            Direction::InternalToExternal => &mut self.pending_internal,
        }
    }

    fn cursor(&self, direction: Direction) -> u64 {
        match direction {
            Direction::ExternalToInternal => self.cursor_external,
            Direction::InternalToExternal => self.cursor_internal,
        }
    }

    fn set_cursor(&mut self, direction: Direction, next: u64) {
        match direction {
            Direction::ExternalToInternal => self.cursor_external = next,
            Direction::InternalToExternal => self.cursor_internal = next,
        }
    }

    /// Committed cursor for `direction` and the end of its newest pending batch.
    ///
    /// Every batch starts at the cursor, so validators that learned about
    /// messages at different times still converge on the same range.
    fn batch_origin(&self, direction: Direction) -> (u64, Option<u64>) {
        let tail_end = self.pending(direction).last().map(|p| p.batch.end_id);
        (self.cursor(direction), tail_end)
    }
}

/// The bridge core for one external chain.
pub struct BridgeEventManager {
    config: BridgeConfig,
    chains: ChainPair,
    topics: EventTopics,
    builder: BatchBuilder,
    domain: SigningDomain,
    deps: BridgeDeps,
    state: RwLock<EpochState>,
    external_client: RwLock<Option<Arc<dyn ExternalChainClient>>>,
    gossip_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BridgeEventManager {
    /// Manager using the round-up deadline policy from `config`.
    pub fn new(config: BridgeConfig, deps: BridgeDeps) -> Result<Self, BridgeError> {
        let policy = RoundUpThreshold {
            granularity: config.threshold_granularity,
            offset: config.batch_threshold_offset,
        };
        Self::with_threshold_policy(config, deps, Arc::new(policy))
    }

    /// Manager with a custom deadline policy.
    pub fn with_threshold_policy(
        config: BridgeConfig,
        deps: BridgeDeps,
        policy: Arc<dyn ThresholdPolicy>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            chains: config.chains(),
            topics: EventTopics::new(),
            builder: BatchBuilder::new(config.max_events_per_batch, policy),
            domain: SigningDomain::bridge(),
            config,
            deps,
            state: RwLock::new(EpochState::new()),
            external_client: RwLock::new(None),
            gossip_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Bridge settings.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Chains this manager connects.
    pub fn chains(&self) -> ChainPair {
        self.chains
    }

    /// Event topic table.
    pub fn topics(&self) -> &EventTopics {
        &self.topics
    }

    /// Shared ledger.
    pub fn store(&self) -> &Arc<VoteStore> {
        &self.deps.store
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    /// Pending batches of one direction, oldest first.
    pub fn pending_batches(&self, direction: Direction) -> Vec<PendingBridgeBatch> {
        self.state.read().pending(direction).clone()
    }

    /// Batches committed on chain but not yet confirmed executed.
    pub fn unexecuted_batches(&self) -> Vec<PendingBridgeBatch> {
        self.state.read().unexecuted.clone()
    }

    /// Rollback batches awaiting quorum or submission.
    pub fn rollback_batches(&self) -> Vec<PendingBridgeBatch> {
        self.state.read().rollback.clone()
    }

    /// Next message ID the chain expects for a direction.
    pub fn cursor(&self, direction: Direction) -> u64 {
        self.state.read().cursor(direction)
    }
}

impl std::fmt::Debug for BridgeEventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEventManager")
            .field("chains", &self.chains)
            .field("validator", &self.deps.key.address())
            .finish_non_exhaustive()
    }
}
