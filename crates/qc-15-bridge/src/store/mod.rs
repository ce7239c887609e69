//! # Vote Store
//!
//! Durable ledger of pending bridge messages, per-epoch batch votes and
//! epoch markers, built on the [`KeyValueStore`] port.
//!
//! Every mutating call takes an optional [`StoreTx`]. With `None` the write
//! is committed immediately as one atomic batch; with a transaction it is
//! staged and becomes visible to reads made through that transaction.
//!
//! Votes and the local batch index live in per-epoch namespaces that
//! [`VoteStore::prune_epochs`] removes wholesale. Messages live in a
//! chain-scoped namespace and survive epoch pruning.

mod keys;
mod tx;

pub use tx::StoreTx;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::{
    BridgeMessageEvent, BridgeMessageResultEvent, Hash, StoreError, VoteConsensusData,
};
use crate::ports::outbound::{BatchOperation, KeyValueStore};

const EPOCH_MARKER: &[u8] = &[1];

/// Result of fetching a message run for batching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventRun {
    /// The whole requested range was present.
    Complete(Vec<BridgeMessageEvent>),
    /// Fewer messages than requested; the run stops at the first gap.
    Partial(Vec<BridgeMessageEvent>),
}

impl EventRun {
    /// Messages in the run.
    pub fn events(&self) -> &[BridgeMessageEvent] {
        match self {
            EventRun::Complete(events) | EventRun::Partial(events) => events,
        }
    }

    /// Take the messages.
    pub fn into_events(self) -> Vec<BridgeMessageEvent> {
        match self {
            EventRun::Complete(events) | EventRun::Partial(events) => events,
        }
    }

    /// Whether the run has no messages.
    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

/// Range of a batch this node built or rolled back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct BatchIndexEntry {
    destination_chain_id: u64,
    start_id: u64,
    end_id: u64,
}

/// Persistent bridge ledger shared by every bridge instance of a node.
pub struct VoteStore {
    kv: RwLock<Box<dyn KeyValueStore>>,
}

impl VoteStore {
    /// Wrap a key-value backend.
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self { kv: RwLock::new(kv) }
    }

    /// Apply a transaction atomically.
    pub fn commit(&self, tx: StoreTx) -> Result<(), StoreError> {
        if tx.is_empty() {
            return Ok(());
        }
        let mut kv = self.kv.write();
        kv.atomic_batch_write(tx.into_operations())?;
        Ok(())
    }

    /// Create the vote ledger for `epoch` on `chain_id`. Idempotent.
    pub fn insert_epoch(
        &self,
        epoch: u64,
        chain_id: u64,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), StoreError> {
        let mut kv = self.kv.write();
        let key = keys::epoch(chain_id, epoch);
        if tx::read(&**kv, tx.as_deref(), &key)?.is_some() {
            return Ok(());
        }
        tx::write(&mut **kv, tx, vec![BatchOperation::put(key, EPOCH_MARKER)])?;
        debug!(epoch, chain_id, "[qc-15] Epoch ledger created");
        Ok(())
    }

    /// Whether a ledger exists for `epoch` on `chain_id`.
    pub fn has_epoch(
        &self,
        epoch: u64,
        chain_id: u64,
        tx: Option<&StoreTx>,
    ) -> Result<bool, StoreError> {
        let kv = self.kv.read();
        Ok(tx::read(&**kv, tx, &keys::epoch(chain_id, epoch))?.is_some())
    }

    /// Epochs with a ledger on `chain_id`, ascending.
    pub fn list_epochs(&self, chain_id: u64) -> Result<Vec<u64>, StoreError> {
        let kv = self.kv.read();
        Ok(kv
            .prefix_scan(&keys::epochs_prefix(chain_id))?
            .iter()
            .filter_map(|(key, _)| keys::epoch_from_marker(key))
            .collect())
    }

    /// Persist a pending message keyed by its ID.
    pub fn insert_bridge_message_event(
        &self,
        event: &BridgeMessageEvent,
        tx: Option<&mut StoreTx>,
    ) -> Result<(), StoreError> {
        let key = keys::event(event.source_chain_id, event.destination_chain_id, event.id);
        let value = serde_json::to_vec(event)?;
        let mut kv = self.kv.write();
        tx::write(&mut **kv, tx, vec![BatchOperation::put(key, value)])?;
        trace!(
            id = event.id,
            source = event.source_chain_id,
            destination = event.destination_chain_id,
            "[qc-15] Bridge message stored"
        );
        Ok(())
    }

    /// Contiguous messages `from_id..=to_id` for one route.
    ///
    /// Stops at the first missing ID and reports [`EventRun::Partial`].
    pub fn get_bridge_message_events_for_bridge_batch(
        &self,
        from_id: u64,
        to_id: u64,
        tx: Option<&StoreTx>,
        source_chain_id: u64,
        destination_chain_id: u64,
    ) -> Result<EventRun, StoreError> {
        let kv = self.kv.read();
        let mut events = Vec::new();
        for id in from_id..=to_id {
            let key = keys::event(source_chain_id, destination_chain_id, id);
            match tx::read(&**kv, tx, &key)? {
                Some(raw) => events.push(serde_json::from_slice(&raw)?),
                None => break,
            }
        }

        let requested = to_id.saturating_sub(from_id).saturating_add(1);
        if events.len() as u64 == requested {
            Ok(EventRun::Complete(events))
        } else {
            Ok(EventRun::Partial(events))
        }
    }

    /// Drop an executed message, and the votes of every indexed batch on
    /// that route ending at or before it.
    ///
    /// Returns how many batches had their votes removed.
    pub fn remove_bridge_events(
        &self,
        result: &BridgeMessageResultEvent,
        tx: Option<&mut StoreTx>,
    ) -> Result<usize, StoreError> {
        let mut kv = self.kv.write();
        let mut operations = vec![BatchOperation::delete(keys::event(
            result.source_chain_id,
            result.destination_chain_id,
            result.counter,
        ))];

        let mut cleaned = 0;
        let indexed = tx::scan(
            &**kv,
            tx.as_deref(),
            &keys::batch_index_prefix(result.source_chain_id),
        )?;
        for (key, raw) in indexed {
            let Some((epoch, hash)) = keys::parse_batch_index(&key) else {
                continue;
            };
            let entry: BatchIndexEntry = serde_json::from_slice(&raw)?;
            if entry.destination_chain_id != result.destination_chain_id
                || entry.end_id > result.counter
            {
                continue;
            }
            let votes = tx::scan(
                &**kv,
                tx.as_deref(),
                &keys::votes_for_hash(result.source_chain_id, epoch, &hash),
            )?;
            operations.extend(votes.into_iter().map(|(k, _)| BatchOperation::delete(k)));
            operations.push(BatchOperation::delete(key));
            cleaned += 1;
        }

        tx::write(&mut **kv, tx, operations)?;
        debug!(
            id = result.counter,
            source = result.source_chain_id,
            batches = cleaned,
            "[qc-15] Executed bridge message removed"
        );
        Ok(cleaned)
    }

    /// Record the range of a batch this node signed.
    pub fn insert_batch_index(
        &self,
        epoch: u64,
        hash: &Hash,
        source_chain_id: u64,
        destination_chain_id: u64,
        range: (u64, u64),
        tx: Option<&mut StoreTx>,
    ) -> Result<(), StoreError> {
        let entry = BatchIndexEntry {
            destination_chain_id,
            start_id: range.0,
            end_id: range.1,
        };
        let value = serde_json::to_vec(&entry)?;
        let mut kv = self.kv.write();
        tx::write(
            &mut **kv,
            tx,
            vec![BatchOperation::put(
                keys::batch_index(source_chain_id, epoch, hash),
                value,
            )],
        )?;
        Ok(())
    }

    /// Store a vote unless `(epoch, hash, sender)` is already present.
    ///
    /// Returns the number of distinct signatures for the hash afterwards.
    pub fn insert_consensus_data(
        &self,
        epoch: u64,
        hash: &Hash,
        vote: &VoteConsensusData,
        tx: Option<&mut StoreTx>,
        chain_id: u64,
    ) -> Result<usize, StoreError> {
        let mut kv = self.kv.write();
        if tx::read(&**kv, tx.as_deref(), &keys::epoch(chain_id, epoch))?.is_none() {
            return Err(StoreError::EpochNotFound { epoch, chain_id });
        }

        let vote_key = keys::vote(chain_id, epoch, hash, &vote.sender);
        let prefix = keys::votes_for_hash(chain_id, epoch, hash);

        if tx::read(&**kv, tx.as_deref(), &vote_key)?.is_some() {
            return Ok(tx::scan(&**kv, tx.as_deref(), &prefix)?.len());
        }

        let value = serde_json::to_vec(vote)?;
        match tx {
            Some(tx) => {
                tx::write(&mut **kv, Some(&mut *tx), vec![BatchOperation::put(vote_key, value)])?;
                Ok(tx::scan(&**kv, Some(&*tx), &prefix)?.len())
            }
            None => {
                kv.put(&vote_key, &value)?;
                Ok(kv.prefix_scan(&prefix)?.len())
            }
        }
    }

    /// All votes for `hash` in `epoch` on `chain_id`.
    ///
    /// Errors with [`StoreError::EpochNotFound`] when the epoch has no ledger.
    pub fn get_message_votes(
        &self,
        epoch: u64,
        hash: &Hash,
        chain_id: u64,
    ) -> Result<Vec<VoteConsensusData>, StoreError> {
        let kv = self.kv.read();
        if kv.get(&keys::epoch(chain_id, epoch))?.is_none() {
            return Err(StoreError::EpochNotFound { epoch, chain_id });
        }
        kv.prefix_scan(&keys::votes_for_hash(chain_id, epoch, hash))?
            .into_iter()
            .map(|(_, raw)| serde_json::from_slice(&raw).map_err(StoreError::from))
            .collect()
    }

    /// Remove every epoch ledger on `chain_id` older than `keep_from`.
    ///
    /// Returns the pruned epoch numbers.
    pub fn prune_epochs(
        &self,
        chain_id: u64,
        keep_from: u64,
        tx: Option<&mut StoreTx>,
    ) -> Result<Vec<u64>, StoreError> {
        let mut kv = self.kv.write();
        let markers = tx::scan(&**kv, tx.as_deref(), &keys::epochs_prefix(chain_id))?;

        let mut pruned = Vec::new();
        let mut operations = Vec::new();
        for (marker, _) in markers {
            let Some(epoch) = keys::epoch_from_marker(&marker) else {
                continue;
            };
            if epoch >= keep_from {
                continue;
            }
            for prefix in [
                keys::votes_in_epoch(chain_id, epoch),
                keys::batch_index_in_epoch(chain_id, epoch),
            ] {
                operations.extend(
                    tx::scan(&**kv, tx.as_deref(), &prefix)?
                        .into_iter()
                        .map(|(k, _)| BatchOperation::delete(k)),
                );
            }
            operations.push(BatchOperation::delete(marker));
            pruned.push(epoch);
        }

        tx::write(&mut **kv, tx, operations)?;
        if !pruned.is_empty() {
            debug!(chain_id, ?pruned, "[qc-15] Pruned epoch ledgers");
        }
        Ok(pruned)
    }
}

impl std::fmt::Debug for VoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteStore").finish_non_exhaustive()
    }
}
