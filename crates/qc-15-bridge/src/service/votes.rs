//! Vote intake, publication and signature aggregation.

use std::collections::HashSet;
use tracing::{debug, trace, warn};

use super::BridgeEventManager;
use crate::domain::{
    aggregate_signatures, invariant_vote_epoch_window, verify_with_domain, Address,
    AggregatedSignature, Bitmap, BridgeBatchVote, BridgeError, PendingBridgeBatch, QuorumOracle,
    ValidatorSet, VoteConsensusData,
};
use crate::ports::outbound::TransportMessage;
use crate::store::StoreTx;

impl BridgeEventManager {
    /// Verify and persist a vote received from a peer.
    ///
    /// Votes are silently dropped when no validator set is known, when
    /// they are outside the current/next epoch window, or when their route
    /// does not belong to this bridge. A vote for the next epoch creates
    /// that epoch's ledger first.
    pub fn save_vote(&self, vote: &BridgeBatchVote) -> Result<(), BridgeError> {
        let (epoch, validator_set) = {
            let state = self.state.read();
            (state.epoch, state.validator_set.clone())
        };

        let Some(validator_set) = validator_set else {
            debug!("[qc-15] Vote ignored, validator set not yet known");
            return Ok(());
        };
        if !invariant_vote_epoch_window(epoch, vote.epoch_number) {
            debug!(
                current = epoch,
                vote_epoch = vote.epoch_number,
                "[qc-15] Vote ignored, epoch out of window"
            );
            return Ok(());
        }
        if self
            .chains
            .direction_of(vote.source_chain_id, vote.destination_chain_id)
            .is_none()
        {
            trace!(
                source = vote.source_chain_id,
                destination = vote.destination_chain_id,
                "[qc-15] Vote ignored, route belongs to another bridge"
            );
            return Ok(());
        }

        if vote.epoch_number == epoch.saturating_add(1) {
            self.deps
                .store
                .insert_epoch(vote.epoch_number, vote.source_chain_id, None)?;
        }

        let sender: Address = vote
            .sender
            .parse()
            .map_err(|_| BridgeError::UnknownValidator(vote.sender.clone()))?;
        let validator = validator_set
            .by_address(&sender)
            .ok_or_else(|| BridgeError::UnknownValidator(vote.sender.clone()))?;
        verify_with_domain(&vote.signature, &vote.hash, &validator.bls_key, self.domain)
            .map_err(|_| BridgeError::InvalidVoteSignature(vote.sender.clone()))?;

        let count = self.deps.store.insert_consensus_data(
            vote.epoch_number,
            &vote.hash,
            &VoteConsensusData {
                sender: sender.to_string(),
                signature: vote.signature.clone(),
            },
            None,
            vote.source_chain_id,
        )?;

        debug!(
            hash = %hex::encode(vote.hash),
            sender = %sender,
            epoch = vote.epoch_number,
            votes = count,
            "[qc-15] Bridge vote stored"
        );
        Ok(())
    }

    /// Sign `pending` as this node, persist the vote and index entry, and
    /// gossip it.
    pub(crate) fn sign_and_publish(
        &self,
        pending: &PendingBridgeBatch,
        mut tx: Option<&mut StoreTx>,
    ) -> Result<BridgeBatchVote, BridgeError> {
        let batch = &pending.batch;
        let hash = pending.hash();
        let sender = self.deps.key.address().to_string();
        let signature = self.deps.key.sign_with_domain(&hash, self.domain);

        self.deps.store.insert_consensus_data(
            pending.epoch,
            &hash,
            &VoteConsensusData {
                sender: sender.clone(),
                signature: signature.clone(),
            },
            tx.as_deref_mut(),
            batch.source_chain_id,
        )?;
        self.deps.store.insert_batch_index(
            pending.epoch,
            &hash,
            batch.source_chain_id,
            batch.destination_chain_id,
            (batch.start_id, batch.end_id),
            tx,
        )?;

        let vote = BridgeBatchVote {
            hash,
            sender,
            signature,
            epoch_number: pending.epoch,
            source_chain_id: batch.source_chain_id,
            destination_chain_id: batch.destination_chain_id,
        };
        let data = serde_json::to_vec(&vote)?;
        if let Err(e) = self.deps.topic.publish(TransportMessage { data }) {
            warn!(
                hash = %hex::encode(hash),
                error = %e,
                "[qc-15] Failed to gossip own vote"
            );
        }
        Ok(vote)
    }

    /// Aggregate stored votes for `pending` if they carry quorum at
    /// `block_number`.
    pub(crate) fn aggregate_signature(
        &self,
        block_number: u64,
        pending: &PendingBridgeBatch,
        validator_set: &ValidatorSet,
    ) -> Result<AggregatedSignature, BridgeError> {
        let hash = pending.hash();
        let votes = self.deps.store.get_message_votes(
            pending.epoch,
            &hash,
            pending.batch.source_chain_id,
        )?;

        let mut bitmap = Bitmap::new();
        let mut signers = HashSet::new();
        let mut signatures = Vec::with_capacity(votes.len());
        for vote in votes {
            let Ok(address) = vote.sender.parse::<Address>() else {
                continue;
            };
            let Some(index) = validator_set.index_of(&address) else {
                continue;
            };
            if !signers.insert(address) {
                continue;
            }
            bitmap.set(index);
            signatures.push(vote.signature);
        }

        if !validator_set.has_quorum(block_number, &signers) {
            return Err(BridgeError::QuorumNotReached);
        }

        Ok(AggregatedSignature {
            aggregated_signature: aggregate_signatures(&signatures)?,
            bitmap,
        })
    }
}
