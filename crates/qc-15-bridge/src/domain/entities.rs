//! # Domain Entities
//!
//! Bridge messages, batches and votes.
//!
//! ## Lifecycle
//!
//! ```text
//! BridgeMessageEvent ──(batch builder)──> PendingBridgeBatch
//!        │                                      │ signed by validators
//!        │                                      ▼
//!        │                              BridgeBatchVote (gossip)
//!        │                                      │ quorum
//!        ▼                                      ▼
//!  deleted on result                    BridgeBatchSigned (submission)
//! ```

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use super::bitmap::Bitmap;
use super::value_objects::{keccak256, keccak256_concat, Address, Hash};

/// One cross-chain message awaiting batching.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessageEvent {
    /// Per-source-chain sequence number.
    pub id: u64,
    /// Chain the message was emitted on.
    pub source_chain_id: u64,
    /// Chain the message must be executed on.
    pub destination_chain_id: u64,
    /// Emitting account.
    pub sender: Address,
    /// Target account.
    pub receiver: Address,
    /// Opaque payload.
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

impl BridgeMessageEvent {
    /// Canonical byte encoding used for the leaf hash.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + 40 + 8 + self.data.len());
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.source_chain_id.to_be_bytes());
        out.extend_from_slice(&self.destination_chain_id.to_be_bytes());
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(self.receiver.as_bytes());
        out.extend_from_slice(&(self.data.len() as u64).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Leaf hash of this message.
    pub fn leaf_hash(&self) -> Hash {
        keccak256(&self.canonical_bytes())
    }
}

/// Execution outcome of a single message on its destination chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeMessageResultEvent {
    /// ID of the executed message.
    pub counter: u64,
    /// Whether execution succeeded.
    pub status: bool,
    /// Chain the message was emitted on.
    pub source_chain_id: u64,
    /// Chain the message was executed on.
    pub destination_chain_id: u64,
    /// Return data.
    pub message: Vec<u8>,
}

/// Execution confirmation for a whole batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeBatchResultEvent {
    /// Source chain of the batch.
    pub source_chain_id: u64,
    /// Destination chain of the batch.
    pub destination_chain_id: u64,
    /// First message ID.
    pub start_id: u64,
    /// Last message ID.
    pub end_id: u64,
}

/// A batch was committed to bridge storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewBatchEvent {
    /// Sequence number of the committed batch.
    pub batch_id: u64,
}

/// Canonical, hashable batch of messages.
///
/// `threshold` and `is_rollback` are part of the hash, so turning a batch
/// into its rollback changes what validators sign.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeBatch {
    /// Content hash of the contained messages.
    #[serde_as(as = "Base64")]
    pub root_hash: Hash,
    /// First message ID, inclusive.
    pub start_id: u64,
    /// Last message ID, inclusive.
    pub end_id: u64,
    /// Chain the messages were emitted on.
    pub source_chain_id: u64,
    /// Chain the batch executes on.
    pub destination_chain_id: u64,
    /// Destination-side block by which the batch must execute.
    pub threshold: u64,
    /// Whether this batch voids an expired one.
    pub is_rollback: bool,
}

impl BridgeBatch {
    /// Hash validators sign.
    pub fn hash(&self) -> Hash {
        keccak256_concat(&[
            &self.root_hash,
            &self.start_id.to_be_bytes(),
            &self.end_id.to_be_bytes(),
            &self.source_chain_id.to_be_bytes(),
            &self.destination_chain_id.to_be_bytes(),
            &self.threshold.to_be_bytes(),
            &[u8::from(self.is_rollback)],
        ])
    }

    /// Number of messages covered.
    pub fn len(&self) -> u64 {
        self.end_id.saturating_sub(self.start_id) + 1
    }

    /// Always false; a batch covers at least one message.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether a result event confirms exactly this batch.
    pub fn matches_result(&self, result: &BridgeBatchResultEvent) -> bool {
        self.source_chain_id == result.source_chain_id
            && self.destination_chain_id == result.destination_chain_id
            && self.start_id == result.start_id
            && self.end_id == result.end_id
    }
}

/// A batch under voting, tagged with the epoch that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBridgeBatch {
    /// Epoch whose validator set signs the batch.
    pub epoch: u64,
    /// The batch itself.
    pub batch: BridgeBatch,
}

impl PendingBridgeBatch {
    /// Hash of the embedded batch.
    pub fn hash(&self) -> Hash {
        self.batch.hash()
    }

    /// Deadline block on the destination side.
    pub fn threshold(&self) -> u64 {
        self.batch.threshold
    }

    /// Whether this is a rollback batch.
    pub fn is_rollback(&self) -> bool {
        self.batch.is_rollback
    }

    /// Flag as rollback under `epoch`.
    pub fn into_rollback(mut self, epoch: u64) -> Self {
        self.batch.is_rollback = true;
        self.epoch = epoch;
        self
    }
}

/// Vote gossiped between validators.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeBatchVote {
    /// Hash of the voted batch.
    #[serde_as(as = "Base64")]
    pub hash: Hash,
    /// Sender address, `0x`-prefixed hex.
    pub sender: String,
    /// Compressed BLS signature.
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
    /// Epoch the vote was cast in.
    #[serde(rename = "epochNumber")]
    pub epoch_number: u64,
    /// Source chain of the batch.
    #[serde(rename = "sourceChainID")]
    pub source_chain_id: u64,
    /// Destination chain of the batch.
    #[serde(rename = "destinationChainID")]
    pub destination_chain_id: u64,
}

/// A persisted vote.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteConsensusData {
    /// Sender address, `0x`-prefixed hex.
    pub sender: String,
    /// Compressed BLS signature.
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
}

/// Aggregated signature and the participants it covers.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSignature {
    /// Aggregated BLS signature.
    #[serde_as(as = "Base64")]
    pub aggregated_signature: Vec<u8>,
    /// Participants by validator-set index.
    pub bitmap: Bitmap,
}

/// Quorum-certified batch ready for submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeBatchSigned {
    /// The certified batch.
    pub batch: BridgeBatch,
    /// Its aggregated signature.
    pub signature: AggregatedSignature,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> BridgeBatch {
        BridgeBatch {
            root_hash: [7u8; 32],
            start_id: 1,
            end_id: 5,
            source_chain_id: 2,
            destination_chain_id: 1,
            threshold: 110,
            is_rollback: false,
        }
    }

    #[test]
    fn test_rollback_flag_changes_hash() {
        let pending = PendingBridgeBatch {
            epoch: 1,
            batch: batch(),
        };
        let rolled = pending.clone().into_rollback(3);

        assert_ne!(pending.hash(), rolled.hash());
        assert_eq!(rolled.epoch, 3);
        assert!(rolled.is_rollback());
    }

    #[test]
    fn test_threshold_changes_hash() {
        let mut other = batch();
        other.threshold += 10;
        assert_ne!(batch().hash(), other.hash());
    }

    #[test]
    fn test_vote_wire_field_names() {
        let vote = BridgeBatchVote {
            hash: [1u8; 32],
            sender: "0x01".into(),
            signature: vec![9, 9],
            epoch_number: 4,
            source_chain_id: 2,
            destination_chain_id: 1,
        };
        let json = serde_json::to_value(&vote).unwrap();
        for field in [
            "hash",
            "sender",
            "signature",
            "epochNumber",
            "sourceChainID",
            "destinationChainID",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        let decoded: BridgeBatchVote = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, vote);
    }

    #[test]
    fn test_batch_matches_result_by_range_and_route() {
        let result = BridgeBatchResultEvent {
            source_chain_id: 2,
            destination_chain_id: 1,
            start_id: 1,
            end_id: 5,
        };
        assert!(batch().matches_result(&result));
        assert!(!batch().matches_result(&BridgeBatchResultEvent {
            end_id: 6,
            ..result
        }));
    }
}
