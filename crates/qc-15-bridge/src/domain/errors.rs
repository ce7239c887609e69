//! # Domain Errors
//!
//! Error types for the bridge subsystem, one enum per concern with
//! `From` conversions into the top-level [`BridgeError`].

use thiserror::Error;

use super::value_objects::Hash;

/// Raw key-value store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KVStoreError {
    /// Underlying engine I/O failure.
    #[error("I/O error: {message}")]
    IOError {
        /// Engine message
        message: String,
    },

    /// The store has been closed.
    #[error("Store closed")]
    Closed,
}

/// Vote store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No ledger exists for this epoch and chain.
    #[error("Epoch {epoch} not found for chain {chain_id}")]
    EpochNotFound {
        /// Requested epoch
        epoch: u64,
        /// Chain the ledger is scoped to
        chain_id: u64,
    },

    /// Stored record could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key-value layer failure.
    #[error(transparent)]
    KeyValue(#[from] KVStoreError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Log or address decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Log carries the wrong number of topics for its event.
    #[error("Expected {expected} topics, got {got}")]
    TopicCount {
        /// Topics the event declares
        expected: usize,
        /// Topics present in the log
        got: usize,
    },

    /// Log data is shorter than the event layout needs.
    #[error("Log data too short: need {need} bytes, got {got}")]
    ShortData {
        /// Required length
        need: usize,
        /// Actual length
        got: usize,
    },

    /// A 32-byte word does not fit the target integer type.
    #[error("Word out of range for {0}")]
    WordOverflow(&'static str),

    /// A boolean word is neither 0 nor 1.
    #[error("Invalid boolean word")]
    InvalidBool,

    /// Malformed address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// BLS signature errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Secret key material rejected by the curve library.
    #[error("Invalid secret key material")]
    InvalidSecretKey,

    /// Public key bytes do not decode to a valid G2 point.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature bytes do not decode to a valid G1 point.
    #[error("Invalid signature encoding")]
    InvalidFormat,

    /// Signature does not verify against the key and message.
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Nothing to aggregate.
    #[error("Empty aggregation")]
    EmptyAggregation,

    /// Point addition failed during aggregation.
    #[error("Aggregation failed")]
    AggregationFailed,
}

/// Chain reader and external client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Endpoint could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// State read failed.
    #[error("State read failed: {0}")]
    StateRead(String),

    /// Committed batch not present in system state.
    #[error("Committed batch {0} not found")]
    BatchNotFound(u64),
}

/// Gossip transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Subscribing to the topic failed.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// Publishing to the topic failed.
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Event tracker errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// Tracker could not be started.
    #[error("Tracker start failed: {0}")]
    Start(String),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Why the value is rejected
        reason: String,
    },

    /// Environment variable could not be parsed.
    #[error("Invalid environment variable {name}: {value}")]
    InvalidEnv {
        /// Variable name
        name: String,
        /// Raw value
        value: String,
    },

    /// Configuration document could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Top-level bridge error.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Signers do not hold enough voting power yet.
    #[error("Quorum not reached")]
    QuorumNotReached,

    /// Log topic is not one of the bridge events.
    #[error("Unknown bridge event: topic 0x{}", hex::encode(topic))]
    UnknownBridgeEvent {
        /// First topic of the offending log
        topic: Hash,
    },

    /// Log has no topics at all.
    #[error("Log has no topics")]
    EmptyLog,

    /// Vote sender is not in the active validator set.
    #[error("Vote from unknown validator {0}")]
    UnknownValidator(String),

    /// Vote signature does not verify against the sender's key.
    #[error("Invalid vote signature from {0}")]
    InvalidVoteSignature(String),

    /// Log decoding failure.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Vote store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// BLS failure.
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    /// Chain read failure.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Tracker failure.
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// Configuration failure.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Wire message (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<KVStoreError> for BridgeError {
    fn from(err: KVStoreError) -> Self {
        BridgeError::Store(StoreError::KeyValue(err))
    }
}

impl BridgeError {
    /// Whether this is the transient "not enough voting power yet" outcome.
    pub fn is_quorum_not_reached(&self) -> bool {
        matches!(self, BridgeError::QuorumNotReached)
    }
}
