//! # QC-15 Cross-Chain Bridge
//!
//! Validator-side bridge between the internal chain and external chains.
//!
//! **Subsystem ID:** 15
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Move messages between chains under validator quorum:
//! - bundle pending messages into batches and sign them with BLS
//! - gossip and collect votes, aggregate once voting power suffices
//! - track committed batches and roll back the ones that miss their deadline
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | No double counting | Votes keyed by `(epoch, hash, sender)` |
//! | Domain separation | Every signed hash is mixed with `DOMAIN_BRIDGE` |
//! | Convergent batches | Every batch starts at the committed cursor |
//! | Epoch isolation | Pending state reset at every epoch boundary |
//! | Bounded storage | Old epoch ledgers pruned on transition |
//!
//! ## Module Structure
//!
//! ```text
//! qc-15-bridge/
//! ├── domain/     # Batches, votes, keys, quorum, log codec
//! ├── ports/      # Inbound capabilities, outbound dependencies
//! ├── store/      # Vote store over the key-value port
//! ├── service/    # BridgeEventManager
//! ├── bridge.rs   # Multi-bridge fan-out
//! ├── config.rs   # BridgeConfig, RuntimeConfig
//! └── adapters/   # In-memory and RocksDB implementations
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod store;

// Re-exports
pub use bridge::{Bridge, BridgeSet};
pub use config::{BridgeConfig, EventTrackerSettings, RuntimeConfig};
pub use domain::{
    Address, BridgeBatch, BridgeBatchSigned, BridgeBatchVote, BridgeError, BridgeMessageEvent,
    ChainPair, Direction, Hash, PendingBridgeBatch, QuorumRule, QuorumSchedule, ValidatorKey,
    ValidatorMetadata, ValidatorSet,
};
pub use ports::{
    BridgeBatchProvider, BridgeEventSubscriber, BridgeLifecycle, ExternalLogSink,
    PostBlockRequest, PostEpochRequest,
};
pub use service::{BridgeDeps, BridgeEventManager};
pub use store::{EventRun, StoreTx, VoteStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
