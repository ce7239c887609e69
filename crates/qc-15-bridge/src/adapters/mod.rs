//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports.

mod chain;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocksdb_store;
mod runtime;
mod tracker;
mod transport;

pub use chain::{InMemoryChain, StaticClientFactory, StaticExternalClient};
pub use memory::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::{RocksDbConfig, RocksDbStore, CF_BRIDGE};
pub use runtime::StaticRuntime;
pub use tracker::RecordingEventTracker;
pub use transport::{InMemoryTopic, DEFAULT_TOPIC_CAPACITY};
