//! # RocksDB Storage Adapter
//!
//! Durable [`KeyValueStore`] for the bridge ledger.
//!
//! All bridge keys live in the `bridge` column family so the ledger can
//! share a database directory with other subsystems. Prefix scans run on
//! the sorted keyspace, which is what epoch pruning relies on.

use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;

use crate::domain::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};

/// Column family holding bridge keys.
pub const CF_BRIDGE: &str = "bridge";

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/bridge".to_string(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Small buffers, no fsync.
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create the database.
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let mut cf_opts = Options::default();
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
        let descriptors = vec![ColumnFamilyDescriptor::new(CF_BRIDGE, cf_opts)];

        let db = DB::open_cf_descriptors(&opts, &config.path, descriptors).map_err(|e| {
            KVStoreError::IOError {
                message: format!("Failed to open RocksDB: {}", e),
            }
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_opts(&self) -> rocksdb::WriteOptions {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

fn io_error(op: &str, e: rocksdb::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: format!("RocksDB {} failed: {}", op, e),
    }
}

fn missing_cf() -> KVStoreError {
    KVStoreError::IOError {
        message: format!("Column family {} missing", CF_BRIDGE),
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let db = self.db.read();
        let cf = db.cf_handle(CF_BRIDGE).ok_or_else(missing_cf)?;
        db.get_cf(cf, key).map_err(|e| io_error("get", e))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let write_opts = self.write_opts();
        let db = self.db.write();
        let cf = db.cf_handle(CF_BRIDGE).ok_or_else(missing_cf)?;
        db.put_cf_opt(cf, key, value, &write_opts)
            .map_err(|e| io_error("put", e))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        let write_opts = self.write_opts();
        let db = self.db.write();
        let cf = db.cf_handle(CF_BRIDGE).ok_or_else(missing_cf)?;
        db.delete_cf_opt(cf, key, &write_opts)
            .map_err(|e| io_error("delete", e))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let write_opts = self.write_opts();
        let db = self.db.write();
        let cf = db.cf_handle(CF_BRIDGE).ok_or_else(missing_cf)?;

        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put_cf(cf, &key, &value),
                BatchOperation::Delete { key } => batch.delete_cf(cf, &key),
            }
        }

        db.write_opt(batch, &write_opts)
            .map_err(|e| io_error("batch write", e))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let db = self.db.read();
        let cf = db.cf_handle(CF_BRIDGE).ok_or_else(missing_cf)?;

        let mut results = Vec::new();
        for item in db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| io_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BridgeMessageEvent, Address};
    use crate::store::VoteStore;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RocksDbStore {
        let config = RocksDbConfig::for_testing(dir.path().to_string_lossy().to_string());
        RocksDbStore::open(config).unwrap()
    }

    #[test]
    fn test_rocksdb_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        store.put(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert!(store.exists(b"key1").unwrap());

        store.delete(b"key1").unwrap();
        assert!(!store.exists(b"key1").unwrap());
    }

    #[test]
    fn test_rocksdb_prefix_scan_stops_at_prefix_end() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"vt:0001", b"a"),
                BatchOperation::put(b"vt:0002", b"b"),
                BatchOperation::put(b"vu:0001", b"c"),
            ])
            .unwrap();

        assert_eq!(store.prefix_scan(b"vt:").unwrap().len(), 2);
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let event = BridgeMessageEvent {
            id: 1,
            source_chain_id: 2,
            destination_chain_id: 1,
            sender: Address([1; 20]),
            receiver: Address([2; 20]),
            data: vec![7],
        };

        {
            let ledger = VoteStore::new(Box::new(open(&temp_dir)));
            ledger.insert_epoch(5, 2, None).unwrap();
            ledger.insert_bridge_message_event(&event, None).unwrap();
        }

        let ledger = VoteStore::new(Box::new(open(&temp_dir)));
        assert_eq!(ledger.list_epochs(2).unwrap(), vec![5]);
        let run = ledger
            .get_bridge_message_events_for_bridge_batch(1, 1, None, 2, 1)
            .unwrap();
        assert_eq!(run.into_events(), vec![event]);
    }
}
