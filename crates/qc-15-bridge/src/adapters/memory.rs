//! In-memory key-value store.
//!
//! Ordered map backend for tests and ephemeral nodes. Production uses
//! `RocksDbStore` (feature `rocksdb`).

use std::collections::BTreeMap;

use crate::domain::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};

/// Ordered in-memory key-value store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scan_is_ordered_and_bounded() {
        let mut store = InMemoryKVStore::new();
        store.put(b"ev:03", b"c").unwrap();
        store.put(b"ev:01", b"a").unwrap();
        store.put(b"ew:00", b"x").unwrap();
        store.put(b"ev:02", b"b").unwrap();

        let values: Vec<_> = store
            .prefix_scan(b"ev:")
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_batch_write_mixes_puts_and_deletes() {
        let mut store = InMemoryKVStore::new();
        store.put(b"gone", b"1").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"kept", b"2"),
                BatchOperation::delete(b"gone"),
            ])
            .unwrap();
        assert!(store.exists(b"kept").unwrap());
        assert!(!store.exists(b"gone").unwrap());
        assert_eq!(store.len(), 1);
    }
}
