//! Write transaction over the key-value port.

use std::collections::BTreeMap;

use crate::ports::outbound::{BatchOperation, KeyValueStore};
use crate::domain::KVStoreError;

/// Buffered writes applied atomically on commit.
///
/// Reads made through a transaction see its own staged writes.
#[derive(Debug, Default)]
pub struct StoreTx {
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StoreTx {
    /// Empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged keys.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub(crate) fn stage(&mut self, operations: Vec<BatchOperation>) {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.staged.insert(key, Some(value));
                }
                BatchOperation::Delete { key } => {
                    self.staged.insert(key, None);
                }
            }
        }
    }

    /// `Some(Some(v))` staged put, `Some(None)` staged delete, `None` untouched.
    pub(crate) fn lookup(&self, key: &[u8]) -> Option<Option<&Vec<u8>>> {
        self.staged.get(key).map(Option::as_ref)
    }

    pub(crate) fn staged_with_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a Option<Vec<u8>>)> + 'a {
        self.staged
            .range(prefix.to_vec()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    pub(crate) fn into_operations(self) -> Vec<BatchOperation> {
        self.staged
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOperation::Put { key, value },
                None => BatchOperation::Delete { key },
            })
            .collect()
    }
}

/// Read `key` through an optional transaction.
pub(crate) fn read(
    kv: &dyn KeyValueStore,
    tx: Option<&StoreTx>,
    key: &[u8],
) -> Result<Option<Vec<u8>>, KVStoreError> {
    if let Some(staged) = tx.and_then(|tx| tx.lookup(key)) {
        return Ok(staged.cloned());
    }
    kv.get(key)
}

/// Prefix scan through an optional transaction, in key order.
pub(crate) fn scan(
    kv: &dyn KeyValueStore,
    tx: Option<&StoreTx>,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
    let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = kv.prefix_scan(prefix)?.into_iter().collect();
    if let Some(tx) = tx {
        for (key, value) in tx.staged_with_prefix(prefix) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
    }
    Ok(merged.into_iter().collect())
}

/// Write through an optional transaction; without one the write commits immediately.
pub(crate) fn write(
    kv: &mut dyn KeyValueStore,
    tx: Option<&mut StoreTx>,
    operations: Vec<BatchOperation>,
) -> Result<(), KVStoreError> {
    if operations.is_empty() {
        return Ok(());
    }
    match tx {
        Some(tx) => {
            tx.stage(operations);
            Ok(())
        }
        None => kv.atomic_batch_write(operations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;

    #[test]
    fn test_reads_see_staged_writes() {
        let mut kv = InMemoryKVStore::new();
        kv.put(b"a", b"committed").unwrap();

        let mut tx = StoreTx::new();
        write(&mut kv, Some(&mut tx), vec![BatchOperation::put(b"b", b"staged")]).unwrap();
        write(&mut kv, Some(&mut tx), vec![BatchOperation::delete(b"a")]).unwrap();

        assert_eq!(read(&kv, Some(&tx), b"b").unwrap(), Some(b"staged".to_vec()));
        assert_eq!(read(&kv, Some(&tx), b"a").unwrap(), None);
        assert_eq!(read(&kv, None, b"a").unwrap(), Some(b"committed".to_vec()));
        assert!(!kv.exists(b"b").unwrap());
    }

    #[test]
    fn test_scan_merges_overlay() {
        let mut kv = InMemoryKVStore::new();
        kv.put(b"p1", b"x").unwrap();
        kv.put(b"p2", b"y").unwrap();

        let mut tx = StoreTx::new();
        tx.stage(vec![
            BatchOperation::delete(b"p1"),
            BatchOperation::put(b"p3", b"z"),
            BatchOperation::put(b"q1", b"other"),
        ]);

        let keys: Vec<_> = scan(&kv, Some(&tx), b"p")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"p2".to_vec(), b"p3".to_vec()]);
    }

    #[test]
    fn test_commit_applies_operations() {
        let mut kv = InMemoryKVStore::new();
        let mut tx = StoreTx::new();
        tx.stage(vec![BatchOperation::put(b"k", b"v")]);
        assert_eq!(tx.len(), 1);

        kv.atomic_batch_write(tx.into_operations()).unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
