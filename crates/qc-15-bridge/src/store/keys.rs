//! Key layout.
//!
//! ```text
//! ep | chain | epoch                         -> epoch marker
//! vt | chain | epoch | batch hash | sender   -> VoteConsensusData
//! bi | chain | epoch | batch hash            -> BatchIndexEntry
//! ev | source | destination | id             -> BridgeMessageEvent
//! ```
//!
//! Integers are big-endian so prefix scans return them in numeric order.

use crate::domain::Hash;

const EPOCH: &[u8] = b"ep";
const VOTE: &[u8] = b"vt";
const BATCH_INDEX: &[u8] = b"bi";
const EVENT: &[u8] = b"ev";

fn key(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

pub(crate) fn epochs_prefix(chain_id: u64) -> Vec<u8> {
    key(&[EPOCH, &chain_id.to_be_bytes()])
}

pub(crate) fn epoch(chain_id: u64, epoch: u64) -> Vec<u8> {
    key(&[EPOCH, &chain_id.to_be_bytes(), &epoch.to_be_bytes()])
}

/// Epoch number from an epoch marker key.
pub(crate) fn epoch_from_marker(marker: &[u8]) -> Option<u64> {
    let tail = marker.get(EPOCH.len() + 8..EPOCH.len() + 16)?;
    Some(u64::from_be_bytes(tail.try_into().ok()?))
}

pub(crate) fn votes_in_epoch(chain_id: u64, epoch: u64) -> Vec<u8> {
    key(&[VOTE, &chain_id.to_be_bytes(), &epoch.to_be_bytes()])
}

pub(crate) fn votes_for_hash(chain_id: u64, epoch: u64, hash: &Hash) -> Vec<u8> {
    key(&[VOTE, &chain_id.to_be_bytes(), &epoch.to_be_bytes(), hash])
}

pub(crate) fn vote(chain_id: u64, epoch: u64, hash: &Hash, sender: &str) -> Vec<u8> {
    key(&[
        VOTE,
        &chain_id.to_be_bytes(),
        &epoch.to_be_bytes(),
        hash,
        sender.as_bytes(),
    ])
}

pub(crate) fn batch_index_prefix(chain_id: u64) -> Vec<u8> {
    key(&[BATCH_INDEX, &chain_id.to_be_bytes()])
}

pub(crate) fn batch_index_in_epoch(chain_id: u64, epoch: u64) -> Vec<u8> {
    key(&[BATCH_INDEX, &chain_id.to_be_bytes(), &epoch.to_be_bytes()])
}

pub(crate) fn batch_index(chain_id: u64, epoch: u64, hash: &Hash) -> Vec<u8> {
    key(&[BATCH_INDEX, &chain_id.to_be_bytes(), &epoch.to_be_bytes(), hash])
}

/// `(epoch, hash)` from a batch index key.
pub(crate) fn parse_batch_index(raw: &[u8]) -> Option<(u64, Hash)> {
    let body = raw.get(BATCH_INDEX.len() + 8..)?;
    if body.len() != 8 + 32 {
        return None;
    }
    let epoch = u64::from_be_bytes(body[..8].try_into().ok()?);
    let hash: Hash = body[8..].try_into().ok()?;
    Some((epoch, hash))
}

pub(crate) fn event(source_chain_id: u64, destination_chain_id: u64, id: u64) -> Vec<u8> {
    key(&[
        EVENT,
        &source_chain_id.to_be_bytes(),
        &destination_chain_id.to_be_bytes(),
        &id.to_be_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_marker_round_trip() {
        assert_eq!(epoch_from_marker(&epoch(7, 42)), Some(42));
        assert_eq!(epoch_from_marker(b"ep"), None);
    }

    #[test]
    fn test_batch_index_key_parses() {
        let raw = batch_index(3, 9, &[5u8; 32]);
        assert_eq!(parse_batch_index(&raw), Some((9, [5u8; 32])));
        assert!(raw.starts_with(&batch_index_prefix(3)));
    }

    #[test]
    fn test_numeric_ordering_of_event_keys() {
        assert!(event(1, 2, 9) < event(1, 2, 10));
        assert!(event(1, 2, 255) < event(1, 2, 256));
    }

    #[test]
    fn test_vote_keys_nest_under_hash_prefix() {
        let hash = [1u8; 32];
        assert!(vote(1, 2, &hash, "0xabc").starts_with(&votes_for_hash(1, 2, &hash)));
        assert!(votes_for_hash(1, 2, &hash).starts_with(&votes_in_epoch(1, 2)));
    }
}
