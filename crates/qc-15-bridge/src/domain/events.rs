//! # Bridge Event Logs
//!
//! Topic table and codec for the four contract events the bridge reacts to.
//!
//! | Event | Indexed topics | Data words |
//! |-------|----------------|------------|
//! | `BridgeMsg` | id, source, destination | sender, receiver, bytes |
//! | `BridgeMessageResult` | counter, status | source, destination, bytes |
//! | `BridgeBatchResult` | none | source, destination, start, end |
//! | `NewBatch` | id | none |
//!
//! Layout follows the contract log convention: 32-byte big-endian words,
//! addresses right-aligned, dynamic `bytes` as offset + length + padded body.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::entities::{
    BridgeBatchResultEvent, BridgeMessageEvent, BridgeMessageResultEvent, NewBatchEvent,
};
use super::errors::DecodeError;
use super::value_objects::{keccak256, Address, Hash};

const WORD: usize = 32;

/// A confirmed contract log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Topic 0 is the event signature hash.
    pub topics: Vec<Hash>,
    /// Non-indexed payload.
    pub data: Vec<u8>,
    /// Block the log was included in.
    pub block_number: u64,
}

/// Contract address → topics of interest.
pub type LogFilters = BTreeMap<Address, Vec<Hash>>;

/// Bridge event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A message was emitted.
    BridgeMessage,
    /// A message was executed.
    BridgeMessageResult,
    /// A batch was executed.
    BridgeBatchResult,
    /// A batch was committed to bridge storage.
    NewBatch,
}

impl EventKind {
    /// Every kind.
    pub const ALL: [EventKind; 4] = [
        EventKind::BridgeMessage,
        EventKind::BridgeMessageResult,
        EventKind::BridgeBatchResult,
        EventKind::NewBatch,
    ];

    /// Canonical event signature.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::BridgeMessage => "BridgeMsg(uint256,uint256,uint256,address,address,bytes)",
            EventKind::BridgeMessageResult => {
                "BridgeMessageResult(uint256,bool,uint256,uint256,bytes)"
            }
            EventKind::BridgeBatchResult => "BridgeBatchResult(uint256,uint256,uint256,uint256)",
            EventKind::NewBatch => "NewBatch(uint256)",
        }
    }
}

/// Immutable event-kind ↔ topic table, built once per manager.
#[derive(Clone, Debug)]
pub struct EventTopics {
    by_kind: HashMap<EventKind, Hash>,
    by_topic: HashMap<Hash, EventKind>,
}

impl EventTopics {
    /// Compute topics from the canonical signatures.
    pub fn new() -> Self {
        let mut by_kind = HashMap::with_capacity(EventKind::ALL.len());
        let mut by_topic = HashMap::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let topic = keccak256(kind.signature().as_bytes());
            by_kind.insert(kind, topic);
            by_topic.insert(topic, kind);
        }
        Self { by_kind, by_topic }
    }

    /// Topic for a kind.
    pub fn topic(&self, kind: EventKind) -> Hash {
        self.by_kind
            .get(&kind)
            .copied()
            .unwrap_or_else(|| keccak256(kind.signature().as_bytes()))
    }

    /// Kind for a topic.
    pub fn kind_of(&self, topic: &Hash) -> Option<EventKind> {
        self.by_topic.get(topic).copied()
    }

    /// Topics for several kinds.
    pub fn topics(&self, kinds: &[EventKind]) -> Vec<Hash> {
        kinds.iter().map(|kind| self.topic(*kind)).collect()
    }

    /// Decode a message log.
    pub fn decode_message(&self, log: &Log) -> Result<BridgeMessageEvent, DecodeError> {
        expect_topics(log, 4)?;
        Ok(BridgeMessageEvent {
            id: word_to_u64(&log.topics[1], "id")?,
            source_chain_id: word_to_u64(&log.topics[2], "sourceChainId")?,
            destination_chain_id: word_to_u64(&log.topics[3], "destinationChainId")?,
            sender: word_to_address(read_word(&log.data, 0)?)?,
            receiver: word_to_address(read_word(&log.data, 1)?)?,
            data: read_bytes(&log.data, 2)?,
        })
    }

    /// Decode a message-result log.
    pub fn decode_message_result(
        &self,
        log: &Log,
    ) -> Result<BridgeMessageResultEvent, DecodeError> {
        expect_topics(log, 3)?;
        Ok(BridgeMessageResultEvent {
            counter: word_to_u64(&log.topics[1], "counter")?,
            status: word_to_bool(&log.topics[2])?,
            source_chain_id: word_to_u64(read_word(&log.data, 0)?, "sourceChainId")?,
            destination_chain_id: word_to_u64(read_word(&log.data, 1)?, "destinationChainId")?,
            message: read_bytes(&log.data, 2)?,
        })
    }

    /// Decode a batch-result log.
    pub fn decode_batch_result(&self, log: &Log) -> Result<BridgeBatchResultEvent, DecodeError> {
        expect_topics(log, 1)?;
        Ok(BridgeBatchResultEvent {
            source_chain_id: word_to_u64(read_word(&log.data, 0)?, "sourceChainId")?,
            destination_chain_id: word_to_u64(read_word(&log.data, 1)?, "destinationChainId")?,
            start_id: word_to_u64(read_word(&log.data, 2)?, "startId")?,
            end_id: word_to_u64(read_word(&log.data, 3)?, "endId")?,
        })
    }

    /// Decode a new-batch log.
    pub fn decode_new_batch(&self, log: &Log) -> Result<NewBatchEvent, DecodeError> {
        expect_topics(log, 2)?;
        Ok(NewBatchEvent {
            batch_id: word_to_u64(&log.topics[1], "id")?,
        })
    }

    /// Encode a message log emitted by `contract`.
    pub fn encode_message(&self, contract: Address, event: &BridgeMessageEvent) -> Log {
        let mut data = Vec::with_capacity(WORD * 5 + event.data.len());
        data.extend_from_slice(&address_word(&event.sender));
        data.extend_from_slice(&address_word(&event.receiver));
        append_bytes(&mut data, 3, &event.data);
        Log {
            address: contract,
            topics: vec![
                self.topic(EventKind::BridgeMessage),
                u64_word(event.id),
                u64_word(event.source_chain_id),
                u64_word(event.destination_chain_id),
            ],
            data,
            block_number: 0,
        }
    }

    /// Encode a message-result log emitted by `contract`.
    pub fn encode_message_result(&self, contract: Address, event: &BridgeMessageResultEvent) -> Log {
        let mut data = Vec::with_capacity(WORD * 5 + event.message.len());
        data.extend_from_slice(&u64_word(event.source_chain_id));
        data.extend_from_slice(&u64_word(event.destination_chain_id));
        append_bytes(&mut data, 3, &event.message);
        Log {
            address: contract,
            topics: vec![
                self.topic(EventKind::BridgeMessageResult),
                u64_word(event.counter),
                u64_word(u64::from(event.status)),
            ],
            data,
            block_number: 0,
        }
    }

    /// Encode a batch-result log emitted by `contract`.
    pub fn encode_batch_result(&self, contract: Address, event: &BridgeBatchResultEvent) -> Log {
        let mut data = Vec::with_capacity(WORD * 4);
        for value in [
            event.source_chain_id,
            event.destination_chain_id,
            event.start_id,
            event.end_id,
        ] {
            data.extend_from_slice(&u64_word(value));
        }
        Log {
            address: contract,
            topics: vec![self.topic(EventKind::BridgeBatchResult)],
            data,
            block_number: 0,
        }
    }

    /// Encode a new-batch log emitted by `contract`.
    pub fn encode_new_batch(&self, contract: Address, event: &NewBatchEvent) -> Log {
        Log {
            address: contract,
            topics: vec![self.topic(EventKind::NewBatch), u64_word(event.batch_id)],
            data: Vec::new(),
            block_number: 0,
        }
    }
}

impl Default for EventTopics {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_topics(log: &Log, expected: usize) -> Result<(), DecodeError> {
    if log.topics.len() != expected {
        return Err(DecodeError::TopicCount {
            expected,
            got: log.topics.len(),
        });
    }
    Ok(())
}

fn read_word(data: &[u8], index: usize) -> Result<&[u8; WORD], DecodeError> {
    let start = index * WORD;
    data.get(start..start + WORD)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(DecodeError::ShortData {
            need: start + WORD,
            got: data.len(),
        })
}

fn read_bytes(data: &[u8], head_index: usize) -> Result<Vec<u8>, DecodeError> {
    let offset = word_to_usize(read_word(data, head_index)?, "offset")?;
    if offset % WORD != 0 {
        return Err(DecodeError::WordOverflow("offset"));
    }
    let len = word_to_usize(read_word(data, offset / WORD)?, "length")?;
    let body_start = offset + WORD;
    let body_end = body_start
        .checked_add(len)
        .ok_or(DecodeError::WordOverflow("length"))?;
    data.get(body_start..body_end)
        .map(<[u8]>::to_vec)
        .ok_or(DecodeError::ShortData {
            need: body_end,
            got: data.len(),
        })
}

fn word_to_u64(word: &[u8; WORD], field: &'static str) -> Result<u64, DecodeError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(DecodeError::WordOverflow(field));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(raw))
}

fn word_to_usize(word: &[u8; WORD], field: &'static str) -> Result<usize, DecodeError> {
    let value = word_to_u64(word, field)?;
    usize::try_from(value).map_err(|_| DecodeError::WordOverflow(field))
}

fn word_to_bool(word: &[u8; WORD]) -> Result<bool, DecodeError> {
    match word_to_u64(word, "bool") {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        _ => Err(DecodeError::InvalidBool),
    }
}

fn word_to_address(word: &[u8; WORD]) -> Result<Address, DecodeError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::InvalidAddress(format!("0x{}", hex::encode(word))));
    }
    let mut raw = [0u8; 20];
    raw.copy_from_slice(&word[12..]);
    Ok(Address(raw))
}

fn u64_word(value: u64) -> Hash {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> Hash {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Append the offset word for a trailing `bytes` field followed by its body.
fn append_bytes(data: &mut Vec<u8>, head_words: usize, body: &[u8]) {
    data.extend_from_slice(&u64_word((head_words * WORD) as u64));
    data.extend_from_slice(&u64_word(body.len() as u64));
    data.extend_from_slice(body);
    let padding = (WORD - body.len() % WORD) % WORD;
    data.extend(std::iter::repeat(0u8).take(padding));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> BridgeMessageEvent {
        BridgeMessageEvent {
            id: 12,
            source_chain_id: 2,
            destination_chain_id: 1,
            sender: Address([0x11; 20]),
            receiver: Address([0x22; 20]),
            data: b"payload longer than one word, spanning two".to_vec(),
        }
    }

    #[test]
    fn test_topics_are_distinct_and_resolvable() {
        let topics = EventTopics::new();
        for kind in EventKind::ALL {
            assert_eq!(topics.kind_of(&topics.topic(kind)), Some(kind));
        }
        assert_eq!(topics.kind_of(&[0u8; 32]), None);
    }

    #[test]
    fn test_message_log_decodes() {
        let topics = EventTopics::new();
        let log = topics.encode_message(Address([9; 20]), &message());
        assert_eq!(log.data.len() % WORD, 0);
        assert_eq!(topics.decode_message(&log).unwrap(), message());
    }

    #[test]
    fn test_truncated_message_log_is_decode_error() {
        let topics = EventTopics::new();
        let mut log = topics.encode_message(Address([9; 20]), &message());
        log.data.truncate(WORD * 3);
        assert!(matches!(
            topics.decode_message(&log),
            Err(DecodeError::ShortData { .. })
        ));
    }

    #[test]
    fn test_message_result_status_word() {
        let topics = EventTopics::new();
        let event = BridgeMessageResultEvent {
            counter: 3,
            status: true,
            source_chain_id: 2,
            destination_chain_id: 1,
            message: Vec::new(),
        };
        let mut log = topics.encode_message_result(Address::ZERO, &event);
        assert_eq!(topics.decode_message_result(&log).unwrap(), event);

        log.topics[2] = u64_word(2);
        assert_eq!(
            topics.decode_message_result(&log),
            Err(DecodeError::InvalidBool)
        );
    }

    #[test]
    fn test_batch_result_and_new_batch() {
        let topics = EventTopics::new();
        let result = BridgeBatchResultEvent {
            source_chain_id: 1,
            destination_chain_id: 2,
            start_id: 5,
            end_id: 9,
        };
        let log = topics.encode_batch_result(Address::ZERO, &result);
        assert_eq!(topics.decode_batch_result(&log).unwrap(), result);

        let log = topics.encode_new_batch(Address::ZERO, &NewBatchEvent { batch_id: 4 });
        assert_eq!(topics.decode_new_batch(&log).unwrap().batch_id, 4);
    }

    #[test]
    fn test_oversized_word_rejected() {
        let topics = EventTopics::new();
        let mut log = topics.encode_new_batch(Address::ZERO, &NewBatchEvent { batch_id: 1 });
        log.topics[1] = [0xff; 32];
        assert_eq!(
            topics.decode_new_batch(&log),
            Err(DecodeError::WordOverflow("id"))
        );
    }
}
