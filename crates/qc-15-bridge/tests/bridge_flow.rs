//! # Bridge Flow Integration Tests
//!
//! Several validators, each with its own vote store, exchange votes over
//! one shared gossip topic:
//!
//! 1. External messages arrive through each validator's event tracker
//! 2. Every validator builds the same batch on the next block and gossips its vote
//! 3. Votes converge until the batch is quorum-certified everywhere
//! 4. Committed batches past their deadline are rolled back under quorum
//! 5. Epoch transitions discard in-flight batches

use std::sync::Arc;
use std::time::Duration;

use qc_15_bridge::adapters::{
    InMemoryChain, InMemoryKVStore, InMemoryTopic, RecordingEventTracker, StaticClientFactory,
    StaticExternalClient, StaticRuntime,
};
use qc_15_bridge::domain::{
    verify_aggregate_with_domain, Address, BlockHeader, BridgeBatch, BridgeMessageEvent,
    NewBatchEvent, SigningDomain, ValidatorKey, ValidatorMetadata, ValidatorSet,
};
use qc_15_bridge::{
    Bridge, BridgeBatchProvider, BridgeBatchSigned, BridgeConfig, BridgeDeps, BridgeError,
    BridgeEventManager, BridgeEventSubscriber, BridgeLifecycle, Direction, PostBlockRequest,
    PostEpochRequest, RuntimeConfig, VoteStore,
};
use tokio::time::timeout;

const INTERNAL: u64 = 1;
const EXTERNAL: u64 = 2;
const INTERNAL_GATEWAY: Address = Address([0x10; 20]);
const BRIDGE_STORAGE: Address = Address([0x20; 20]);
const EXTERNAL_GATEWAY: Address = Address([0xe0; 20]);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(external_chain_id: u64) -> BridgeConfig {
    BridgeConfig {
        internal_chain_id: INTERNAL,
        external_chain_id,
        internal_gateway_addr: INTERNAL_GATEWAY,
        bridge_storage_addr: BRIDGE_STORAGE,
        external_gateway_addr: EXTERNAL_GATEWAY,
        ..Default::default()
    }
}

struct Validator {
    manager: Arc<BridgeEventManager>,
    tracker: Arc<RecordingEventTracker>,
}

struct Network {
    validators: Vec<Validator>,
    validator_set: ValidatorSet,
    chain: InMemoryChain,
}

impl Network {
    async fn start(size: u64) -> Self {
        let topic = Arc::new(InMemoryTopic::new());
        let chain = InMemoryChain::new();
        let external = Arc::new(StaticExternalClient::new(0));
        let keys: Vec<_> = (1..=size)
            .map(|seed| Arc::new(ValidatorKey::from_seed(seed).unwrap()))
            .collect();
        let validator_set = ValidatorSet::new(
            keys.iter()
                .map(|k| ValidatorMetadata::new(k.address(), k.public_key(), 100))
                .collect(),
        );

        let mut validators = Vec::new();
        for key in keys {
            let tracker = Arc::new(RecordingEventTracker::new());
            let deps = BridgeDeps {
                store: Arc::new(VoteStore::new(Box::new(InMemoryKVStore::new()))),
                topic: topic.clone(),
                tracker: tracker.clone(),
                runtime: Arc::new(StaticRuntime::new(true)),
                blockchain: Arc::new(chain.clone()),
                external_clients: Arc::new(StaticClientFactory::new(external.clone())),
                key,
            };
            let manager = Arc::new(BridgeEventManager::new(config(EXTERNAL), deps).unwrap());
            manager.clone().start(&RuntimeConfig::default()).await.unwrap();
            validators.push(Validator { manager, tracker });
        }

        Self {
            validators,
            validator_set,
            chain,
        }
    }

    fn enter_epoch(&self, epoch: u64) {
        let req = PostEpochRequest {
            new_epoch: epoch,
            validator_set: self.validator_set.clone(),
        };
        for v in &self.validators {
            v.manager.post_epoch(&req, None).unwrap();
        }
    }

    fn deliver_external_messages(&self, ids: std::ops::RangeInclusive<u64>) {
        self.deliver_external_messages_to(0..self.validators.len(), ids);
    }

    /// Deliver only to `nodes`, as when some trackers run behind.
    fn deliver_external_messages_to(
        &self,
        nodes: std::ops::Range<usize>,
        ids: std::ops::RangeInclusive<u64>,
    ) {
        for id in ids {
            let event = BridgeMessageEvent {
                id,
                source_chain_id: EXTERNAL,
                destination_chain_id: INTERNAL,
                sender: Address([0xaa; 20]),
                receiver: Address([0xbb; 20]),
                data: format!("transfer #{id}").into_bytes(),
            };
            for v in &self.validators[nodes.clone()] {
                let log = v.manager.topics().encode_message(EXTERNAL_GATEWAY, &event);
                v.tracker.deliver(&log).unwrap();
            }
        }
    }

    async fn finalize(&self, number: u64) {
        self.chain.set_head(number);
        let req = PostBlockRequest {
            header: BlockHeader::at(number),
        };
        for v in &self.validators {
            v.manager.post_block(&req, None).await.unwrap();
        }
    }

    fn close(&self) {
        for v in &self.validators {
            v.manager.close();
        }
    }
}

/// Poll until `manager` offers a batch matching `wanted`.
async fn certified(
    manager: &BridgeEventManager,
    block: u64,
    wanted: impl Fn(&BridgeBatchSigned) -> bool,
) -> BridgeBatchSigned {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(found) = manager
                .bridge_batch(block)
                .unwrap()
                .into_iter()
                .find(|b| wanted(b))
            {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("batch should reach quorum within timeout")
}

fn assert_valid_certificate(network: &Network, signed: &BridgeBatchSigned) {
    let keys: Vec<_> = signed
        .signature
        .bitmap
        .indices()
        .into_iter()
        .map(|i| network.validator_set.get(i).unwrap().bls_key)
        .collect();
    verify_aggregate_with_domain(
        &signed.signature.aggregated_signature,
        &signed.batch.hash(),
        &keys,
        SigningDomain::bridge(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_votes_converge_to_certified_batch() {
    init_tracing();
    let network = Network::start(4).await;
    network.enter_epoch(1);
    network.deliver_external_messages(1..=3);

    network.finalize(5).await;

    for v in &network.validators {
        let signed = certified(&v.manager, 5, |b| !b.batch.is_rollback).await;
        assert_eq!((signed.batch.start_id, signed.batch.end_id), (1, 3));
        assert_eq!(signed.batch.threshold, 110);
        assert!(signed.signature.bitmap.count() >= 3);
        assert_valid_certificate(&network, &signed);
    }

    // Every validator built the identical batch.
    let hashes: Vec<_> = network
        .validators
        .iter()
        .map(|v| v.manager.pending_batches(Direction::ExternalToInternal)[0].hash())
        .collect();
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));

    network.close();
}

#[tokio::test]
async fn test_validators_converge_despite_staggered_delivery() {
    init_tracing();
    let network = Network::start(4).await;
    network.enter_epoch(1);

    // Half the validators see the first messages one block early.
    network.deliver_external_messages_to(0..2, 1..=3);
    network.finalize(5).await;
    network.deliver_external_messages_to(0..2, 4..=5);
    network.deliver_external_messages_to(2..4, 1..=5);
    network.finalize(6).await;

    for v in &network.validators {
        let newest = v
            .manager
            .pending_batches(Direction::ExternalToInternal)
            .last()
            .map(|p| (p.batch.start_id, p.batch.end_id));
        assert_eq!(newest, Some((1, 5)));

        let signed = certified(&v.manager, 6, |b| !b.batch.is_rollback).await;
        assert_eq!((signed.batch.start_id, signed.batch.end_id), (1, 5));
        assert_valid_certificate(&network, &signed);
    }

    network.close();
}

#[tokio::test]
async fn test_epoch_transition_discards_pending_batches() {
    init_tracing();
    let network = Network::start(4).await;
    network.enter_epoch(1);
    network.deliver_external_messages(1..=2);
    network.finalize(5).await;
    certified(&network.validators[0].manager, 5, |b| !b.batch.is_rollback).await;

    network.enter_epoch(2);
    for v in &network.validators {
        assert!(v.manager.pending_batches(Direction::ExternalToInternal).is_empty());
        assert!(v.manager.bridge_batch(6).unwrap().is_empty());
    }

    // The messages are still stored, so the next block re-proposes them under the new epoch.
    network.finalize(6).await;
    let signed = certified(&network.validators[1].manager, 6, |b| !b.batch.is_rollback).await;
    assert_eq!((signed.batch.start_id, signed.batch.end_id), (1, 2));
    assert_eq!(
        network.validators[1].manager.pending_batches(Direction::ExternalToInternal)[0].epoch,
        2
    );

    network.close();
}

#[tokio::test]
async fn test_expired_batch_rolled_back_under_quorum() {
    init_tracing();
    let network = Network::start(4).await;
    network.enter_epoch(1);

    let expired = BridgeBatch {
        root_hash: [0x77; 32],
        start_id: 1,
        end_id: 5,
        source_chain_id: EXTERNAL,
        destination_chain_id: INTERNAL,
        threshold: 100,
        is_rollback: false,
    };
    network.chain.commit_batch(1, expired.clone());
    for v in &network.validators {
        let log = v
            .manager
            .topics()
            .encode_new_batch(BRIDGE_STORAGE, &NewBatchEvent { batch_id: 1 });
        v.manager.process_log(&BlockHeader::at(90), &log, None).unwrap();
    }

    network.finalize(99).await;
    for v in &network.validators {
        assert!(v.manager.rollback_batches().is_empty());
    }

    network.finalize(100).await;
    let signed = certified(&network.validators[2].manager, 100, |b| b.batch.is_rollback).await;
    assert_eq!((signed.batch.start_id, signed.batch.end_id), (1, 5));
    assert_eq!(signed.batch.root_hash, expired.root_hash);
    assert_valid_certificate(&network, &signed);

    // Further blocks do not queue the same rollback again.
    network.finalize(101).await;
    assert_eq!(network.validators[2].manager.rollback_batches().len(), 1);

    network.close();
}

#[tokio::test]
async fn test_bridge_fans_out_per_external_chain() {
    init_tracing();
    let chain = InMemoryChain::new();
    let topic = Arc::new(InMemoryTopic::new());
    let key = Arc::new(ValidatorKey::from_seed(1).unwrap());
    let build = |external_chain_id: u64| {
        let deps = BridgeDeps {
            store: Arc::new(VoteStore::new(Box::new(InMemoryKVStore::new()))),
            topic: topic.clone(),
            tracker: Arc::new(RecordingEventTracker::new()),
            runtime: Arc::new(StaticRuntime::new(true)),
            blockchain: Arc::new(chain.clone()),
            external_clients: Arc::new(StaticClientFactory::new(Arc::new(
                StaticExternalClient::new(0),
            ))),
            key: key.clone(),
        };
        Arc::new(BridgeEventManager::new(config(external_chain_id), deps).unwrap())
    };

    assert!(matches!(Bridge::new(Vec::new()).unwrap(), Bridge::Disabled));
    assert!(matches!(
        Bridge::new(vec![build(2), build(2)]),
        Err(BridgeError::Config(_))
    ));

    let bridge = Bridge::new(vec![build(2), build(3)]).unwrap();
    let Bridge::Enabled(set) = &bridge else {
        panic!("bridge should be enabled");
    };
    assert_eq!(set.external_chain_ids(), vec![2, 3]);
    assert_eq!(set.log_filters()[&INTERNAL_GATEWAY].len(), 3);

    // An internal message to chain 3 is stored only by that bridge.
    let to_three = BridgeMessageEvent {
        id: 1,
        source_chain_id: INTERNAL,
        destination_chain_id: 3,
        sender: Address([1; 20]),
        receiver: Address([2; 20]),
        data: vec![],
    };
    let manager_three = set.get(3).unwrap();
    let log = manager_three.topics().encode_message(INTERNAL_GATEWAY, &to_three);
    set.process_log(&BlockHeader::at(1), &log, None).unwrap();

    let stored_three = manager_three
        .store()
        .get_bridge_message_events_for_bridge_batch(1, 1, None, INTERNAL, 3)
        .unwrap();
    assert_eq!(stored_three.events().len(), 1);
    let stored_two = set
        .get(2)
        .unwrap()
        .store()
        .get_bridge_message_events_for_bridge_batch(1, 1, None, INTERNAL, 3)
        .unwrap();
    assert!(stored_two.is_empty());

    let mut stray = log;
    stray.address = Address([0x99; 20]);
    assert!(matches!(
        set.process_log(&BlockHeader::at(1), &stray, None),
        Err(BridgeError::UnknownBridgeEvent { .. })
    ));

    set.start(&RuntimeConfig::default()).await.unwrap();
    set.post_epoch(
        &PostEpochRequest {
            new_epoch: 1,
            validator_set: ValidatorSet::new(vec![ValidatorMetadata::new(
                key.address(),
                key.public_key(),
                1,
            )]),
        },
        None,
    )
    .unwrap();
    set.post_block(&PostBlockRequest { header: BlockHeader::at(1) }, None)
        .await
        .unwrap();

    // A lone validator certifies its own batch immediately.
    let ready = set.bridge_batch(1).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].batch.destination_chain_id, 3);

    set.close();
}
