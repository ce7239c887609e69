//! In-process gossip topic.
//!
//! Every subscriber sees every published message, including the
//! publisher's own. Used to wire several bridge instances together in one
//! process.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::TransportError;
use crate::ports::outbound::{Topic, TransportMessage};

/// Default channel capacity.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Broadcast-channel topic.
#[derive(Debug)]
pub struct InMemoryTopic {
    sender: broadcast::Sender<TransportMessage>,
    closed: AtomicBool,
    published: AtomicU64,
}

impl InMemoryTopic {
    /// Topic with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Topic with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// Refuse further subscriptions and publications.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Messages published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Active receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryTopic {
    fn default() -> Self {
        Self::new()
    }
}

impl Topic for InMemoryTopic {
    fn publish(&self, message: TransportMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("topic closed".into()));
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(message) {
            Ok(receivers) => debug!(receivers, "[qc-15] Gossip message published"),
            Err(_) => debug!("[qc-15] Gossip message dropped (no subscribers)"),
        }
        Ok(())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<TransportMessage>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Subscribe("topic closed".into()));
        }
        Ok(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let topic = InMemoryTopic::new();
        let mut a = topic.subscribe().unwrap();
        let mut b = topic.subscribe().unwrap();

        topic
            .publish(TransportMessage { data: vec![1, 2] })
            .unwrap();

        assert_eq!(a.recv().await.unwrap().data, vec![1, 2]);
        assert_eq!(b.recv().await.unwrap().data, vec![1, 2]);
        assert_eq!(topic.published(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let topic = InMemoryTopic::new();
        assert!(topic.publish(TransportMessage { data: vec![] }).is_ok());
    }

    #[test]
    fn test_closed_topic_rejects_subscribe() {
        let topic = InMemoryTopic::new();
        topic.close();
        assert!(matches!(
            topic.subscribe(),
            Err(TransportError::Subscribe(_))
        ));
    }
}
