//! Event tracker that records its configuration and lets the host push
//! logs by hand.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{BridgeError, Log, TrackerError};
use crate::ports::inbound::ExternalLogSink;
use crate::ports::outbound::{EventTracker, EventTrackerConfig};

/// Manual event tracker.
#[derive(Default)]
pub struct RecordingEventTracker {
    config: Mutex<Option<EventTrackerConfig>>,
    sink: Mutex<Option<Arc<dyn ExternalLogSink>>>,
    fail_start: AtomicBool,
    closes: AtomicUsize,
}

impl RecordingEventTracker {
    /// Tracker that starts successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker whose `start` fails.
    pub fn failing() -> Self {
        let tracker = Self::default();
        tracker.fail_start.store(true, Ordering::SeqCst);
        tracker
    }

    /// Configuration passed to `start`.
    pub fn config(&self) -> Option<EventTrackerConfig> {
        self.config.lock().clone()
    }

    /// How many times `close` ran.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Deliver a confirmed log to the registered sink.
    pub fn deliver(&self, log: &Log) -> Result<(), BridgeError> {
        let (sink, chain_id) = {
            let sink = self.sink.lock().clone();
            let chain_id = self.config.lock().as_ref().map(|c| c.chain_id);
            (sink, chain_id)
        };
        match (sink, chain_id) {
            (Some(sink), Some(chain_id)) => sink.add_log(chain_id, log),
            _ => Err(TrackerError::Start("tracker not started".into()).into()),
        }
    }
}

#[async_trait]
impl EventTracker for RecordingEventTracker {
    async fn start(
        &self,
        config: EventTrackerConfig,
        sink: Arc<dyn ExternalLogSink>,
    ) -> Result<(), TrackerError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TrackerError::Start("rpc endpoint refused connection".into()));
        }
        debug!(
            chain_id = config.chain_id,
            start_block = config.start_block,
            "[qc-15] Event tracker started"
        );
        *self.config.lock() = Some(config);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().take();
    }
}
