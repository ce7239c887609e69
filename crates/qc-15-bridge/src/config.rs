//! # Bridge Configuration
//!
//! Per-bridge settings ([`BridgeConfig`]) and node-level runtime settings
//! passed to `start` ([`RuntimeConfig`]).
//!
//! Sources, lowest to highest precedence: defaults, a JSON document,
//! `QC_BRIDGE_*` environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QC_BRIDGE_INTERNAL_CHAIN_ID` | `internal_chain_id` |
//! | `QC_BRIDGE_EXTERNAL_CHAIN_ID` | `external_chain_id` |
//! | `QC_BRIDGE_JSON_RPC_ENDPOINT` | `json_rpc_endpoint` |
//! | `QC_BRIDGE_EXTERNAL_GATEWAY` | `external_gateway_addr` |
//! | `QC_BRIDGE_INTERNAL_GATEWAY` | `internal_gateway_addr` |
//! | `QC_BRIDGE_STORAGE` | `bridge_storage_addr` |
//! | `QC_BRIDGE_TRACKER_START_BLOCK` | `event_tracker_start_block` |
//! | `QC_BRIDGE_BATCH_THRESHOLD` | `batch_threshold_offset` |
//! | `QC_BRIDGE_MAX_EVENTS_PER_BATCH` | `max_events_per_batch` |
//! | `QC_BRIDGE_THRESHOLD_GRANULARITY` | `threshold_granularity` |
//! | `QC_BRIDGE_EPOCH_RETENTION` | `epoch_retention` |

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{
    Address, ChainPair, ConfigError, DEFAULT_MAX_EVENTS_PER_BATCH, DEFAULT_THRESHOLD_GRANULARITY,
};

/// Settings for one internal↔external bridge.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Chain this node produces blocks for.
    pub internal_chain_id: u64,
    /// Observed chain.
    pub external_chain_id: u64,
    /// JSON-RPC endpoint of the external chain.
    pub json_rpc_endpoint: String,
    /// Gateway contract on the external chain.
    #[serde_as(as = "DisplayFromStr")]
    pub external_gateway_addr: Address,
    /// Gateway contract on the internal chain.
    #[serde_as(as = "DisplayFromStr")]
    pub internal_gateway_addr: Address,
    /// Bridge storage contract on the internal chain.
    #[serde_as(as = "DisplayFromStr")]
    pub bridge_storage_addr: Address,
    /// First external block the tracker scans.
    pub event_tracker_start_block: u64,
    /// Blocks added to the rounded height when computing a batch deadline.
    pub batch_threshold_offset: u64,
    /// Cap on messages per batch.
    pub max_events_per_batch: u64,
    /// Round-up step of the deadline policy.
    pub threshold_granularity: u64,
    /// Number of epoch vote ledgers kept on disk.
    pub epoch_retention: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            internal_chain_id: 1,
            external_chain_id: 2,
            json_rpc_endpoint: "http://127.0.0.1:8545".to_string(),
            external_gateway_addr: Address::ZERO,
            internal_gateway_addr: Address::ZERO,
            bridge_storage_addr: Address::ZERO,
            event_tracker_start_block: 0,
            batch_threshold_offset: 100,
            max_events_per_batch: DEFAULT_MAX_EVENTS_PER_BATCH,
            threshold_granularity: DEFAULT_THRESHOLD_GRANULARITY,
            epoch_retention: 2,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `QC_BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Parse a JSON document; missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (variable name → value) and validate.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        override_parsed(&lookup, "QC_BRIDGE_INTERNAL_CHAIN_ID", &mut self.internal_chain_id)?;
        override_parsed(&lookup, "QC_BRIDGE_EXTERNAL_CHAIN_ID", &mut self.external_chain_id)?;
        if let Some(endpoint) = lookup("QC_BRIDGE_JSON_RPC_ENDPOINT") {
            self.json_rpc_endpoint = endpoint;
        }
        override_parsed(&lookup, "QC_BRIDGE_EXTERNAL_GATEWAY", &mut self.external_gateway_addr)?;
        override_parsed(&lookup, "QC_BRIDGE_INTERNAL_GATEWAY", &mut self.internal_gateway_addr)?;
        override_parsed(&lookup, "QC_BRIDGE_STORAGE", &mut self.bridge_storage_addr)?;
        override_parsed(
            &lookup,
            "QC_BRIDGE_TRACKER_START_BLOCK",
            &mut self.event_tracker_start_block,
        )?;
        override_parsed(&lookup, "QC_BRIDGE_BATCH_THRESHOLD", &mut self.batch_threshold_offset)?;
        override_parsed(
            &lookup,
            "QC_BRIDGE_MAX_EVENTS_PER_BATCH",
            &mut self.max_events_per_batch,
        )?;
        override_parsed(
            &lookup,
            "QC_BRIDGE_THRESHOLD_GRANULARITY",
            &mut self.threshold_granularity,
        )?;
        override_parsed(&lookup, "QC_BRIDGE_EPOCH_RETENTION", &mut self.epoch_retention)?;

        self.validate()?;
        Ok(self)
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_chain_id == self.external_chain_id {
            return Err(ConfigError::InvalidValue {
                field: "external_chain_id",
                reason: format!("equals internal chain id {}", self.internal_chain_id),
            });
        }
        for (field, value) in [
            ("max_events_per_batch", self.max_events_per_batch),
            ("threshold_granularity", self.threshold_granularity),
            ("epoch_retention", self.epoch_retention),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    /// The two chains this bridge connects.
    pub fn chains(&self) -> ChainPair {
        ChainPair {
            internal: self.internal_chain_id,
            external: self.external_chain_id,
        }
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(name) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Polling parameters for the external event tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTrackerSettings {
    /// Blocks fetched per request.
    pub sync_batch_size: u64,
    /// Confirmations before a log is delivered.
    pub num_block_confirmations: u64,
    /// Depth of reorg reconciliation.
    pub num_of_blocks_to_reconcile: u64,
    /// Delay between polls in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for EventTrackerSettings {
    fn default() -> Self {
        Self {
            sync_batch_size: 10,
            num_block_confirmations: 6,
            num_of_blocks_to_reconcile: 10_000,
            poll_interval_ms: 2_000,
        }
    }
}

impl EventTrackerSettings {
    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Node-level settings passed to `start`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory for tracker progress databases.
    pub state_data_dir: String,
    /// Tracker polling parameters.
    pub event_tracker: EventTrackerSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_data_dir: "./data".to_string(),
            event_tracker: EventTrackerSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_events_per_batch, 10);
        assert_eq!(config.threshold_granularity, 10);
    }

    #[test]
    fn test_env_overrides() {
        let config = BridgeConfig::default()
            .with_overrides(env(&[
                ("QC_BRIDGE_EXTERNAL_CHAIN_ID", "137"),
                ("QC_BRIDGE_BATCH_THRESHOLD", " 25 "),
                (
                    "QC_BRIDGE_EXTERNAL_GATEWAY",
                    "0x00000000000000000000000000000000000000aa",
                ),
            ]))
            .unwrap();

        assert_eq!(config.external_chain_id, 137);
        assert_eq!(config.batch_threshold_offset, 25);
        assert_eq!(config.external_gateway_addr.as_bytes()[19], 0xaa);
    }

    #[test]
    fn test_env_parse_failure_names_variable() {
        let err = BridgeConfig::default()
            .with_overrides(env(&[("QC_BRIDGE_EPOCH_RETENTION", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "QC_BRIDGE_EPOCH_RETENTION"));
    }

    #[test]
    fn test_validation_rejects_same_chain_and_zero_caps() {
        let same = BridgeConfig {
            external_chain_id: 1,
            ..Default::default()
        };
        assert!(same.validate().is_err());

        let zero = BridgeConfig {
            max_events_per_batch: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidValue { field: "max_events_per_batch", .. })
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = BridgeConfig::from_json(
            r#"{"external_chain_id": 5, "internal_gateway_addr": "0x0101010101010101010101010101010101010101"}"#,
        )
        .unwrap();
        assert_eq!(config.external_chain_id, 5);
        assert_eq!(config.internal_gateway_addr, Address([1; 20]));
        assert_eq!(config.batch_threshold_offset, 100);

        assert!(BridgeConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_runtime_config_poll_interval() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.event_tracker.poll_interval(), Duration::from_secs(2));
    }
}
