//! Layered client configuration.
//!
//! The final librdkafka configuration is a strict precedence merge of three
//! key/value layers (global, consumer-type, engine-declared) plus an explicit
//! computed step for the log level. Unknown keys pass through to the client
//! untouched; only the keys this crate intercepts get typed accessors.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Consumer group ID. Required; retry and dead-letter topic names are
/// derived from it.
pub const GROUP_ID: &str = "group.id";

/// Controls the offset-commit branch: the literal string "false" selects
/// manual offset store, anything else leaves offset storage to the client.
pub const AUTO_OFFSET_STORE: &str = "enable.auto.offset.store";

/// The three externally supplied configuration layers, applied lowest to
/// highest precedence: `global` < `consumer` < `declared`. No layer is
/// required to be complete; later layers silently overwrite earlier keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayers {
    /// Deployment-wide base configuration
    #[serde(default)]
    pub global: BTreeMap<String, String>,
    /// Consumer-type-specific configuration
    #[serde(default)]
    pub consumer: BTreeMap<String, String>,
    /// Configuration declared by the engine owner, highest of the three
    #[serde(default)]
    pub declared: BTreeMap<String, String>,
}

/// The immutable merged configuration a consumer instance owns for its
/// entire lifetime.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    properties: BTreeMap<String, String>,
    log_level: RDKafkaLogLevel,
}

impl ResolvedConfig {
    /// Merge the layers in precedence order. Pure function of its inputs:
    /// the same layers always resolve to the same configuration.
    pub fn resolve(layers: &ConfigLayers) -> Self {
        let mut properties = BTreeMap::new();
        for layer in [&layers.global, &layers.consumer, &layers.declared] {
            for (key, value) in layer {
                properties.insert(key.clone(), value.clone());
            }
        }
        Self {
            properties,
            log_level: RDKafkaLogLevel::Info,
        }
    }

    /// Override the computed log level passed to librdkafka.
    pub fn with_log_level(mut self, log_level: RDKafkaLogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The consumer group ID. Missing `group.id` is a misconfiguration
    /// surfaced here, at the point of use, not validated eagerly.
    pub fn group_id(&self) -> Result<&str> {
        self.get(GROUP_ID)
            .ok_or_else(|| Error::InvalidConfig(format!("missing required key: {GROUP_ID}")))
    }

    /// True only when `enable.auto.offset.store` is explicitly "false";
    /// absent or any other value relies on the client's automatic storage.
    pub fn manual_offset_store(&self) -> bool {
        self.get(AUTO_OFFSET_STORE)
            .is_some_and(|value| value.eq_ignore_ascii_case("false"))
    }

    pub fn log_level(&self) -> RDKafkaLogLevel {
        self.log_level
    }

    /// All resolved key/value properties in key order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Build the librdkafka client configuration. Every resolved property
    /// passes through opaquely.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config.set_log_level(self.log_level);
        config
    }
}

/// Operational options every deployment sets, folded into the global layer.
#[derive(Debug, Clone, Parser)]
pub struct EngineOpts {
    /// Kafka brokers (comma-separated list)
    #[clap(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub brokers: String,
    /// Consumer group ID
    #[clap(long, env = "KAFKA_GROUP_ID")]
    pub group_id: String,
    /// Poll timeout in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub poll_timeout_ms: u64,
    /// Session timeout in milliseconds
    #[clap(long, default_value = "30000")]
    pub session_timeout_ms: String,
    /// Auto offset reset strategy ("earliest" or "latest")
    #[clap(long, default_value = "earliest")]
    pub auto_offset_reset: String,
}

impl EngineOpts {
    /// The global configuration layer these options contribute.
    pub fn global_layer(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("bootstrap.servers".to_string(), self.brokers.clone()),
            (GROUP_ID.to_string(), self.group_id.clone()),
            (
                "session.timeout.ms".to_string(),
                self.session_timeout_ms.clone(),
            ),
            (
                "auto.offset.reset".to_string(),
                self.auto_offset_reset.clone(),
            ),
        ])
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
