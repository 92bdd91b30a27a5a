//! Per-topic handler contract and the registry the engine dispatches through.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::message::RawMessage;

/// Retry behavior for one topic. Absence of a policy on a handler means
/// retry is disabled for that topic and failures go straight to the
/// dead-letter topic.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry deliveries before a failure is dead-lettered.
    pub max_attempts: u32,
    /// Delay tiers between attempts. Attempts beyond the last tier reuse it;
    /// an empty list means immediate redelivery.
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delays: Vec::new(),
        }
    }

    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Delay tier for the given zero-based attempt, clamped to the last tier.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
    }
}

/// Application-supplied processing for one topic.
///
/// `consume` may fail with any error; the engine runs the failure through
/// the retry/dead-letter cascade and keeps polling.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn consume(&self, msg: &RawMessage) -> anyhow::Result<()>;

    /// Retry policy for this topic, `None` disables retry.
    fn retry_policy(&self) -> Option<&RetryPolicy> {
        None
    }
}

/// Immutable topic-name-to-handler mapping, built once at engine
/// construction. Registration is a one-time setup step; lookups afterward
/// never mutate.
#[derive(Default)]
pub struct TopicRegistry {
    handlers: BTreeMap<String, Arc<dyn TopicHandler>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic. Registering the same topic twice
    /// keeps the later handler.
    pub fn register(mut self, topic: impl Into<String>, handler: Arc<dyn TopicHandler>) -> Self {
        self.handlers.insert(topic.into(), handler);
        self
    }

    /// Handler for a topic name. The engine only subscribes to registered
    /// names, but a rebalance can still deliver an unexpected topic, so
    /// lookup defends with `Error::UnknownTopic`.
    pub fn lookup(&self, topic: &str) -> Result<&Arc<dyn TopicHandler>> {
        self.handlers
            .get(topic)
            .ok_or_else(|| Error::UnknownTopic(topic.to_string()))
    }

    /// Registered topic names, in stable order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
