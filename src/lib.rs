//! Message-consumption framework on top of a Kafka client.
//!
//! Applications register one handler per topic, and the engine owns the rest:
//! the poll loop, per-topic dispatch, ordered retry before dead-lettering,
//! and the offset-commit policy. Delivery is at-least-once: offsets advance
//! even for messages that ended up on the dead-letter topic, so one poison
//! message never stalls a partition.
//!
//! Features:
//!
//! - Per-topic handlers: an explicit topic-name-to-handler registry, resolved once at startup
//! - Failure escalation: handler failures are re-queued to a retry topic, then dead-lettered with failure context
//! - Layered configuration: global, consumer-type and declared key/value layers merged last-writer-wins
//! - Cancellable loop: shutdown via a cancellation token, checked every iteration

/// Seams over the underlying Kafka client and their rdkafka-backed
/// implementations.
pub mod client;

/// Layered configuration merge and the resolved client configuration.
pub mod config;

/// Dead-letter dispatch for permanently failed messages.
pub mod dead_letter;

/// The poll/dispatch/escalate/commit engine.
pub mod engine;

pub mod error;

/// Per-topic handler contract, retry policies, and the topic registry.
pub mod handler;

pub mod message;
pub mod reporter;

/// Retry escalation to group-scoped retry topics.
pub mod retry;

// Re-export main types for easy access
pub use client::{
    ConsumerClient, KafkaConsumerClient, KafkaProducerClient, ProducerClient, ReportingContext,
};
pub use config::{ConfigLayers, EngineOpts, ResolvedConfig};
pub use dead_letter::DeadLetterSink;
pub use engine::ConsumerEngine;
pub use error::{Error, Result};
pub use handler::{RetryPolicy, TopicHandler, TopicRegistry};
pub use message::RawMessage;
pub use reporter::{ErrorReporter, TracingReporter};
pub use retry::RetryEscalator;
