//! The consumer processing engine: poll loop, per-topic dispatch, the
//! retry/dead-letter escalation cascade, and the offset-commit policy.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ConsumerClient, ProducerClient};
use crate::config::ResolvedConfig;
use crate::dead_letter::DeadLetterSink;
use crate::error::{Error, Result};
use crate::handler::{RetryPolicy, TopicRegistry};
use crate::message::RawMessage;
use crate::reporter::ErrorReporter;
use crate::retry::RetryEscalator;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// One engine instance owns one client connection, one resolved
/// configuration, and one topic registry, and runs one poll/dispatch loop.
///
/// A single message failing never stops the loop: handler failures run
/// through retry and then the dead-letter topic, and only a failed
/// dead-letter produce surfaces as a loop-level fault (at that point no
/// delivery guarantee can be honored for the message).
pub struct ConsumerEngine {
    client: Arc<dyn ConsumerClient>,
    registry: TopicRegistry,
    config: ResolvedConfig,
    retries: RetryEscalator,
    dead_letters: DeadLetterSink,
    reporter: Arc<dyn ErrorReporter>,
    poll_timeout: Duration,
}

impl ConsumerEngine {
    /// Build an engine. Requires `group.id` in the resolved configuration,
    /// since the retry and dead-letter topic names derive from it.
    pub fn new(
        config: ResolvedConfig,
        registry: TopicRegistry,
        client: Arc<dyn ConsumerClient>,
        producer: Arc<dyn ProducerClient>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let group_id = config.group_id()?.to_string();

        Ok(Self {
            client,
            registry,
            retries: RetryEscalator::new(Arc::clone(&producer), group_id.clone()),
            dead_letters: DeadLetterSink::new(producer, group_id),
            config,
            reporter,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Consumer group ID this engine runs under.
    pub fn group_id(&self) -> Result<&str> {
        self.config.group_id()
    }

    /// Subscribe to the registered topics and poll until cancelled.
    ///
    /// Returns `Ok(())` only on cancellation; the only processing failure
    /// that escapes is dead-letter dispatch failure.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        if self.registry.is_empty() {
            return Err(Error::InvalidConfig(
                "no topic handlers registered".to_string(),
            ));
        }

        let names = self.registry.names();
        self.client.subscribe(&names)?;
        tracing::info!("Subscribed to topics: {}", names.join(", "));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping consumer loop");
                    return Ok(());
                }
                polled = self.client.poll(self.poll_timeout) => {
                    match polled {
                        Ok(Some(msg)) => self.process_message(msg).await?,
                        Ok(None) => {} // Poll timeout, nothing to deliver
                        Err(e) => self.reporter.report(&e, Some("poll")),
                    }
                }
            }
        }
    }

    /// One dispatch cycle: transport check, handler dispatch, failure
    /// cascade, then the offset-commit policy. The offset step runs on
    /// every non-transport path, including messages that were ultimately
    /// dead-lettered; forward progress is deliberately preferred over
    /// redelivery.
    pub async fn process_message(&self, msg: RawMessage) -> Result<()> {
        if let Some(reason) = &msg.transport_error {
            self.reporter
                .report(&Error::Transport(reason.clone()), None);
            return Ok(());
        }

        match self.registry.lookup(&msg.topic) {
            Ok(handler) => {
                if let Err(error) = handler.consume(&msg).await {
                    self.handle_failure(&msg, error, handler.retry_policy())
                        .await?;
                }
            }
            Err(error) => {
                // A rebalance can deliver a topic nobody registered for;
                // there is no handler and no retry policy, so the message
                // goes straight to the dead-letter topic.
                self.handle_failure(&msg, anyhow::Error::new(error), None)
                    .await?;
            }
        }

        self.commit_offset(&msg);
        Ok(())
    }

    /// The escalation cascade: a successful retry ends processing; anything
    /// else dead-letters the message and reports the failure.
    async fn handle_failure(
        &self,
        msg: &RawMessage,
        error: anyhow::Error,
        policy: Option<&RetryPolicy>,
    ) -> Result<()> {
        if self.retries.retry(msg, &error, policy).await {
            return Ok(());
        }

        self.dead_letters.send(msg, &error).await?;
        self.reporter.report(error.as_ref(), Some(&msg.topic));
        Ok(())
    }

    /// Manual offset store only when `enable.auto.offset.store` is
    /// explicitly false; otherwise the client's automatic storage applies.
    /// A failed store is reported, not propagated, so the loop keeps its
    /// forward progress.
    fn commit_offset(&self, msg: &RawMessage) {
        if !self.config.manual_offset_store() {
            return;
        }
        if let Err(e) = self.client.store_offset(msg) {
            self.reporter.report(&e, Some("store_offset"));
        }
    }
}
