//! Terminal dead-letter dispatch for messages whose processing permanently
//! failed.

use std::sync::Arc;

use crate::client::ProducerClient;
use crate::error::{Error, Result};
use crate::message::{headers, RawMessage};

/// Persists failed messages to the per-topic dead-letter topic
/// (`{group_id}.{topic}.dlt`), annotated with the failure context.
pub struct DeadLetterSink {
    producer: Arc<dyn ProducerClient>,
    group_id: String,
}

impl DeadLetterSink {
    pub fn new(producer: Arc<dyn ProducerClient>, group_id: impl Into<String>) -> Self {
        Self {
            producer,
            group_id: group_id.into(),
        }
    }

    /// Dead-letter topic name for a main topic, scoped by consumer group.
    pub fn dead_letter_topic(&self, topic: &str) -> String {
        format!("{}.{}.dlt", self.group_id, topic)
    }

    /// Produce the original message to the dead-letter topic with a short
    /// error header and the full failure chain. At this point no other
    /// recovery path exists, so a failed produce propagates to the caller.
    pub async fn send(&self, msg: &RawMessage, error: &anyhow::Error) -> Result<()> {
        let mut dlt_headers = msg.headers.clone();
        dlt_headers.push((
            headers::DEAD_LETTER_MESSAGE.to_string(),
            error.to_string().into_bytes(),
        ));
        dlt_headers.push((
            headers::DEAD_LETTER_DETAIL.to_string(),
            format!("{error:?}").into_bytes(),
        ));

        let dlt_topic = self.dead_letter_topic(&msg.topic);
        self.producer
            .produce(
                &dlt_topic,
                msg.key.as_deref(),
                msg.payload.as_deref(),
                &dlt_headers,
            )
            .await
            .map_err(|e| {
                Error::DeadLetterDispatch(format!("failed to produce to {dlt_topic}: {e}"))
            })
    }
}
