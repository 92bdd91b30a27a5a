//! Retry escalation for failed messages.

use std::sync::Arc;

use crate::client::ProducerClient;
use crate::handler::RetryPolicy;
use crate::message::{headers, RawMessage};

/// Re-queues failed messages to the per-topic retry topic
/// (`{group_id}.{topic}.retry`).
pub struct RetryEscalator {
    producer: Arc<dyn ProducerClient>,
    group_id: String,
}

impl RetryEscalator {
    pub fn new(producer: Arc<dyn ProducerClient>, group_id: impl Into<String>) -> Self {
        Self {
            producer,
            group_id: group_id.into(),
        }
    }

    /// Retry topic name for a main topic, scoped by consumer group.
    pub fn retry_topic(&self, topic: &str) -> String {
        format!("{}.{}.retry", self.group_id, topic)
    }

    /// Attempt to hand the failed message off to its retry topic.
    ///
    /// Returns false when retry is disabled (`policy` is `None`), when the
    /// attempt budget is exhausted, or when the produce itself fails; in all
    /// three cases the caller falls through to dead-lettering. A failed
    /// produce is logged, never silently swallowed.
    pub async fn retry(
        &self,
        msg: &RawMessage,
        error: &anyhow::Error,
        policy: Option<&RetryPolicy>,
    ) -> bool {
        let Some(policy) = policy else {
            return false;
        };

        let attempt = msg.retry_attempt();
        if attempt >= policy.max_attempts {
            tracing::debug!(
                "Retries exhausted for {}[{}]@{} after {attempt} attempts",
                msg.topic,
                msg.partition,
                msg.offset
            );
            return false;
        }

        let mut retry_headers: Vec<(String, Vec<u8>)> = msg
            .headers
            .iter()
            .filter(|(name, _)| name != headers::RETRY_ATTEMPT && name != headers::RETRY_DELAY_MS)
            .cloned()
            .collect();
        retry_headers.push((
            headers::RETRY_ATTEMPT.to_string(),
            (attempt + 1).to_string().into_bytes(),
        ));
        if let Some(delay) = policy.delay_for(attempt) {
            retry_headers.push((
                headers::RETRY_DELAY_MS.to_string(),
                delay.as_millis().to_string().into_bytes(),
            ));
        }

        let retry_topic = self.retry_topic(&msg.topic);
        match self
            .producer
            .produce(
                &retry_topic,
                msg.key.as_deref(),
                msg.payload.as_deref(),
                &retry_headers,
            )
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    "Re-queued {}[{}]@{} to {retry_topic} (attempt {}): {error}",
                    msg.topic,
                    msg.partition,
                    msg.offset,
                    attempt + 1
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to produce retry message to {retry_topic}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProducer {
        fail: bool,
        sent: Mutex<Vec<(String, Vec<(String, Vec<u8>)>)>>,
    }

    #[async_trait]
    impl ProducerClient for RecordingProducer {
        async fn produce(
            &self,
            topic: &str,
            _key: Option<&[u8]>,
            _payload: Option<&[u8]>,
            headers: &[(String, Vec<u8>)],
        ) -> Result<()> {
            if self.fail {
                return Err(Error::Producer("broker unavailable".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), headers.to_vec()));
            Ok(())
        }
    }

    fn msg_on(topic: &str) -> RawMessage {
        RawMessage {
            topic: topic.to_string(),
            payload: Some(b"payload".to_vec()),
            ..RawMessage::default()
        }
    }

    #[tokio::test]
    async fn no_policy_means_no_retry() {
        let producer = Arc::new(RecordingProducer::default());
        let escalator = RetryEscalator::new(producer.clone(), "g1");
        let err = anyhow::anyhow!("boom");

        assert!(!escalator.retry(&msg_on("orders"), &err, None).await);
        assert!(producer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_targets_group_scoped_topic_and_counts_attempts() {
        let producer = Arc::new(RecordingProducer::default());
        let escalator = RetryEscalator::new(producer.clone(), "g1");
        let policy = RetryPolicy::new(3);
        let err = anyhow::anyhow!("boom");

        assert!(escalator.retry(&msg_on("orders"), &err, Some(&policy)).await);

        let sent = producer.sent.lock().unwrap();
        let (topic, headers) = &sent[0];
        assert_eq!(topic, "g1.orders.retry");
        let attempt = headers
            .iter()
            .find(|(name, _)| name == crate::message::headers::RETRY_ATTEMPT)
            .unwrap();
        assert_eq!(attempt.1, b"1".to_vec());
    }

    #[tokio::test]
    async fn retry_attaches_delay_tier_header() {
        let producer = Arc::new(RecordingProducer::default());
        let escalator = RetryEscalator::new(producer.clone(), "g1");
        let policy = RetryPolicy::new(3).with_delays(vec![
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(30),
        ]);
        let err = anyhow::anyhow!("boom");

        // First attempt uses the first tier.
        assert!(escalator.retry(&msg_on("orders"), &err, Some(&policy)).await);

        // Second attempt moves to the next tier.
        let mut second = msg_on("orders");
        second.headers.push((
            crate::message::headers::RETRY_ATTEMPT.to_string(),
            b"1".to_vec(),
        ));
        assert!(escalator.retry(&second, &err, Some(&policy)).await);

        let sent = producer.sent.lock().unwrap();
        let delay_of = |headers: &Vec<(String, Vec<u8>)>| {
            headers
                .iter()
                .find(|(name, _)| name == crate::message::headers::RETRY_DELAY_MS)
                .map(|(_, value)| value.clone())
                .unwrap()
        };
        assert_eq!(delay_of(&sent[0].1), b"1000".to_vec());
        assert_eq!(delay_of(&sent[1].1), b"30000".to_vec());
    }

    #[tokio::test]
    async fn no_delay_tiers_means_no_delay_header() {
        let producer = Arc::new(RecordingProducer::default());
        let escalator = RetryEscalator::new(producer.clone(), "g1");
        let policy = RetryPolicy::new(3);
        let err = anyhow::anyhow!("boom");

        assert!(escalator.retry(&msg_on("orders"), &err, Some(&policy)).await);

        let sent = producer.sent.lock().unwrap();
        assert!(!sent[0]
            .1
            .iter()
            .any(|(name, _)| name == crate::message::headers::RETRY_DELAY_MS));
    }

    #[tokio::test]
    async fn exhausted_attempts_are_not_retried() {
        let producer = Arc::new(RecordingProducer::default());
        let escalator = RetryEscalator::new(producer.clone(), "g1");
        let policy = RetryPolicy::new(2);
        let err = anyhow::anyhow!("boom");

        let mut msg = msg_on("orders");
        msg.headers.push((
            crate::message::headers::RETRY_ATTEMPT.to_string(),
            b"2".to_vec(),
        ));

        assert!(!escalator.retry(&msg, &err, Some(&policy)).await);
        assert!(producer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_produce_reports_not_retried() {
        let producer = Arc::new(RecordingProducer {
            fail: true,
            ..RecordingProducer::default()
        });
        let escalator = RetryEscalator::new(producer, "g1");
        let policy = RetryPolicy::new(3);
        let err = anyhow::anyhow!("boom");

        assert!(!escalator.retry(&msg_on("orders"), &err, Some(&policy)).await);
    }
}
