//! Seams over the underlying Kafka client, plus the rdkafka-backed
//! implementations used in production. The engine and the escalation paths
//! only ever see these traits, which keeps them testable against in-memory
//! fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::consumer::{Consumer as RdkafkaConsumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{
    BorrowedMessage as RdkafkaBorrowedMessage, Header, Headers, Message as RdkafkaMessage,
    OwnedHeaders,
};
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use crate::message::RawMessage;
use crate::reporter::ErrorReporter;

/// Consuming side of the underlying client: subscribe, bounded poll,
/// manual offset store.
#[async_trait]
pub trait ConsumerClient: Send + Sync {
    fn subscribe(&self, topics: &[&str]) -> Result<()>;

    /// Poll for one message, waiting at most `timeout`. `None` means the
    /// timeout elapsed with nothing to deliver. Delivery-layer failures are
    /// returned as messages with `transport_error` set so the engine has a
    /// single classification point.
    async fn poll(&self, timeout: Duration) -> Result<Option<RawMessage>>;

    fn store_offset(&self, msg: &RawMessage) -> Result<()>;
}

/// Producing side of the underlying client, used by the retry and
/// dead-letter dispatch paths only.
#[async_trait]
pub trait ProducerClient: Send + Sync {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
        headers: &[(String, Vec<u8>)],
    ) -> Result<()>;
}

/// Client context forwarding librdkafka's internal errors to the configured
/// reporter. This is the error callback injected into the client
/// configuration, constructed once per client.
pub struct ReportingContext {
    reporter: Arc<dyn ErrorReporter>,
}

impl ReportingContext {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }
}

impl ClientContext for ReportingContext {
    fn error(&self, error: KafkaError, reason: &str) {
        self.reporter.report(&Error::Kafka(error), Some(reason));
    }
}

impl ConsumerContext for ReportingContext {}

/// rdkafka-backed consumer. Exclusively owned by one engine instance; the
/// inner `StreamConsumer` is not shared.
pub struct KafkaConsumerClient {
    consumer: StreamConsumer<ReportingContext>,
}

impl KafkaConsumerClient {
    pub fn new(config: &ResolvedConfig, reporter: Arc<dyn ErrorReporter>) -> Result<Self> {
        let consumer: StreamConsumer<ReportingContext> = config
            .client_config()
            .create_with_context(ReportingContext::new(reporter))
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        Ok(Self { consumer })
    }

    fn owned_message(msg: &RdkafkaBorrowedMessage) -> RawMessage {
        let headers = msg
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| {
                        (
                            header.key.to_string(),
                            header.value.unwrap_or_default().to_vec(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        RawMessage {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(|k| k.to_vec()),
            payload: msg.payload().map(|p| p.to_vec()),
            headers,
            timestamp: msg.timestamp().to_millis(),
            transport_error: None,
        }
    }
}

#[async_trait]
impl ConsumerClient for KafkaConsumerClient {
    fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to topics: {e}")))
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<RawMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(msg)) => Ok(Some(Self::owned_message(&msg))),
            Ok(Err(e)) => Ok(Some(RawMessage::from_transport_error(e.to_string()))),
            Err(_) => Ok(None), // Timeout, nothing to deliver right now
        }
    }

    fn store_offset(&self, msg: &RawMessage) -> Result<()> {
        self.consumer
            .store_offset(&msg.topic, msg.partition, msg.offset)
            .map_err(Error::Kafka)
    }
}

/// Resolved keys that only make sense on a consumer instance and must not
/// be forwarded to the producer. Everything else, credentials included,
/// passes through opaquely so the producer connects the same way the
/// consumer does.
const CONSUMER_ONLY_KEYS: &[&str] = &[
    "group.id",
    "group.instance.id",
    "session.timeout.ms",
    "heartbeat.interval.ms",
    "auto.offset.reset",
    "enable.auto.commit",
    "auto.commit.interval.ms",
    "enable.auto.offset.store",
    "enable.partition.eof",
    "partition.assignment.strategy",
    "max.poll.interval.ms",
];

/// Client configuration for the retry/dead-letter producer: the resolved
/// properties minus the consumer-only keys, with a default message timeout
/// when none was configured.
fn producer_client_config(config: &ResolvedConfig) -> rdkafka::ClientConfig {
    let mut client_config = rdkafka::ClientConfig::new();
    for (key, value) in config.properties() {
        if CONSUMER_ONLY_KEYS.contains(&key) || key.starts_with("fetch.") {
            continue;
        }
        client_config.set(key, value);
    }
    if config.get("message.timeout.ms").is_none() {
        client_config.set("message.timeout.ms", "5000");
    }
    client_config.set_log_level(config.log_level());
    client_config
}

/// rdkafka-backed producer for the retry and dead-letter topics. Shares the
/// connection-level resolved configuration with the consumer; consumer-only
/// keys are not forwarded to the producer instance.
pub struct KafkaProducerClient {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducerClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self> {
        let producer: FutureProducer = producer_client_config(config)
            .create()
            .map_err(|e| Error::Producer(format!("Failed to create producer: {e}")))?;

        Ok(Self {
            producer,
            send_timeout: Duration::from_secs(5),
        })
    }
}

#[async_trait]
impl ProducerClient for KafkaProducerClient {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
        headers: &[(String, Vec<u8>)],
    ) -> Result<()> {
        let mut owned_headers = OwnedHeaders::new_with_capacity(headers.len());
        for (name, value) in headers {
            owned_headers = owned_headers.insert(Header {
                key: name,
                value: Some(value.as_slice()),
            });
        }

        let mut record = FutureRecord::<[u8], [u8]>::to(topic).headers(owned_headers);
        if let Some(key) = key {
            record = record.key(key);
        }
        if let Some(payload) = payload {
            record = record.payload(payload);
        }

        self.producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLayers;
    use std::collections::BTreeMap;

    fn resolved(pairs: &[(&str, &str)]) -> ResolvedConfig {
        let declared: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ResolvedConfig::resolve(&ConfigLayers {
            declared,
            ..ConfigLayers::default()
        })
    }

    #[test]
    fn producer_config_forwards_credentials() {
        let config = resolved(&[
            ("bootstrap.servers", "broker:9093"),
            ("security.protocol", "sasl_ssl"),
            ("sasl.mechanism", "SCRAM-SHA-512"),
            ("sasl.username", "svc-orders"),
            ("sasl.password", "secret"),
            ("ssl.ca.location", "/etc/kafka/ca.pem"),
            ("group.id", "g1"),
        ]);

        let client_config = producer_client_config(&config);

        assert_eq!(client_config.get("bootstrap.servers"), Some("broker:9093"));
        assert_eq!(client_config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client_config.get("sasl.mechanism"), Some("SCRAM-SHA-512"));
        assert_eq!(client_config.get("sasl.username"), Some("svc-orders"));
        assert_eq!(client_config.get("sasl.password"), Some("secret"));
        assert_eq!(client_config.get("ssl.ca.location"), Some("/etc/kafka/ca.pem"));
    }

    #[test]
    fn producer_config_strips_consumer_only_keys() {
        let config = resolved(&[
            ("bootstrap.servers", "broker:9092"),
            ("group.id", "g1"),
            ("enable.auto.offset.store", "false"),
            ("auto.offset.reset", "earliest"),
            ("session.timeout.ms", "30000"),
            ("fetch.min.bytes", "1"),
        ]);

        let client_config = producer_client_config(&config);

        assert_eq!(client_config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(client_config.get("group.id"), None);
        assert_eq!(client_config.get("enable.auto.offset.store"), None);
        assert_eq!(client_config.get("auto.offset.reset"), None);
        assert_eq!(client_config.get("session.timeout.ms"), None);
        assert_eq!(client_config.get("fetch.min.bytes"), None);
    }

    #[test]
    fn producer_config_keeps_configured_message_timeout() {
        let defaulted = producer_client_config(&resolved(&[("bootstrap.servers", "b:9092")]));
        assert_eq!(defaulted.get("message.timeout.ms"), Some("5000"));

        let configured = producer_client_config(&resolved(&[("message.timeout.ms", "20000")]));
        assert_eq!(configured.get("message.timeout.ms"), Some("20000"));
    }
}
