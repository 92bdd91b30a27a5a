/// Header names attached by the retry and dead-letter dispatch paths.
pub mod headers {
    /// Number of retry deliveries already attempted for this message.
    pub const RETRY_ATTEMPT: &str = "retry.attempt";
    /// Delay tier (milliseconds) the re-queued message should wait before redelivery.
    pub const RETRY_DELAY_MS: &str = "retry.delay.ms";
    /// Short description of the failure that dead-lettered the message.
    pub const DEAD_LETTER_MESSAGE: &str = "dead_letter.message";
    /// Full failure chain, including backtrace when available.
    pub const DEAD_LETTER_DETAIL: &str = "dead_letter.detail";
}

/// An owned snapshot of a message delivered by one poll call.
///
/// Owned transiently by the engine for the duration of one dispatch cycle
/// and never mutated. `transport_error` is set when the delivery layer
/// itself failed (e.g. partition EOF, broker error); such messages carry no
/// usable topic or payload and are only ever reported.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    /// Kafka topic
    pub topic: String,
    /// Kafka partition
    pub partition: i32,
    /// Kafka offset
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message payload (if any)
    pub payload: Option<Vec<u8>>,
    /// Message headers
    pub headers: Vec<(String, Vec<u8>)>,
    /// Message timestamp (milliseconds since epoch)
    pub timestamp: Option<i64>,
    /// Delivery-layer error reported instead of a consumable message
    pub transport_error: Option<String>,
}

impl RawMessage {
    /// A message standing in for a delivery-layer failure.
    pub fn from_transport_error(reason: impl Into<String>) -> Self {
        Self {
            partition: -1,
            transport_error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Look up a header value by name. Last occurrence wins, matching
    /// librdkafka's own header semantics.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }

    /// Retry deliveries already attempted, read from the retry-attempt
    /// header. Absent or malformed headers count as zero attempts.
    pub fn retry_attempt(&self) -> u32 {
        self.header(headers::RETRY_ATTEMPT)
            .and_then(|value| std::str::from_utf8(value).ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }
}
