use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No handler registered for topic: {0}")]
    UnknownTopic(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Dead letter dispatch error: {0}")]
    DeadLetterDispatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;
