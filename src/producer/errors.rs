// SPDX-License-Identifier: Apache-2.0

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Errors from the pooled log producers
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Kafka producer error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Producer pool is closed")]
    PoolClosed,
}

impl From<(KafkaError, rdkafka::message::OwnedMessage)> for ProducerError {
    fn from((error, _): (KafkaError, rdkafka::message::OwnedMessage)) -> Self {
        ProducerError::Kafka(error)
    }
}

/// Errors from a log sink write
#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProducerError>;
