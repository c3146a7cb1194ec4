// SPDX-License-Identifier: Apache-2.0

use crate::search::SearchError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Errors from producing to the dead-letter topic
#[derive(Error, Debug)]
pub enum DlqError {
    #[error("Failed to create dead-letter producer: {0}")]
    Configuration(String),

    #[error("Failed to produce to dead-letter topic {topic}: {error}")]
    Produce { topic: String, error: KafkaError },
}

/// A batch handler failure. The batch is not marked and will be redelivered.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Bulk request failed: {0}")]
    Bulk(#[from] SearchError),

    #[error(transparent)]
    DeadLetter(#[from] DlqError),

    #[error("{failed} documents failed with retryable errors, first: {reason}")]
    Retryable { failed: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Kafka consumer error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Batch handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("Partition task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ConsumerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::Retryable {
            failed: 2,
            reason: "es_rejected_execution_exception".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "2 documents failed with retryable errors, first: es_rejected_execution_exception"
        );

        let err = ConsumerError::from(HandlerError::Bulk(SearchError::Timeout));
        assert_eq!(
            err.to_string(),
            "Batch handler failed: Bulk request failed: Search engine request timed out"
        );
    }
}
