// SPDX-License-Identifier: Apache-2.0

use crate::consumer::config::ConsumerConfig;
use crate::consumer::errors::DlqError;
use crate::consumer::message::ClaimMessage;
use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::info;

pub const DLQ_REASON_HEADER: &str = "dlq_reason";
pub const ORIGINAL_TOPIC_HEADER: &str = "original_topic";
pub const ORIGINAL_PARTITION_HEADER: &str = "original_partition";
pub const ORIGINAL_OFFSET_HEADER: &str = "original_offset";

#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    /// Produces the message unchanged to the dead-letter topic, tagged with
    /// `reason` and its provenance.
    async fn send(&self, message: &ClaimMessage, reason: &str) -> Result<(), DlqError>;
}

/// The four provenance headers in the order they are written.
pub fn provenance_headers(message: &ClaimMessage, reason: &str) -> Vec<(&'static str, String)> {
    vec![
        (DLQ_REASON_HEADER, reason.to_string()),
        (ORIGINAL_TOPIC_HEADER, message.topic.clone()),
        (ORIGINAL_PARTITION_HEADER, message.partition.to_string()),
        (ORIGINAL_OFFSET_HEADER, message.offset.to_string()),
    ]
}

pub struct KafkaDeadLetterQueue {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaDeadLetterQueue {
    pub fn new(config: &ConsumerConfig) -> Result<Self, DlqError> {
        let producer: FutureProducer = config
            .build_dlq_client_config()
            .create()
            .map_err(|e| DlqError::Configuration(e.to_string()))?;

        Ok(Self {
            producer,
            topic: config.dlq_topic(),
            send_timeout: Duration::from_secs(30),
        })
    }

    pub fn dlq_topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl DeadLetterQueue for KafkaDeadLetterQueue {
    async fn send(&self, message: &ClaimMessage, reason: &str) -> Result<(), DlqError> {
        let mut headers = OwnedHeaders::new_with_capacity(message.headers.len() + 4);
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key,
                value: Some(&value[..]),
            });
        }
        for (key, value) in provenance_headers(message, reason) {
            headers = headers.insert(Header {
                key,
                value: Some(value.as_str()),
            });
        }

        let mut record = FutureRecord::<[u8], [u8]>::to(&self.topic)
            .payload(&message.value[..])
            .headers(headers);
        if let Some(key) = &message.key {
            record = record.key(&key[..]);
        }

        match self.producer.send(record, self.send_timeout).await {
            Ok((_, dlq_offset)) => {
                info!(
                    dlq_topic = self.topic,
                    reason,
                    original_partition = message.partition,
                    original_offset = message.offset,
                    dlq_offset,
                    "Routed message to dead-letter topic"
                );
                Ok(())
            }
            Err((error, _)) => Err(DlqError::Produce {
                topic: self.topic.clone(),
                error,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct DeadLetter {
        pub(crate) value: bytes::Bytes,
        pub(crate) headers: Vec<(&'static str, String)>,
    }

    #[derive(Default)]
    pub(crate) struct RecordingDlq {
        pub(crate) fail: bool,
        pub(crate) sent: Mutex<Vec<DeadLetter>>,
    }

    impl RecordingDlq {
        pub(crate) fn sent(&self) -> Vec<DeadLetter> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeadLetterQueue for RecordingDlq {
        async fn send(&self, message: &ClaimMessage, reason: &str) -> Result<(), DlqError> {
            if self.fail {
                return Err(DlqError::Produce {
                    topic: "logs_dlq".to_string(),
                    error: rdkafka::error::KafkaError::Canceled,
                });
            }
            self.sent.lock().unwrap().push(DeadLetter {
                value: message.value.clone(),
                headers: provenance_headers(message, reason),
            });
            Ok(())
        }
    }
}
