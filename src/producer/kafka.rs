// SPDX-License-Identifier: Apache-2.0

use crate::producer::config::ProducerConfig;
use crate::producer::errors::{ProducerError, Result};
use crate::producer::pool::SyncProducer;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, warn};

/// A producer bound to one topic whose `send` returns only after the message
/// is enqueued (and, with `return_successes`, acknowledged by the broker).
pub struct KafkaSyncProducer {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
    return_successes: bool,
    return_errors: bool,
}

impl KafkaSyncProducer {
    pub fn new(config: &ProducerConfig) -> Result<Self> {
        let producer: FutureProducer = config.build_client_config().create().map_err(|e| {
            ProducerError::Configuration(format!("Failed to create producer: {}", e))
        })?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            send_timeout: config.send_timeout,
            return_successes: config.return_successes,
            return_errors: config.return_errors,
        })
    }

    fn failed(&self, error: KafkaError) -> Result<()> {
        if self.return_errors {
            return Err(error.into());
        }
        warn!(topic = self.topic, error = %error, "Dropped log message after delivery failure");
        Ok(())
    }
}

impl SyncProducer for KafkaSyncProducer {
    fn send(&self, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload);

        // send_result does not require an async runtime
        let delivery = match self.producer.send_result(record) {
            Ok(delivery) => delivery,
            Err((e, _)) => return self.failed(e),
        };

        if !self.return_successes {
            return Ok(());
        }

        match futures::executor::block_on(delivery) {
            Ok(Ok(_)) => {
                debug!(topic = self.topic, "Log message delivered");
                Ok(())
            }
            Ok(Err((e, _))) => self.failed(e),
            Err(_) => self.failed(KafkaError::Canceled),
        }
    }

    fn close(&self) -> Result<()> {
        self.producer
            .flush(Timeout::After(self.send_timeout))
            .map_err(ProducerError::from)
    }
}
