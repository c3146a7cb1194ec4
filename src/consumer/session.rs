// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::{BoundedSender, bounded};
use crate::consumer::claim::{BatchHandler, ClaimLoop, ClaimSettings, OffsetMarker};
use crate::consumer::config::ConsumerConfig;
use crate::consumer::errors::{ConsumerError, HandlerError, Result};
use crate::consumer::message::ClaimMessage;
use rdkafka::consumer::{
    BaseConsumer, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, TopicPartitionList};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type PartitionKey = (String, i32);

enum RebalanceEvent {
    Revoked(Vec<PartitionKey>),
}

fn partitions(tpl: &TopicPartitionList) -> Vec<PartitionKey> {
    tpl.elements()
        .iter()
        .map(|e| (e.topic().to_string(), e.partition()))
        .collect()
}

/// Forwards revocations to the session's dispatcher. Callbacks run inside
/// the consumer's poll, so the channel is unbounded and never blocks.
pub struct LogConsumerContext {
    events: flume::Sender<RebalanceEvent>,
}

impl ClientContext for LogConsumerContext {}

impl ConsumerContext for LogConsumerContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                let revoked = partitions(tpl);
                info!(partitions = ?revoked, "Partitions revoked");
                let _ = self.events.send(RebalanceEvent::Revoked(revoked));
            }
            Rebalance::Assign(tpl) => {
                info!(partitions = ?partitions(tpl), "Partitions assigned");
            }
            Rebalance::Error(e) => {
                error!(error = ?e, "Rebalance failed");
            }
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!(count = offsets.count(), "Committed offsets"),
            Err(e) => debug!(error = %e, "Offset commit did not complete"),
        }
    }
}

type LogStreamConsumer = StreamConsumer<LogConsumerContext>;

fn create_consumer(
    config: &ConsumerConfig,
    events: flume::Sender<RebalanceEvent>,
) -> Result<LogStreamConsumer> {
    config
        .build_client_config()
        .create_with_context(LogConsumerContext { events })
        .map_err(|e| ConsumerError::Configuration(format!("Failed to create consumer: {}", e)))
}

/// Stores the message's position for the next auto-commit. The committed
/// offset is the one after the last marked message.
pub struct StoreOffsetMarker {
    consumer: Arc<LogStreamConsumer>,
}

impl OffsetMarker for StoreOffsetMarker {
    fn mark(&self, message: &ClaimMessage) {
        // librdkafka stores offset + 1 itself
        if let Err(e) =
            self.consumer
                .store_offset(&message.topic, message.partition, message.offset)
        {
            // usually the partition was revoked mid-flush; the new owner re-reads it
            warn!(
                topic = message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to store offset"
            );
        }
    }
}

/// Routes polled messages to one claim task per partition. A claim starts on
/// the partition's first message and is closed on revocation.
pub(crate) struct Dispatcher {
    handler: Arc<dyn BatchHandler>,
    marker: Arc<dyn OffsetMarker>,
    settings: ClaimSettings,
    channel_size: usize,
    cancel: CancellationToken,
    senders: HashMap<PartitionKey, BoundedSender<ClaimMessage>>,
    claims: JoinSet<(PartitionKey, std::result::Result<(), HandlerError>)>,
}

impl Dispatcher {
    pub(crate) fn new(
        handler: Arc<dyn BatchHandler>,
        marker: Arc<dyn OffsetMarker>,
        settings: ClaimSettings,
        channel_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            handler,
            marker,
            settings,
            channel_size,
            cancel,
            senders: HashMap::new(),
            claims: JoinSet::new(),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.senders.len()
    }

    pub(crate) async fn dispatch(&mut self, message: ClaimMessage) {
        let key = (message.topic.clone(), message.partition);
        if !self.senders.contains_key(&key) {
            let sender = self.start_claim(key.clone());
            self.senders.insert(key.clone(), sender);
        }
        let Some(sender) = self.senders.get(&key) else {
            return;
        };

        if sender.send(message).await.is_err() {
            // the claim failed; its error surfaces through next_failure
            debug!("Dropped message for a finished claim");
        }
    }

    fn start_claim(&mut self, key: PartitionKey) -> BoundedSender<ClaimMessage> {
        let (tx, rx) = bounded(self.channel_size);
        let claim = ClaimLoop::new(self.handler.clone(), self.marker.clone(), self.settings);
        let cancel = self.cancel.clone();

        info!(topic = key.0, partition = key.1, "Starting partition claim");
        self.claims
            .spawn(async move { (key, claim.run(rx, cancel).await) });
        tx
    }

    /// Closes the revoked partitions' channels so their claims flush and exit.
    pub(crate) fn revoke(&mut self, partitions: &[PartitionKey]) {
        for key in partitions {
            if self.senders.remove(key).is_some() {
                debug!(topic = key.0, partition = key.1, "Closing partition claim");
            }
        }
    }

    /// Waits for a claim to fail. Pending while no claim has failed.
    pub(crate) async fn next_failure(&mut self) -> ConsumerError {
        loop {
            match self.claims.join_next().await {
                None => std::future::pending::<()>().await,
                Some(Ok((key, Ok(())))) => {
                    debug!(topic = key.0, partition = key.1, "Partition claim finished");
                }
                Some(Ok((key, Err(e)))) => {
                    error!(topic = key.0, partition = key.1, error = %e, "Partition claim failed");
                    return e.into();
                }
                Some(Err(e)) => return ConsumerError::Task(e.to_string()),
            }
        }
    }

    /// Cancels every claim, letting each flush once, and waits for them.
    /// Returns the first failure, if any.
    pub(crate) async fn shutdown(mut self) -> Option<ConsumerError> {
        self.cancel.cancel();
        self.senders.clear();

        let mut first = None;
        while let Some(joined) = self.claims.join_next().await {
            let failure = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((_, Err(e))) => ConsumerError::from(e),
                Err(e) => ConsumerError::Task(e.to_string()),
            };
            warn!(error = %failure, "Partition claim failed during shutdown");
            first.get_or_insert(failure);
        }
        first
    }
}

/// A consumer group member that indexes the log topic. Each session joins
/// the group and runs until cancelled or until a claim fails; after a failure
/// the session is torn down and a new one joins after a backoff.
pub struct ConsumerGroup {
    config: ConsumerConfig,
    handler: Arc<dyn BatchHandler>,
}

impl ConsumerGroup {
    pub fn new(config: ConsumerConfig, handler: Arc<dyn BatchHandler>) -> Self {
        Self { config, handler }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        loop {
            match self.run_session(&cancel).await {
                Ok(()) => return Ok(()),
                Err(e @ (ConsumerError::Handler(_) | ConsumerError::Task(_))) => {
                    warn!(
                        error = %e,
                        backoff = ?self.config.rejoin_backoff,
                        "Consumer session ended, rejoining group"
                    );
                }
                Err(e) => return Err(e),
            }

            select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.config.rejoin_backoff) => {}
            }
        }
    }

    async fn run_session(&self, cancel: &CancellationToken) -> Result<()> {
        let (events_tx, events_rx) = flume::unbounded();
        let consumer = Arc::new(create_consumer(&self.config, events_tx)?);

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| {
                ConsumerError::Configuration(format!(
                    "Failed to subscribe to {}: {}",
                    self.config.topic, e
                ))
            })?;
        info!(
            topic = self.config.topic,
            group_id = self.config.group_id,
            "Joined consumer group"
        );

        let marker = Arc::new(StoreOffsetMarker {
            consumer: consumer.clone(),
        });
        let mut dispatcher = Dispatcher::new(
            self.handler.clone(),
            marker,
            ClaimSettings {
                batch_size: self.config.batch_size,
                batch_timeout: self.config.batch_timeout,
            },
            self.config.partition_channel_size,
            cancel.child_token(),
        );

        let mut failure = None;
        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Consumer session cancelled, shutting down");
                    break;
                }

                e = dispatcher.next_failure() => {
                    failure = Some(e);
                    break;
                }

                Ok(event) = events_rx.recv_async() => {
                    match event {
                        RebalanceEvent::Revoked(revoked) => dispatcher.revoke(&revoked),
                    }
                }

                record = consumer.recv() => {
                    match record {
                        Ok(m) => {
                            let message = ClaimMessage::from_borrowed(&m);
                            drop(m);
                            dispatcher.dispatch(message).await;
                        }
                        Err(e) => warn!(error = %e, "Error reading from Kafka"),
                    }
                }
            }
        }

        let active = dispatcher.active();
        let shutdown_failure = dispatcher.shutdown().await;
        consumer.unsubscribe();
        drop(consumer);
        info!(claims = active, "Consumer session closed");

        match failure.or(shutdown_failure) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
