// SPDX-License-Identifier: Apache-2.0

//! Kafka Integration Tests
//!
//! These tests require a running Kafka broker on localhost:9092 with topic
//! auto-creation enabled.
//!
//! To run these tests:
//! cargo test --test kafka_integration_tests --features integration-tests

#![cfg(feature = "integration-tests")]

use async_trait::async_trait;
use logpipe::consumer::{
    BatchHandler, ClaimMessage, ConsumerConfig, ConsumerGroup, DLQ_REASON_HEADER,
    DeadLetterQueue, HandlerError, KafkaDeadLetterQueue, ORIGINAL_OFFSET_HEADER,
    ORIGINAL_TOPIC_HEADER,
};
use logpipe::entry::{Ksuid, LogEntry, Priority};
use logpipe::logger::{Logger, LoggerContext};
use logpipe::producer::{FallbackWriter, KafkaSink, MemorySink, ProducerConfig};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const KAFKA_BROKER: &str = "localhost:9092";
const TEST_TIMEOUT: Duration = Duration::from_secs(30);

fn generate_unique_topic(base: &str) -> String {
    format!("{}-{}", base, Ksuid::new())
}

fn setup_consumer(topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", format!("test-consumer-{}", Ksuid::new()))
        .set("bootstrap.servers", KAFKA_BROKER)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("Consumer creation failed");

    consumer
        .subscribe(&[topic])
        .expect("Failed to subscribe to topic");

    consumer
}

fn logger_for(topic: &str, fallback: MemorySink) -> (Logger, Arc<FallbackWriter>) {
    let config = ProducerConfig::new(KAFKA_BROKER.to_string(), topic.to_string()).with_pool_size(2);
    let sink = KafkaSink::connect(&config).expect("Failed to create producer pool");
    let writer = Arc::new(FallbackWriter::new(sink, fallback));
    let logger = Logger::new(
        Arc::new(LoggerContext::new(Priority::Info)),
        "itest",
        writer.clone(),
    )
    .with_who("tester")
    .with_op("write")
    .with_class("suite")
    .with_instance("one")
    .with_remote_ip("127.0.0.1");
    (logger, writer)
}

#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<ClaimMessage>>,
}

#[async_trait]
impl BatchHandler for Collect {
    async fn handle(&self, batch: &[ClaimMessage]) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

#[tokio::test]
async fn test_logger_writes_to_topic() {
    let topic = generate_unique_topic("logpipe_logs");
    let consumer = setup_consumer(&topic);
    let fallback = MemorySink::new();

    let (logger, writer) = logger_for(&topic, fallback.clone());
    tokio::task::spawn_blocking(move || {
        logger
            .log_activity("user login", &json!({ "username": "john" }))
            .expect("Failed to log");
        writer.close().expect("Failed to close writer");
    })
    .await
    .unwrap();
    assert!(fallback.is_empty(), "entry went to the fallback writer");

    let message = timeout(TEST_TIMEOUT, consumer.recv())
        .await
        .expect("No message received from Kafka")
        .expect("Kafka receive failed");
    let entry = LogEntry::from_line(message.payload().unwrap()).expect("Message is not a log entry");
    assert_eq!(entry.app, "itest");
    assert_eq!(entry.msg, "user login");
}

#[tokio::test]
async fn test_consumer_group_delivers_batches() {
    let topic = generate_unique_topic("logpipe_consume");
    let fallback = MemorySink::new();
    let (logger, writer) = logger_for(&topic, fallback.clone());
    tokio::task::spawn_blocking(move || {
        for i in 0..5 {
            logger.log_fmt(format_args!("entry {}", i)).expect("Failed to log");
        }
        writer.close().expect("Failed to close writer");
    })
    .await
    .unwrap();

    let config = ConsumerConfig::new(
        KAFKA_BROKER.to_string(),
        topic.clone(),
        format!("logpipe-itest-{}", Ksuid::new()),
    )
    .with_batch(2, Duration::from_millis(200));
    let handler = Arc::new(Collect::default());
    let group = ConsumerGroup::new(config, handler.clone());

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { group.run(cancel).await })
    };

    let received = timeout(TEST_TIMEOUT, async {
        loop {
            if handler.seen.lock().unwrap().len() >= 5 {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    assert!(received.is_ok(), "Consumer group did not deliver all entries");

    cancel.cancel();
    run.await.unwrap().expect("Consumer group failed");

    let seen = handler.seen.lock().unwrap();
    let mut offsets: Vec<i64> = seen.iter().map(|m| m.offset).collect();
    offsets.sort();
    offsets.dedup();
    assert_eq!(offsets.len(), 5);
}

#[tokio::test]
async fn test_dead_letter_queue() {
    let topic = generate_unique_topic("logpipe_source");
    let config = ConsumerConfig::new(KAFKA_BROKER.to_string(), topic.clone(), "unused".to_string());
    let dlq = KafkaDeadLetterQueue::new(&config).expect("Failed to create DLQ producer");
    assert_eq!(dlq.dlq_topic(), format!("{}_dlq", topic));

    let consumer = setup_consumer(dlq.dlq_topic());
    sleep(Duration::from_secs(2)).await;

    let original = ClaimMessage::new(topic.clone(), 0, 42, "{not json");
    dlq.send(&original, "json_parse_error: expected value")
        .await
        .expect("Failed to produce to DLQ");

    let message = timeout(TEST_TIMEOUT, consumer.recv())
        .await
        .expect("No message received from DLQ")
        .expect("Kafka receive failed");
    assert_eq!(message.payload(), Some(&b"{not json"[..]));

    let headers = message.headers().expect("DLQ message has no headers");
    let header = |name: &str| {
        headers
            .iter()
            .find(|h| h.key == name)
            .and_then(|h| h.value)
            .map(|v| String::from_utf8_lossy(v).to_string())
    };
    assert_eq!(
        header(DLQ_REASON_HEADER).as_deref(),
        Some("json_parse_error: expected value")
    );
    assert_eq!(header(ORIGINAL_TOPIC_HEADER), Some(topic));
    assert_eq!(header(ORIGINAL_OFFSET_HEADER).as_deref(), Some("42"));
}
