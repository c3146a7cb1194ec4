// SPDX-License-Identifier: Apache-2.0

use crate::kafka_auth::KafkaSecurity;
use rdkafka::ClientConfig;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Auto offset reset behavior
#[derive(Default, Copy, Clone, PartialEq, Debug, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoOffsetReset {
    /// Start from the beginning of the topic
    #[default]
    Earliest,
    /// Start from the end of the topic
    Latest,
    /// Throw error if no offset is found
    Error,
}

impl AutoOffsetReset {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            AutoOffsetReset::Earliest => "earliest",
            AutoOffsetReset::Latest => "latest",
            AutoOffsetReset::Error => "error",
        }
    }
}

/// Configuration for the log ingestion consumer
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Kafka broker addresses (comma-separated)
    pub brokers: String,

    /// Topic carrying log lines
    pub topic: String,

    /// Consumer group ID
    pub group_id: String,

    pub client_id: String,

    /// Messages per bulk request
    pub batch_size: usize,

    /// Maximum time a partial batch waits after its first message
    pub batch_timeout: Duration,

    /// Dead-letter topic; `<topic>_dlq` when unset
    pub dlq_topic: Option<String>,

    /// Buffered messages per partition between the poll loop and the claim
    pub partition_channel_size: usize,

    pub auto_offset_reset: AutoOffsetReset,

    /// Session timeout in milliseconds
    pub session_timeout_ms: u32,

    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u32,

    /// Maximum poll interval in milliseconds
    pub max_poll_interval_ms: u32,

    /// Auto commit interval for stored offsets, in milliseconds
    pub auto_commit_interval_ms: u32,

    /// Delay before a new session joins the group after a failed one
    pub rejoin_backoff: Duration,

    pub security: KafkaSecurity,

    /// Additional librdkafka settings, applied last
    pub consumer_config: HashMap<String, String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "logs".to_string(),
            group_id: "logpipe-indexer".to_string(),
            client_id: "logpipe".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            dlq_topic: None,
            partition_channel_size: 1000,
            auto_offset_reset: AutoOffsetReset::default(),
            session_timeout_ms: 30000,
            heartbeat_interval_ms: 3000,
            max_poll_interval_ms: 300000,
            auto_commit_interval_ms: 5000,
            rejoin_backoff: Duration::from_secs(5),
            security: KafkaSecurity::default(),
            consumer_config: HashMap::new(),
        }
    }
}

impl ConsumerConfig {
    pub fn new(brokers: String, topic: String, group_id: String) -> Self {
        Self {
            brokers,
            topic,
            group_id,
            ..Default::default()
        }
    }

    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_batch(mut self, size: usize, timeout: Duration) -> Self {
        self.batch_size = size.max(1);
        self.batch_timeout = timeout;
        self
    }

    pub fn with_dlq_topic(mut self, topic: String) -> Self {
        self.dlq_topic = Some(topic);
        self
    }

    pub fn with_partition_channel_size(mut self, size: usize) -> Self {
        self.partition_channel_size = size.max(1);
        self
    }

    /// Set auto offset reset behavior
    pub fn with_auto_offset_reset(mut self, reset: AutoOffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    pub fn with_session_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.session_timeout_ms = timeout_ms;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u32) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_max_poll_interval_ms(mut self, interval_ms: u32) -> Self {
        self.max_poll_interval_ms = interval_ms;
        self
    }

    pub fn with_rejoin_backoff(mut self, backoff: Duration) -> Self {
        self.rejoin_backoff = backoff;
        self
    }

    pub fn with_security(mut self, security: KafkaSecurity) -> Self {
        self.security = security;
        self
    }

    /// Set custom consumer configuration parameters
    pub fn with_custom_config(mut self, custom_config: Vec<(String, String)>) -> Self {
        for (key, value) in custom_config {
            self.consumer_config.insert(key, value);
        }
        self
    }

    pub fn dlq_topic(&self) -> String {
        match &self.dlq_topic {
            Some(topic) => topic.clone(),
            None => format!("{}_dlq", self.topic),
        }
    }

    /// Build the consumer configuration. Offsets are stored by the claim
    /// loops after a successful flush and committed in the background.
    pub fn build_client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("client.id", &self.client_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.commit.interval.ms",
                self.auto_commit_interval_ms.to_string(),
            )
            .set("auto.offset.reset", self.auto_offset_reset.to_kafka_value())
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set(
                "heartbeat.interval.ms",
                self.heartbeat_interval_ms.to_string(),
            )
            .set("max.poll.interval.ms", self.max_poll_interval_ms.to_string())
            .set("partition.assignment.strategy", "cooperative-sticky");

        self.security.apply(&mut client_config);

        for (key, value) in &self.consumer_config {
            client_config.set(key, value);
        }

        client_config
    }

    /// Configuration for the dead-letter producer, sharing brokers and
    /// credentials with the consumer.
    pub fn build_dlq_client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", format!("{}-dlq", self.client_id))
            .set("acks", "all")
            .set("message.timeout.ms", "30000");

        self.security.apply(&mut client_config);
        client_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka_auth::{SaslMechanism, SecurityProtocol};

    #[test]
    fn test_default_config() {
        let config = ConsumerConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_timeout, Duration::from_secs(1));
        assert_eq!(config.dlq_topic(), "logs_dlq");
        assert_eq!(config.auto_offset_reset, AutoOffsetReset::Earliest);
    }

    #[test]
    fn test_dlq_topic_override() {
        let config = ConsumerConfig::new(
            "broker:9092".to_string(),
            "app-logs".to_string(),
            "indexers".to_string(),
        );
        assert_eq!(config.dlq_topic(), "app-logs_dlq");

        let config = config.with_dlq_topic("poison".to_string());
        assert_eq!(config.dlq_topic(), "poison");
    }

    #[test]
    fn test_batch_size_floor() {
        let config = ConsumerConfig::default().with_batch(0, Duration::from_millis(50));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.batch_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_build_client_config() {
        let config = ConsumerConfig::new(
            "broker1:9092,broker2:9092".to_string(),
            "logs".to_string(),
            "indexers".to_string(),
        )
        .with_auto_offset_reset(AutoOffsetReset::Latest)
        .with_security(KafkaSecurity::default().with_sasl_auth(
            "user".to_string(),
            "pass".to_string(),
            SaslMechanism::ScramSha256,
            SecurityProtocol::SaslSsl,
        ))
        .with_custom_config(vec![("fetch.min.bytes".to_string(), "10".to_string())]);

        let client_config = config.build_client_config();
        assert_eq!(
            client_config.get("bootstrap.servers"),
            Some("broker1:9092,broker2:9092")
        );
        assert_eq!(client_config.get("group.id"), Some("indexers"));
        assert_eq!(client_config.get("enable.auto.commit"), Some("true"));
        assert_eq!(client_config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(client_config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(
            client_config.get("partition.assignment.strategy"),
            Some("cooperative-sticky")
        );
        assert_eq!(client_config.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
        assert_eq!(client_config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client_config.get("fetch.min.bytes"), Some("10"));
    }

    #[test]
    fn test_dlq_client_config_shares_security() {
        let config = ConsumerConfig::default().with_security(KafkaSecurity::default().with_ssl_config(
            Some("/ca.pem".to_string()),
            None,
            None,
            None,
        ));
        let client_config = config.build_dlq_client_config();
        assert_eq!(client_config.get("client.id"), Some("logpipe-dlq"));
        assert_eq!(client_config.get("security.protocol"), Some("ssl"));
        assert_eq!(client_config.get("ssl.ca.location"), Some("/ca.pem"));
        assert_eq!(client_config.get("group.id"), None);
    }
}
