// SPDX-License-Identifier: Apache-2.0

use crate::kafka_auth::KafkaSecurity;
use rdkafka::ClientConfig;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 10;

/// Broker acknowledgement required before a produce request succeeds
#[derive(Default, Copy, Clone, PartialEq, Debug, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredAcks {
    /// Fire and forget (acks=0)
    None,
    /// Partition leader only (acks=1)
    #[default]
    Leader,
    /// All in-sync replicas (acks=all)
    All,
}

impl RequiredAcks {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            RequiredAcks::None => "0",
            RequiredAcks::Leader => "1",
            RequiredAcks::All => "all",
        }
    }
}

#[derive(Default, Copy, Clone, PartialEq, Debug, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

/// Configuration for the pooled log producers. Every handle in the pool is
/// built from the same settings and writes to a single topic.
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    /// Kafka broker addresses (comma-separated)
    pub brokers: String,

    /// Topic receiving the log lines
    pub topic: String,

    /// Number of producer handles created up front
    pub pool_size: usize,

    pub client_id: String,

    /// Producer side retry count (message.send.max.retries)
    pub retries: u32,

    pub required_acks: RequiredAcks,

    /// Upper bound for a single produce, including retries (message.timeout.ms)
    pub send_timeout: Duration,

    /// Wait for the delivery report before a write returns
    pub return_successes: bool,

    /// Surface delivery failures to the writer instead of only logging them
    pub return_errors: bool,

    pub compression: Compression,

    /// Codec specific level, -1 selects the codec default
    pub compression_level: Option<i32>,

    /// Connection establishment timeout (socket.connection.setup.timeout.ms)
    pub dial_timeout: Duration,

    pub read_timeout: Duration,

    pub write_timeout: Duration,

    /// max.in.flight.requests.per.connection
    pub max_in_flight: u32,

    pub security: KafkaSecurity,

    /// Free-form librdkafka settings, applied last
    pub producer_config: HashMap<String, String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "logs".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            client_id: "logpipe".to_string(),
            retries: 3,
            required_acks: RequiredAcks::default(),
            send_timeout: Duration::from_secs(10),
            return_successes: true,
            return_errors: true,
            compression: Compression::default(),
            compression_level: None,
            dial_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_in_flight: 5,
            security: KafkaSecurity::default(),
            producer_config: HashMap::new(),
        }
    }
}

impl ProducerConfig {
    pub fn new(brokers: String, topic: String) -> Self {
        Self {
            brokers,
            topic,
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_required_acks(mut self, acks: RequiredAcks) -> Self {
        self.required_acks = acks;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_return_successes(mut self, enabled: bool) -> Self {
        self.return_successes = enabled;
        self
    }

    pub fn with_return_errors(mut self, enabled: bool) -> Self {
        self.return_errors = enabled;
        self
    }

    pub fn with_compression(mut self, compression: Compression, level: Option<i32>) -> Self {
        self.compression = compression;
        self.compression_level = level;
        self
    }

    pub fn with_network_timeouts(mut self, dial: Duration, read: Duration, write: Duration) -> Self {
        self.dial_timeout = dial;
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: u32) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_security(mut self, security: KafkaSecurity) -> Self {
        self.security = security;
        self
    }

    /// Set custom producer configuration parameters
    pub fn with_custom_config(mut self, custom_config: Vec<(String, String)>) -> Self {
        for (key, value) in custom_config {
            self.producer_config.insert(key, value);
        }
        self
    }

    /// Build rdkafka ClientConfig from this configuration
    pub fn build_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();

        config.set("bootstrap.servers", &self.brokers);
        config.set("client.id", &self.client_id);

        config.set("message.send.max.retries", self.retries.to_string());
        config.set("acks", self.required_acks.to_kafka_value());
        config.set("message.timeout.ms", millis(self.send_timeout));

        config.set("compression.type", self.compression.to_kafka_value());
        if let Some(level) = self.compression_level {
            config.set("compression.level", level.to_string());
        }

        config.set(
            "socket.connection.setup.timeout.ms",
            millis(self.dial_timeout),
        );
        // librdkafka has a single socket timeout for both directions
        config.set(
            "socket.timeout.ms",
            millis(self.read_timeout.max(self.write_timeout)),
        );
        config.set(
            "max.in.flight.requests.per.connection",
            self.max_in_flight.to_string(),
        );

        self.security.apply(&mut config);

        // Set custom producer configuration (overrides built-in options if conflicts exist)
        for (key, value) in &self.producer_config {
            config.set(key, value);
        }

        config
    }
}

fn millis(d: Duration) -> String {
    d.as_millis().to_string()
}
