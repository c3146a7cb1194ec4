// SPDX-License-Identifier: Apache-2.0

use crate::consumer::{AutoOffsetReset, ConsumerConfig, DEFAULT_BATCH_SIZE};
use crate::init::parse::{parse_endpoint, parse_key_val};
use crate::kafka_auth::{KafkaSecurity, SaslMechanism, SecurityProtocol};
use crate::producer::{Compression, ProducerConfig, RequiredAcks};
use crate::search::SearchConfig;
use clap::{Args, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Args, Clone)]
pub struct KafkaSecurityArgs {
    /// SASL username for authentication
    #[arg(long, env = "LOGPIPE_KAFKA_SASL_USERNAME")]
    pub kafka_sasl_username: Option<String>,

    /// SASL password for authentication
    #[arg(long, env = "LOGPIPE_KAFKA_SASL_PASSWORD")]
    pub kafka_sasl_password: Option<String>,

    /// SASL mechanism
    #[arg(value_enum, long, env = "LOGPIPE_KAFKA_SASL_MECHANISM")]
    pub kafka_sasl_mechanism: Option<SaslMechanism>,

    /// Security protocol
    #[arg(value_enum, long, env = "LOGPIPE_KAFKA_SECURITY_PROTOCOL")]
    pub kafka_security_protocol: Option<SecurityProtocol>,

    /// SSL CA certificate location
    #[arg(long, env = "LOGPIPE_KAFKA_SSL_CA_LOCATION")]
    pub kafka_ssl_ca_location: Option<String>,

    /// SSL certificate location
    #[arg(long, env = "LOGPIPE_KAFKA_SSL_CERTIFICATE_LOCATION")]
    pub kafka_ssl_certificate_location: Option<String>,

    /// SSL key location
    #[arg(long, env = "LOGPIPE_KAFKA_SSL_KEY_LOCATION")]
    pub kafka_ssl_key_location: Option<String>,

    /// SSL key password
    #[arg(long, env = "LOGPIPE_KAFKA_SSL_KEY_PASSWORD")]
    pub kafka_ssl_key_password: Option<String>,
}

impl KafkaSecurityArgs {
    pub fn build_security(&self) -> KafkaSecurity {
        let mut security = KafkaSecurity::default();
        if let (Some(username), Some(password)) =
            (&self.kafka_sasl_username, &self.kafka_sasl_password)
        {
            security = security.with_sasl_auth(
                username.clone(),
                password.clone(),
                self.kafka_sasl_mechanism.unwrap_or(SaslMechanism::Plain),
                self.kafka_security_protocol
                    .unwrap_or(SecurityProtocol::SaslPlaintext),
            );
        } else {
            security.security_protocol = self.kafka_security_protocol;
        }
        security.with_ssl_config(
            self.kafka_ssl_ca_location.clone(),
            self.kafka_ssl_certificate_location.clone(),
            self.kafka_ssl_key_location.clone(),
            self.kafka_ssl_key_password.clone(),
        )
    }
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    /// Search engine base URL
    #[arg(long, env = "LOGPIPE_SEARCH_ADDRESS", default_value = "http://localhost:9200")]
    pub search_address: String,

    /// Basic auth username
    #[arg(long, env = "LOGPIPE_SEARCH_USERNAME")]
    pub search_username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "LOGPIPE_SEARCH_PASSWORD")]
    pub search_password: Option<String>,

    /// Hex SHA-256 fingerprint of the server certificate, colons optional
    #[arg(long, env = "LOGPIPE_SEARCH_CERT_FINGERPRINT")]
    pub search_cert_fingerprint: Option<String>,

    /// Index holding the log entries
    #[arg(long, env = "LOGPIPE_SEARCH_INDEX", default_value = "logs")]
    pub search_index: String,

    /// Request timeout
    #[arg(long, env = "LOGPIPE_SEARCH_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    pub search_timeout: Duration,
}

impl SearchArgs {
    pub fn build_config(&self) -> SearchConfig {
        let mut config = SearchConfig::new(self.search_address.clone())
            .with_index(self.search_index.clone())
            .with_timeout(self.search_timeout);
        if let (Some(username), Some(password)) = (&self.search_username, &self.search_password) {
            config = config.with_basic_auth(username.clone(), password.clone());
        }
        if let Some(fingerprint) = &self.search_cert_fingerprint {
            config = config.with_cert_fingerprint(fingerprint.clone());
        }
        config
    }
}

#[derive(Debug, Args, Clone)]
pub struct ConsumeArgs {
    /// Kafka broker addresses (comma-separated)
    #[arg(long, env = "LOGPIPE_KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    /// Topic holding the log entries
    #[arg(long, env = "LOGPIPE_KAFKA_TOPIC", default_value = "logs")]
    pub kafka_topic: String,

    /// Consumer group ID
    #[arg(long, env = "LOGPIPE_CONSUMER_GROUP_ID", default_value = "logpipe-indexer")]
    pub group_id: String,

    /// Client ID for the Kafka consumer
    #[arg(long, env = "LOGPIPE_CONSUMER_CLIENT_ID", default_value = "logpipe")]
    pub client_id: String,

    /// Messages per bulk request
    #[arg(long, env = "LOGPIPE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Flush a partial batch after this long
    #[arg(long, env = "LOGPIPE_BATCH_TIMEOUT", default_value = "1s", value_parser = humantime::parse_duration)]
    pub batch_timeout: Duration,

    /// Dead-letter topic, defaults to <topic>_dlq
    #[arg(long, env = "LOGPIPE_DLQ_TOPIC")]
    pub dlq_topic: Option<String>,

    /// Buffered messages per partition
    #[arg(long, env = "LOGPIPE_PARTITION_CHANNEL_SIZE", default_value = "1000")]
    pub partition_channel_size: usize,

    /// Auto offset reset behavior when no offset is found
    #[arg(value_enum, long, env = "LOGPIPE_AUTO_OFFSET_RESET", default_value = "earliest")]
    pub auto_offset_reset: AutoOffsetReset,

    /// Session timeout in milliseconds
    #[arg(long, env = "LOGPIPE_SESSION_TIMEOUT_MS", default_value = "30000")]
    pub session_timeout_ms: u32,

    /// Heartbeat interval in milliseconds
    #[arg(long, env = "LOGPIPE_HEARTBEAT_INTERVAL_MS", default_value = "3000")]
    pub heartbeat_interval_ms: u32,

    /// Maximum poll interval in milliseconds
    #[arg(long, env = "LOGPIPE_MAX_POLL_INTERVAL_MS", default_value = "300000")]
    pub max_poll_interval_ms: u32,

    /// Wait before rejoining the group after a failed session
    #[arg(long, env = "LOGPIPE_REJOIN_BACKOFF", default_value = "5s", value_parser = humantime::parse_duration)]
    pub rejoin_backoff: Duration,

    /// Custom Kafka consumer configuration parameters (key=value pairs). These override built-in options.
    #[arg(
        long,
        env = "LOGPIPE_CONSUMER_CUSTOM_CONFIG",
        value_parser = parse_key_val::<String, String>,
        value_delimiter = ','
    )]
    pub consumer_custom_config: Vec<(String, String)>,

    #[command(flatten)]
    pub security: KafkaSecurityArgs,

    #[command(flatten)]
    pub search: SearchArgs,
}

impl ConsumeArgs {
    pub fn build_config(&self) -> ConsumerConfig {
        let mut config = ConsumerConfig::new(
            self.kafka_brokers.clone(),
            self.kafka_topic.clone(),
            self.group_id.clone(),
        )
        .with_client_id(self.client_id.clone())
        .with_batch(self.batch_size, self.batch_timeout)
        .with_partition_channel_size(self.partition_channel_size)
        .with_auto_offset_reset(self.auto_offset_reset)
        .with_session_timeout_ms(self.session_timeout_ms)
        .with_heartbeat_interval_ms(self.heartbeat_interval_ms)
        .with_max_poll_interval_ms(self.max_poll_interval_ms)
        .with_rejoin_backoff(self.rejoin_backoff)
        .with_security(self.security.build_security())
        .with_custom_config(self.consumer_custom_config.clone());
        if let Some(dlq_topic) = &self.dlq_topic {
            config = config.with_dlq_topic(dlq_topic.clone());
        }
        config
    }
}

/// Settings of the producer used for the query server's own audit entries.
#[derive(Debug, Args, Clone)]
pub struct ProducerArgs {
    /// Kafka broker addresses (comma-separated). Audit logging is off when unset.
    #[arg(long, env = "LOGPIPE_AUDIT_BROKERS")]
    pub audit_brokers: Option<String>,

    /// Topic receiving the audit entries
    #[arg(long, env = "LOGPIPE_AUDIT_TOPIC", default_value = "logs")]
    pub audit_topic: String,

    /// Producer handles kept in the pool
    #[arg(long, env = "LOGPIPE_AUDIT_POOL_SIZE", default_value = "10")]
    pub audit_pool_size: usize,

    /// Producer retries
    #[arg(long, env = "LOGPIPE_AUDIT_RETRIES", default_value = "3")]
    pub audit_retries: u32,

    /// Broker acknowledgement level
    #[arg(value_enum, long, env = "LOGPIPE_AUDIT_ACKS", default_value = "leader")]
    pub audit_acks: RequiredAcks,

    /// Compression codec
    #[arg(value_enum, long, env = "LOGPIPE_AUDIT_COMPRESSION", default_value = "none")]
    pub audit_compression: Compression,

    /// Upper bound for a single produce
    #[arg(long, env = "LOGPIPE_AUDIT_SEND_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    pub audit_send_timeout: Duration,

    /// Custom Kafka producer configuration parameters (key=value pairs). These override built-in options.
    #[arg(
        long,
        env = "LOGPIPE_AUDIT_CUSTOM_CONFIG",
        value_parser = parse_key_val::<String, String>,
        value_delimiter = ','
    )]
    pub audit_custom_config: Vec<(String, String)>,

    /// App name stamped on audit entries
    #[arg(long, env = "LOGPIPE_AUDIT_APP", default_value = "logquery")]
    pub audit_app: String,
}

impl ProducerArgs {
    pub fn build_config(&self, security: KafkaSecurity) -> Option<ProducerConfig> {
        let brokers = self.audit_brokers.clone()?;
        Some(
            ProducerConfig::new(brokers, self.audit_topic.clone())
                .with_pool_size(self.audit_pool_size)
                .with_retries(self.audit_retries)
                .with_required_acks(self.audit_acks)
                .with_compression(self.audit_compression, None)
                .with_send_timeout(self.audit_send_timeout)
                .with_security(security)
                .with_custom_config(self.audit_custom_config.clone()),
        )
    }
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    /// Address the query server listens on
    #[arg(long, env = "LOGPIPE_LISTEN_ADDR", default_value = "localhost:8080", value_parser = parse_endpoint)]
    pub listen_addr: SocketAddr,

    /// CSV file of `cidr,country` rows for the unusual IP report
    #[arg(long, env = "LOGPIPE_GEO_DB")]
    pub geo_db: Option<String>,

    /// Entries per page
    #[arg(long, env = "LOGPIPE_PAGE_SIZE", default_value = "5")]
    pub page_size: usize,

    /// Time allowed to read request headers
    #[arg(long, env = "LOGPIPE_HEADER_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub header_timeout: Duration,

    #[command(flatten)]
    pub search: SearchArgs,

    #[command(flatten)]
    pub audit: ProducerArgs,

    #[command(flatten)]
    pub security: KafkaSecurityArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Consume {
        #[command(flatten)]
        args: ConsumeArgs,
    }

    #[derive(Debug, Parser)]
    struct Serve {
        #[command(flatten)]
        args: ServeArgs,
    }

    #[test]
    fn test_consume_defaults() {
        let parsed = Consume::try_parse_from(["logpipe"]).unwrap();
        let config = parsed.args.build_config();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.topic, "logs");
        assert_eq!(config.group_id, "logpipe-indexer");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_timeout, Duration::from_secs(1));
        assert_eq!(config.dlq_topic(), "logs_dlq");
        assert_eq!(parsed.args.search.build_config().index, "logs");
    }

    #[test]
    fn test_consume_flags() {
        let parsed = Consume::try_parse_from([
            "logpipe",
            "--kafka-topic",
            "applogs",
            "--batch-size",
            "500",
            "--batch-timeout",
            "250ms",
            "--dlq-topic",
            "poison",
            "--kafka-sasl-username",
            "user",
            "--kafka-sasl-password",
            "secret",
            "--consumer-custom-config",
            "fetch.min.bytes=10,queued.min.messages=5",
        ])
        .unwrap();
        let config = parsed.args.build_config();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.batch_timeout, Duration::from_millis(250));
        assert_eq!(config.dlq_topic(), "poison");
        assert_eq!(config.security.sasl_mechanism, Some(SaslMechanism::Plain));
        assert_eq!(
            config.security.security_protocol,
            Some(SecurityProtocol::SaslPlaintext)
        );

        let client = config.build_client_config();
        assert_eq!(client.get("fetch.min.bytes"), Some("10"));
        assert_eq!(client.get("queued.min.messages"), Some("5"));
    }

    #[test]
    fn test_serve_args() {
        let parsed = Serve::try_parse_from(["logpipe", "--listen-addr", "localhost:9000"]).unwrap();
        assert_eq!(parsed.args.listen_addr.port(), 9000);
        assert!(parsed.args.listen_addr.ip().is_loopback());
        assert!(parsed.args.audit.build_config(KafkaSecurity::default()).is_none());

        let parsed = Serve::try_parse_from([
            "logpipe",
            "--audit-brokers",
            "kafka:9092",
            "--audit-acks",
            "all",
            "--search-cert-fingerprint",
            "ab:cd",
        ])
        .unwrap();
        let producer = parsed
            .args
            .audit
            .build_config(parsed.args.security.build_security())
            .unwrap();
        assert_eq!(producer.brokers, "kafka:9092");
        assert_eq!(producer.required_acks, RequiredAcks::All);
        assert_eq!(
            parsed.args.search.build_config().cert_fingerprint.as_deref(),
            Some("ab:cd")
        );
    }
}
