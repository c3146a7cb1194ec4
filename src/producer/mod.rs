// SPDX-License-Identifier: Apache-2.0

//! Producer side transport for log lines: a bounded pool of synchronous
//! Kafka producers and a writer that falls back to a local sink.

pub mod config;
pub mod errors;
mod fallback;
mod kafka;
mod pool;
mod sink;

pub use config::{Compression, ProducerConfig, RequiredAcks};
pub use errors::{ProducerError, SinkError};
pub use fallback::FallbackWriter;
pub use kafka::KafkaSyncProducer;
pub use pool::{ProducerPool, PooledProducer, SyncProducer};
pub use sink::{KafkaSink, LogSink, MemorySink, StreamSink};
