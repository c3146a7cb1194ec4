// SPDX-License-Identifier: Apache-2.0

//! Structured application logging over Kafka.
//!
//! Applications write [`entry::LogEntry`] records through an immutable
//! [`logger::Logger`] backed by a pooled Kafka producer with a local fallback.
//! The ingestion side consumes the topic in batches and indexes the entries
//! into a search engine, routing poison messages to a dead-letter topic. The
//! [`query`] engine and its HTTP [`server`] read them back.

pub mod bounded_channel;
pub mod consumer;
pub mod entry;
pub mod init;
pub mod kafka_auth;
pub mod logger;
pub mod producer;
pub mod query;
pub mod search;
pub mod server;
