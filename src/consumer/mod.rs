// SPDX-License-Identifier: Apache-2.0

//! Kafka to search engine ingestion.
//!
//! A [`ConsumerGroup`] session polls the log topic and hands every partition's
//! messages to its own [`ClaimLoop`]. A claim batches messages by size and
//! time and passes each batch to a [`BatchHandler`]; offsets are stored only
//! after the handler succeeds, so delivery is at-least-once.

mod batch;
mod claim;
pub mod config;
mod dlq;
pub mod errors;
mod indexer;
mod message;
mod session;

pub use claim::{BatchHandler, ClaimLoop, ClaimSettings, OffsetMarker};
pub use config::{AutoOffsetReset, ConsumerConfig, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT};
pub use dlq::{
    DLQ_REASON_HEADER, DeadLetterQueue, KafkaDeadLetterQueue, ORIGINAL_OFFSET_HEADER,
    ORIGINAL_PARTITION_HEADER, ORIGINAL_TOPIC_HEADER, provenance_headers,
};
pub use errors::{ConsumerError, DlqError, HandlerError};
pub use indexer::{INVALID_DOCUMENT_ID, IndexingHandler};
pub use message::ClaimMessage;
pub use session::{ConsumerGroup, LogConsumerContext, StoreOffsetMarker};
