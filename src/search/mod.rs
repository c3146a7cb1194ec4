// SPDX-License-Identifier: Apache-2.0

//! Search engine access: the backend trait used by the consumer and the query
//! engine, and an Elasticsearch compatible HTTP client.

pub mod bulk;
mod client;
pub mod config;
pub mod errors;
mod mapping;
mod tls;

pub use client::ElasticClient;
pub use config::SearchConfig;
pub use errors::SearchError;
pub use mapping::index_mapping;
pub use tls::init_crypto_provider;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    pub id: String,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub id: String,
    pub status: u16,
    /// Engine error type, e.g. `mapper_parsing_exception`
    pub reason: String,
    pub detail: String,
}

impl BulkFailure {
    /// Rejections and server side errors that may succeed on redelivery.
    pub fn is_transient(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub indexed: usize,
    pub failures: Vec<BulkFailure>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn ping(&self) -> Result<(), SearchError>;

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError>;

    /// Indexes all documents in one request. An `Err` means the request as a
    /// whole failed; per-document problems are reported in the outcome.
    async fn bulk_index(&self, index: &str, docs: &[BulkDocument]) -> Result<BulkOutcome, SearchError>;

    /// Runs a search request and returns the raw response body. Aggregation
    /// names in the response are prefixed with their type (`sterms#name`).
    async fn search(&self, index: &str, body: &Value) -> Result<Value, SearchError>;
}
