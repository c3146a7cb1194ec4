// SPDX-License-Identifier: Apache-2.0

use crate::consumer::claim::BatchHandler;
use crate::consumer::dlq::DeadLetterQueue;
use crate::consumer::errors::HandlerError;
use crate::consumer::message::ClaimMessage;
use crate::entry::Ksuid;
use crate::search::{BulkDocument, SearchBackend};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const INVALID_DOCUMENT_ID: &str = "invalid_document_id";

/// Indexes each batch with one bulk request, using the entry's `id` as the
/// document id. Messages that cannot be indexed go to the dead-letter queue.
pub struct IndexingHandler {
    backend: Arc<dyn SearchBackend>,
    dlq: Arc<dyn DeadLetterQueue>,
    index: String,
}

impl IndexingHandler {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        dlq: Arc<dyn DeadLetterQueue>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            dlq,
            index: index.into(),
        }
    }
}

fn document_id(source: &Value) -> Option<String> {
    let id = source.get("id")?.as_str()?;
    id.parse::<Ksuid>().ok()?;
    Some(id.to_string())
}

#[async_trait]
impl BatchHandler for IndexingHandler {
    async fn handle(&self, batch: &[ClaimMessage]) -> Result<(), HandlerError> {
        let mut docs = Vec::with_capacity(batch.len());
        let mut by_id: HashMap<String, &ClaimMessage> = HashMap::with_capacity(batch.len());

        for message in batch {
            let source: Value = match serde_json::from_slice(&message.value) {
                Ok(source) => source,
                Err(e) => {
                    self.dlq
                        .send(message, &format!("json_parse_error: {}", e))
                        .await?;
                    continue;
                }
            };

            let Some(id) = document_id(&source) else {
                self.dlq.send(message, INVALID_DOCUMENT_ID).await?;
                continue;
            };

            by_id.insert(id.clone(), message);
            docs.push(BulkDocument { id, source });
        }

        if docs.is_empty() {
            return Ok(());
        }

        let outcome = self.backend.bulk_index(&self.index, &docs).await?;

        let transient: Vec<_> = outcome.failures.iter().filter(|f| f.is_transient()).collect();
        if let Some(first) = transient.first() {
            return Err(HandlerError::Retryable {
                failed: transient.len(),
                reason: first.reason.clone(),
            });
        }

        let mut unknown = 0;
        for failure in &outcome.failures {
            match by_id.get(&failure.id) {
                Some(message) => {
                    debug!(id = failure.id, detail = failure.detail, "Document rejected");
                    self.dlq
                        .send(message, &format!("indexing_error: {}", failure.reason))
                        .await?;
                }
                None => {
                    warn!(id = failure.id, "Bulk failure for a document not in this batch");
                    unknown += 1;
                }
            }
        }

        debug!(
            index = self.index,
            indexed = outcome.indexed,
            failed = outcome.failures.len(),
            unknown,
            "Bulk request complete"
        );
        Ok(())
    }
}
