// SPDX-License-Identifier: Apache-2.0

use crate::search::errors::Result;
use crate::search::{BulkDocument, BulkFailure, BulkOutcome};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// Encodes documents as an NDJSON bulk body of `index` actions keyed by id.
pub fn encode_bulk(docs: &[BulkDocument]) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(docs.len() * 256);
    for doc in docs {
        serde_json::to_writer(&mut buf, &json!({ "index": { "_id": doc.id } }))?;
        buf.push(b'\n');
        serde_json::to_writer(&mut buf, &doc.source)?;
        buf.push(b'\n');
    }
    Ok(Bytes::from(buf))
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<BulkItemError>,
}

#[derive(Deserialize)]
struct BulkItemError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Splits a bulk response into indexed documents and per-document failures.
pub fn parse_bulk_response(body: &[u8]) -> Result<BulkOutcome> {
    let resp: BulkResponse = serde_json::from_slice(body)?;

    let mut outcome = BulkOutcome::default();
    // each item is a single key object naming the action
    for item in resp.items.into_iter().flat_map(HashMap::into_values) {
        if item.error.is_none() && item.status < 300 {
            outcome.indexed += 1;
            continue;
        }
        let (reason, detail) = match item.error {
            Some(e) => (
                e.kind.unwrap_or_else(|| "unknown".to_string()),
                e.reason.unwrap_or_default(),
            ),
            None => ("unknown".to_string(), String::new()),
        };
        outcome.failures.push(BulkFailure {
            id: item.id.unwrap_or_default(),
            status: item.status,
            reason,
            detail,
        });
    }
    Ok(outcome)
}
