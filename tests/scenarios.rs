// SPDX-License-Identifier: Apache-2.0

//! End-to-end behavior of the producer, consumer and query paths against
//! in-memory brokers and search backends.

use async_trait::async_trait;
use logpipe::bounded_channel::bounded;
use logpipe::consumer::{
    BatchHandler, ClaimLoop, ClaimMessage, ClaimSettings, DLQ_REASON_HEADER, DeadLetterQueue,
    DlqError, HandlerError, IndexingHandler, ORIGINAL_OFFSET_HEADER, OffsetMarker,
    provenance_headers,
};
use logpipe::entry::{Ksuid, LogEntry, LogType, Priority};
use logpipe::logger::{Logger, LoggerContext};
use logpipe::producer::{FallbackWriter, MemorySink};
use logpipe::query::{LogFilter, QueryEngine, QueryError};
use logpipe::search::{BulkDocument, BulkFailure, BulkOutcome, SearchBackend, SearchError};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Marks {
    offsets: Mutex<Vec<(i64, Instant)>>,
}

impl Marks {
    fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().iter().map(|(o, _)| *o).collect()
    }
}

impl OffsetMarker for Marks {
    fn mark(&self, message: &ClaimMessage) {
        self.offsets
            .lock()
            .unwrap()
            .push((message.offset, Instant::now()));
    }
}

struct Stub {
    fail: bool,
}

#[async_trait]
impl BatchHandler for Stub {
    async fn handle(&self, _batch: &[ClaimMessage]) -> Result<(), HandlerError> {
        if self.fail {
            return Err(HandlerError::Retryable {
                failed: 1,
                reason: "es_rejected_execution_exception".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct Dlq {
    sent: Mutex<Vec<(Vec<u8>, Vec<(&'static str, String)>)>>,
}

#[async_trait]
impl DeadLetterQueue for Dlq {
    async fn send(&self, message: &ClaimMessage, reason: &str) -> Result<(), DlqError> {
        self.sent
            .lock()
            .unwrap()
            .push((message.value.to_vec(), provenance_headers(message, reason)));
        Ok(())
    }
}

/// Rejects the documents listed in `reject` and records every search body.
#[derive(Default)]
struct Search {
    reject: Vec<String>,
    response: Value,
    searches: Mutex<Vec<Value>>,
}

#[async_trait]
impl SearchBackend for Search {
    async fn ping(&self) -> Result<(), SearchError> {
        Ok(())
    }

    async fn create_index(&self, _index: &str, _body: &Value) -> Result<(), SearchError> {
        Ok(())
    }

    async fn bulk_index(
        &self,
        _index: &str,
        docs: &[BulkDocument],
    ) -> Result<BulkOutcome, SearchError> {
        let failures: Vec<BulkFailure> = docs
            .iter()
            .filter(|d| self.reject.contains(&d.id))
            .map(|d| BulkFailure {
                id: d.id.clone(),
                status: 400,
                reason: "mapper_parsing_exception".to_string(),
                detail: "failed to parse field [when]".to_string(),
            })
            .collect();
        Ok(BulkOutcome {
            indexed: docs.len() - failures.len(),
            failures,
        })
    }

    async fn search(&self, _index: &str, body: &Value) -> Result<Value, SearchError> {
        self.searches.lock().unwrap().push(body.clone());
        Ok(self.response.clone())
    }
}

fn claim_loop(handler: Arc<dyn BatchHandler>, batch_size: usize, timeout: Duration) -> (ClaimLoop, Arc<Marks>) {
    let marks = Arc::new(Marks::default());
    let settings = ClaimSettings {
        batch_size,
        batch_timeout: timeout,
    };
    (ClaimLoop::new(handler, marks.clone(), settings), marks)
}

#[test]
fn basic_activity_log() {
    let primary = MemorySink::new();
    let fallback = MemorySink::new();
    let writer = Arc::new(FallbackWriter::new(primary.clone(), fallback.clone()));
    let ctx = Arc::new(LoggerContext::new(Priority::Info));

    let logger = Logger::new(ctx, "myapp", writer)
        .with_who("john")
        .with_op("login")
        .with_class("session")
        .with_instance("web1")
        .with_remote_ip("10.0.0.7");
    logger
        .log_activity("user login", &json!({ "username": "john" }))
        .unwrap();

    assert!(fallback.is_empty());
    let lines = primary.lines();
    assert_eq!(lines.len(), 1);

    let text = String::from_utf8(lines[0].clone()).unwrap();
    for fragment in [
        r#""app":"myapp""#,
        r#""type":"A""#,
        r#""pri":"Info""#,
        r#""msg":"user login""#,
    ] {
        assert!(text.contains(fragment), "{} missing from {}", fragment, text);
    }

    let entry = LogEntry::from_line(&lines[0]).unwrap();
    assert_eq!(entry.id.len(), 27);
    assert!(entry.id.parse::<Ksuid>().is_ok());
    assert_eq!(entry.log_type, LogType::Activity);
}

#[test]
fn gated_and_invalid_entries() {
    let primary = MemorySink::new();
    let fallback = MemorySink::new();
    let writer = Arc::new(FallbackWriter::new(primary.clone(), fallback.clone()));
    let logger = Logger::new(Arc::new(LoggerContext::new(Priority::Warn)), "myapp", writer)
        .with_who("john")
        .with_op("login")
        .with_class("session")
        .with_instance("web1")
        .with_remote_ip("10.0.0.7");

    logger.info().log("below the threshold").unwrap();
    assert!(primary.is_empty());
    assert!(fallback.is_empty());

    assert!(logger.warn().with_remote_ip("not-an-ip").log("broken").is_err());
    assert!(primary.is_empty());
    assert_eq!(fallback.len(), 1);
}

#[tokio::test]
async fn size_triggered_batch() {
    let (claim, marks) = claim_loop(
        Arc::new(Stub { fail: false }),
        2,
        Duration::from_millis(100),
    );
    let (tx, rx) = bounded(10);
    tx.send(ClaimMessage::new("logs", 0, 1, "a")).await.unwrap();
    tx.send(ClaimMessage::new("logs", 0, 2, "b")).await.unwrap();
    drop(tx);

    claim.run(rx, CancellationToken::new()).await.unwrap();
    assert_eq!(marks.offsets(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn timeout_triggered_batch() {
    let (claim, marks) = claim_loop(
        Arc::new(Stub { fail: false }),
        10,
        Duration::from_millis(50),
    );
    let (tx, rx) = bounded(10);
    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { claim.run(rx, cancel).await })
    };

    let fed_at = Instant::now();
    tx.send(ClaimMessage::new("logs", 0, 1, "a")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let marked = marks.offsets.lock().unwrap().clone();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].0, 1);
    let waited = marked[0].1 - fed_at;
    assert!(waited >= Duration::from_millis(50), "{:?}", waited);
    assert!(waited < Duration::from_millis(100), "{:?}", waited);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn handler_failure_marks_nothing() {
    let (claim, marks) = claim_loop(
        Arc::new(Stub { fail: true }),
        2,
        Duration::from_millis(100),
    );
    let (tx, rx) = bounded(10);
    tx.send(ClaimMessage::new("logs", 0, 1, "a")).await.unwrap();
    tx.send(ClaimMessage::new("logs", 0, 2, "b")).await.unwrap();

    let err = claim.run(rx, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, HandlerError::Retryable { .. }));
    assert!(marks.offsets().is_empty());
}

#[tokio::test]
async fn partial_bulk_failure() {
    let ids: Vec<String> = (0..3).map(|_| Ksuid::new().to_string()).collect();
    let backend = Arc::new(Search {
        reject: vec![ids[1].clone()],
        ..Default::default()
    });
    let dlq = Arc::new(Dlq::default());
    let handler = Arc::new(IndexingHandler::new(backend, dlq.clone(), "logs"));
    let (claim, marks) = claim_loop(handler, 3, Duration::from_secs(1));

    let (tx, rx) = bounded(10);
    let values: Vec<String> = ids
        .iter()
        .map(|id| json!({ "id": id, "msg": "m" }).to_string())
        .collect();
    for (offset, value) in (10..).zip(&values) {
        tx.send(ClaimMessage::new("logs", 0, offset, value.clone()))
            .await
            .unwrap();
    }
    drop(tx);

    claim.run(rx, CancellationToken::new()).await.unwrap();

    let sent = dlq.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (value, headers) = &sent[0];
    assert_eq!(value, values[1].as_bytes());
    assert!(headers.contains(&(
        DLQ_REASON_HEADER,
        "indexing_error: mapper_parsing_exception".to_string()
    )));
    assert!(headers.contains(&(ORIGINAL_OFFSET_HEADER, "11".to_string())));
    assert_eq!(marks.offsets(), vec![10, 11, 12]);
}

#[tokio::test]
async fn time_window_validation() {
    let backend = Arc::new(Search::default());
    let engine = QueryEngine::new(backend.clone(), "logs");

    let filter = LogFilter::default().with_window(
        Some("2024-05-01T00:00:00Z".parse().unwrap()),
        Some("2024-02-01T00:00:00Z".parse().unwrap()),
    );
    let err = engine.get_logs(&filter, None).await.unwrap_err();

    assert!(matches!(err, QueryError::InvalidTimeWindow(_)));
    assert_eq!(err.to_string(), "tots must be after fromts");
    assert!(backend.searches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn facet_with_priority_scoping() {
    let backend = Arc::new(Search {
        response: json!({
            "hits": { "total": { "value": 4 }, "hits": [] },
            "aggregations": {
                "sterms#set": { "buckets": [
                    { "key": "billing", "doc_count": 3 },
                    { "key": "myapp", "doc_count": 1 }
                ] }
            }
        }),
        ..Default::default()
    });
    let engine = QueryEngine::new(backend.clone(), "logs");

    let filter = LogFilter::default().with_priority(Priority::Info);
    let set = engine.get_set("app", &filter).await.unwrap();
    assert_eq!(set.get("billing"), Some(&3));
    assert_eq!(set.get("myapp"), Some(&1));

    let searches = backend.searches.lock().unwrap();
    let clauses = searches[0]["query"]["bool"]["filter"].as_array().unwrap();
    assert!(clauses.contains(&json!({ "terms": { "type": ["A", "D"] } })));
    assert!(clauses.contains(&json!({
        "terms": { "pri": ["Info", "Warn", "Err", "Crit", "Sec"] }
    })));

    let err = engine.get_set("remote_ip", &filter).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidAttribute(_)));
}
