// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::BoundedReceiver;
use crate::consumer::batch::Batch;
use crate::consumer::errors::HandlerError;
use crate::consumer::message::ClaimMessage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Records a message as processed. Implementations must be callable from any
/// partition task and report their own failures.
pub trait OffsetMarker: Send + Sync {
    fn mark(&self, message: &ClaimMessage);
}

#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Processes a batch from a single partition in broker order. On `Ok`
    /// every message of the batch is marked; on `Err` none are.
    async fn handle(&self, batch: &[ClaimMessage]) -> Result<(), HandlerError>;
}

#[derive(Clone, Copy, Debug)]
pub struct ClaimSettings {
    pub batch_size: usize,
    pub batch_timeout: Duration,
}

/// The per-partition flow: buffers messages and hands full or expired batches
/// to the handler, marking offsets only after the handler succeeds.
pub struct ClaimLoop {
    handler: Arc<dyn BatchHandler>,
    marker: Arc<dyn OffsetMarker>,
    settings: ClaimSettings,
}

impl ClaimLoop {
    pub fn new(
        handler: Arc<dyn BatchHandler>,
        marker: Arc<dyn OffsetMarker>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            handler,
            marker,
            settings,
        }
    }

    /// Runs until the channel closes (partition revoked) or `cancel` fires.
    /// Either way the buffered remainder and any messages still queued in the
    /// channel are flushed before returning. A handler error ends the loop
    /// immediately without marking.
    pub async fn run(
        &self,
        mut messages: BoundedReceiver<ClaimMessage>,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        let mut batch = Batch::new(self.settings.batch_size, self.settings.batch_timeout);

        loop {
            let deadline = batch.deadline();
            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(pending = batch.len(), "Claim cancelled, flushing remainder");
                    break;
                }

                _ = expired => {
                    self.flush(&mut batch).await?;
                }

                message = messages.next() => {
                    match message {
                        Some(message) => {
                            if batch.push(message) {
                                self.flush(&mut batch).await?;
                            }
                        }
                        None => {
                            debug!(pending = batch.len(), "Claim channel closed, flushing remainder");
                            break;
                        }
                    }
                }
            }
        }

        while let Some(message) = messages.try_recv() {
            if batch.push(message) {
                self.flush(&mut batch).await?;
            }
        }
        self.flush(&mut batch).await
    }

    async fn flush(&self, batch: &mut Batch<ClaimMessage>) -> Result<(), HandlerError> {
        if batch.is_empty() {
            return Ok(());
        }

        let items = batch.take();
        if let Err(e) = self.handler.handle(&items).await {
            warn!(
                topic = items[0].topic,
                partition = items[0].partition,
                first_offset = items[0].offset,
                count = items.len(),
                error = %e,
                "Batch handler failed, offsets not marked"
            );
            return Err(e);
        }

        for message in &items {
            self.marker.mark(message);
        }
        debug!(
            partition = items[0].partition,
            count = items.len(),
            "Batch processed"
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::{RecordingMarker, StubHandler};
    use super::*;
    use crate::bounded_channel::bounded;
    use tokio::time::Instant;

    fn message(offset: i64) -> ClaimMessage {
        ClaimMessage::new("logs", 0, offset, format!("{{\"n\":{}}}", offset))
    }

    fn claim(
        handler: Arc<StubHandler>,
        marker: Arc<RecordingMarker>,
        batch_size: usize,
        batch_timeout: Duration,
    ) -> ClaimLoop {
        ClaimLoop::new(
            handler,
            marker,
            ClaimSettings {
                batch_size,
                batch_timeout,
            },
        )
    }

    #[tokio::test]
    async fn test_size_triggered_flush() {
        let handler = Arc::new(StubHandler::default());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 2, Duration::from_secs(60));

        let (tx, rx) = bounded(10);
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { claim.run(rx, cancel).await }
        });

        for offset in 1..=5 {
            tx.send(message(offset)).await.unwrap();
        }
        drop(tx);

        task.await.unwrap().unwrap();
        assert_eq!(handler.batches(), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(marker.offsets(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggered_flush() {
        let handler = Arc::new(StubHandler::default());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 10, Duration::from_millis(50));

        let (tx, rx) = bounded(10);
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { claim.run(rx, cancel).await }
        });

        let fed = Instant::now();
        tx.send(message(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert!(marker.offsets().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(marker.offsets(), vec![1]);
        assert!(fed.elapsed() >= Duration::from_millis(50));

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(handler.batches(), vec![vec![1]]);
        drop(tx);
    }

    #[tokio::test]
    async fn test_handler_failure_marks_nothing() {
        let handler = Arc::new(StubHandler::failing());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 2, Duration::from_secs(60));

        let (tx, rx) = bounded(10);
        tx.send(message(1)).await.unwrap();
        tx.send(message(2)).await.unwrap();

        let result = claim.run(rx, CancellationToken::new()).await;
        assert!(matches!(result, Err(HandlerError::Retryable { failed: 2, .. })));
        assert!(marker.offsets().is_empty());
        assert_eq!(handler.batches(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_cancel_flushes_remainder_once() {
        let handler = Arc::new(StubHandler::default());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 10, Duration::from_secs(60));

        let (tx, rx) = bounded(10);
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { claim.run(rx, cancel).await }
        });

        tx.send(message(7)).await.unwrap();
        tx.send(message(8)).await.unwrap();
        cancel.cancel();

        task.await.unwrap().unwrap();
        assert_eq!(handler.batches(), vec![vec![7, 8]]);
        assert_eq!(marker.offsets(), vec![7, 8]);
    }

    #[tokio::test]
    async fn test_cancel_drains_queued_messages() {
        let handler = Arc::new(StubHandler::default());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 2, Duration::from_secs(60));

        let (tx, rx) = bounded(10);
        for offset in 1..=5 {
            tx.send(message(offset)).await.unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        claim.run(rx, cancel).await.unwrap();
        assert_eq!(handler.batches(), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(marker.offsets(), vec![1, 2, 3, 4, 5]);
        drop(tx);
    }

    #[tokio::test]
    async fn test_drain_stops_at_handler_failure() {
        let handler = Arc::new(StubHandler::failing());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 2, Duration::from_secs(60));

        let (tx, rx) = bounded(10);
        for offset in 1..=4 {
            tx.send(message(offset)).await.unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(claim.run(rx, cancel).await.is_err());
        assert_eq!(handler.batches(), vec![vec![1, 2]]);
        assert!(marker.offsets().is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_cancel_with_empty_batch_skips_handler() {
        let handler = Arc::new(StubHandler::default());
        let marker = Arc::new(RecordingMarker::default());
        let claim = claim(handler.clone(), marker.clone(), 10, Duration::from_secs(60));

        let (_tx, rx) = bounded::<ClaimMessage>(10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        claim.run(rx, cancel).await.unwrap();
        assert!(handler.batches().is_empty());
        assert!(marker.offsets().is_empty());
    }
}
