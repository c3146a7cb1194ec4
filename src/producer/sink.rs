// SPDX-License-Identifier: Apache-2.0

use crate::producer::config::ProducerConfig;
use crate::producer::errors::{ProducerError, SinkError};
use crate::producer::kafka::KafkaSyncProducer;
use crate::producer::pool::{ProducerPool, SyncProducer};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Destination for encoded log lines. Every call carries exactly one line.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &[u8]) -> Result<(), SinkError>;

    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write_line(&self, line: &[u8]) -> Result<(), SinkError> {
        (**self).write_line(line)
    }

    fn close(&self) -> Result<(), SinkError> {
        (**self).close()
    }
}

/// Publishes each line as one broker message through a producer pool.
pub struct KafkaSink<P: SyncProducer = KafkaSyncProducer> {
    pool: ProducerPool<P>,
}

impl KafkaSink<KafkaSyncProducer> {
    pub fn connect(config: &ProducerConfig) -> Result<Self, ProducerError> {
        let pool = ProducerPool::new(config.pool_size, |_| KafkaSyncProducer::new(config))?;
        Ok(Self { pool })
    }
}

impl<P: SyncProducer> KafkaSink<P> {
    pub fn with_pool(pool: ProducerPool<P>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ProducerPool<P> {
        &self.pool
    }
}

impl<P: SyncProducer> LogSink for KafkaSink<P> {
    fn write_line(&self, line: &[u8]) -> Result<(), SinkError> {
        let payload = line.strip_suffix(b"\n").unwrap_or(line);
        let producer = self.pool.checkout()?;
        producer.send(payload)?;
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        Ok(self.pool.close()?)
    }
}

/// Writes lines to any `io::Write`, flushing after each line.
pub struct StreamSink<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

impl StreamSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> LogSink for StreamSink<W> {
    fn write_line(&self, line: &[u8]) -> Result<(), SinkError> {
        let mut w = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        w.write_all(line)?;
        w.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        let mut w = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        Ok(w.flush()?)
    }
}

/// Keeps lines in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<Vec<u8>> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &[u8]) -> Result<(), SinkError> {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(line.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::pool::test_util::RecordingProducer;

    #[test]
    fn test_kafka_sink_sends_one_message_per_line() {
        let pool = ProducerPool::new(1, |_| Ok(RecordingProducer::default())).unwrap();
        let sink = KafkaSink::with_pool(pool);

        sink.write_line(b"{\"msg\":\"a\"}\n").unwrap();
        sink.write_line(b"{\"msg\":\"b\"}\n").unwrap();

        let producer = sink.pool().checkout().unwrap();
        let sent = producer.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![b"{\"msg\":\"a\"}".to_vec(), b"{\"msg\":\"b\"}".to_vec()]
        );
    }

    #[test]
    fn test_kafka_sink_error_releases_handle() {
        let pool = ProducerPool::new(1, |_| {
            Ok(RecordingProducer {
                fail_send: true,
                ..Default::default()
            })
        })
        .unwrap();
        let sink = KafkaSink::with_pool(pool);

        assert!(sink.write_line(b"x\n").is_err());
        assert_eq!(sink.pool().available(), 1);
    }

    #[test]
    fn test_stream_sink() {
        let sink = StreamSink::new(Vec::new());
        sink.write_line(b"one\n").unwrap();
        sink.write_line(b"two\n").unwrap();
        assert_eq!(sink.into_inner(), b"one\ntwo\n");
    }
}
