// SPDX-License-Identifier: Apache-2.0

use crate::producer::errors::SinkError;
use crate::producer::sink::LogSink;
use std::sync::Mutex;
use tracing::warn;

/// Writes to the primary sink and retries the same bytes on the fallback sink
/// when the primary fails. Only fallback errors reach the caller.
pub struct FallbackWriter {
    primary: Box<dyn LogSink>,
    fallback: Box<dyn LogSink>,
    lock: Mutex<()>,
}

impl FallbackWriter {
    pub fn new(primary: impl LogSink + 'static, fallback: impl LogSink + 'static) -> Self {
        Self {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
            lock: Mutex::new(()),
        }
    }

    pub fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        match self.primary.write_line(line) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Primary log sink failed, using fallback");
                self.fallback.write_line(line)
            }
        }
    }

    /// Writes straight to the fallback sink, used for entries that failed
    /// validation.
    pub fn write_fallback(&self, line: &[u8]) -> Result<(), SinkError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.fallback.write_line(line)
    }

    pub fn close(&self) -> Result<(), SinkError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let primary = self.primary.close();
        self.fallback.close()?;
        primary
    }
}

impl LogSink for FallbackWriter {
    fn write_line(&self, line: &[u8]) -> Result<(), SinkError> {
        self.write(line)
    }

    fn close(&self) -> Result<(), SinkError> {
        FallbackWriter::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::sink::MemorySink;
    use std::io;
    use std::sync::Arc;
    use std::thread;

    struct BrokenSink;

    impl LogSink for BrokenSink {
        fn write_line(&self, _line: &[u8]) -> Result<(), SinkError> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone").into())
        }
    }

    #[test]
    fn test_primary_success_skips_fallback() {
        let primary = MemorySink::new();
        let fallback = MemorySink::new();
        let w = FallbackWriter::new(primary.clone(), fallback.clone());

        w.write(b"line\n").unwrap();
        assert_eq!(primary.lines(), vec![b"line\n".to_vec()]);
        assert!(fallback.is_empty());
    }

    #[test]
    fn test_primary_error_is_swallowed() {
        let fallback = MemorySink::new();
        let w = FallbackWriter::new(BrokenSink, fallback.clone());

        w.write(b"line\n").unwrap();
        assert_eq!(fallback.lines(), vec![b"line\n".to_vec()]);
    }

    #[test]
    fn test_fallback_error_surfaces() {
        let w = FallbackWriter::new(BrokenSink, BrokenSink);
        let err = w.write(b"line\n").unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }

    #[test]
    fn test_write_fallback_bypasses_primary() {
        let primary = MemorySink::new();
        let fallback = MemorySink::new();
        let w = FallbackWriter::new(primary.clone(), fallback.clone());

        w.write_fallback(b"bad\n").unwrap();
        assert!(primary.is_empty());
        assert_eq!(fallback.len(), 1);
    }

    #[test]
    fn test_concurrent_lines_stay_whole() {
        let primary = MemorySink::new();
        let w = Arc::new(FallbackWriter::new(primary.clone(), MemorySink::new()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let w = w.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        w.write(format!("{}-{}\n", i, j).as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let lines = primary.lines();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.ends_with(b"\n")));
    }
}
