// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::producer::errors::{ProducerError, Result};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// A producer that delivers one message per call and blocks until done.
pub trait SyncProducer: Send + Sync {
    fn send(&self, payload: &[u8]) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Fixed set of producer handles. Idle handles wait in the ready channel, the
/// census vector keeps every handle for shutdown. Items in the ready channel
/// plus checked out guards always equal the pool size.
pub struct ProducerPool<P> {
    ready_tx: BoundedSender<Arc<P>>,
    ready_rx: BoundedReceiver<Arc<P>>,
    all: Vec<Arc<P>>,
    closed: AtomicBool,
}

impl<P: SyncProducer> ProducerPool<P> {
    /// Creates every handle eagerly. Fails on the first handle that cannot be
    /// created; handles built so far are dropped.
    pub fn new<F>(size: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<P>,
    {
        if size == 0 {
            return Err(ProducerError::Configuration(
                "pool size must be positive".to_string(),
            ));
        }

        let (ready_tx, ready_rx) = bounded(size);
        let mut all = Vec::with_capacity(size);
        for i in 0..size {
            let handle = Arc::new(factory(i)?);
            all.push(handle.clone());
            if ready_tx.send_blocking(handle).is_err() {
                return Err(ProducerError::PoolClosed);
            }
        }
        debug!(size, "Created producer pool");

        Ok(Self {
            ready_tx,
            ready_rx,
            all,
            closed: AtomicBool::new(false),
        })
    }

    /// Takes an idle handle, blocking until one is released. The handle goes
    /// back to the pool when the guard is dropped.
    pub fn checkout(&self) -> Result<PooledProducer<'_, P>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProducerError::PoolClosed);
        }
        match self.ready_rx.recv_blocking() {
            Some(handle) => Ok(PooledProducer { pool: self, handle }),
            None => Err(ProducerError::PoolClosed),
        }
    }

    pub fn size(&self) -> usize {
        self.all.len()
    }

    /// Number of idle handles.
    pub fn available(&self) -> usize {
        self.ready_rx.len()
    }

    /// Closes every handle in creation order and stops at the first failure.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        for (i, handle) in self.all.iter().enumerate() {
            if let Err(e) = handle.close() {
                error!(handle = i, error = %e, "Failed to close producer");
                return Err(e);
            }
        }
        Ok(())
    }

    fn release(&self, handle: Arc<P>) {
        // capacity equals the pool size, so this never waits
        if self.ready_tx.send_blocking(handle).is_err() {
            error!("Producer pool ready channel is disconnected");
        }
    }
}

/// A checked out producer handle.
pub struct PooledProducer<'a, P: SyncProducer> {
    pool: &'a ProducerPool<P>,
    handle: Arc<P>,
}

impl<P: SyncProducer> Deref for PooledProducer<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.handle
    }
}

impl<P: SyncProducer> Drop for PooledProducer<'_, P> {
    fn drop(&mut self) {
        self.pool.release(self.handle.clone());
    }
}
