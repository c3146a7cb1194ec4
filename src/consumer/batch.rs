// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::time::Instant;

/// A partition's in-flight batch. The flush deadline starts with the first
/// message of each batch, not at the previous flush.
pub(crate) struct Batch<T> {
    items: Vec<T>,
    max_size: usize,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl<T> Batch<T> {
    pub(crate) fn new(max_size: usize, timeout: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            items: Vec::with_capacity(max_size),
            max_size,
            timeout,
            deadline: None,
        }
    }

    /// Buffers an item, returning true once the batch is full.
    pub(crate) fn push(&mut self, item: T) -> bool {
        if self.items.is_empty() {
            self.deadline = Some(Instant::now() + self.timeout);
        }
        self.items.push(item);
        self.is_full()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn take(&mut self) -> Vec<T> {
        self.deadline = None;
        std::mem::replace(&mut self.items, Vec::with_capacity(self.max_size))
    }
}
