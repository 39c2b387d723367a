// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory FIFO queue backend with blocking dequeue.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::traits::{BlockingQueue, Queue, StorageError, StorageValue};

pub struct MemoryQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T: StorageValue> MemoryQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot in dequeue order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }

    fn pop(&self) -> Option<T> {
        let mut items = self.items.lock();
        let next = items.pop_front();
        if next.is_some() && !items.is_empty() {
            // Pass the wake-up on to the next waiter
            self.available.notify_one();
        }
        next
    }
}

impl<T: StorageValue> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: StorageValue> Queue<T> for MemoryQueue<T> {
    async fn enqueue(&self, item: T, _cancel: &CancellationToken) -> Result<(), StorageError> {
        self.items.lock().push_back(item);
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue_or_default(&self, _cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        Ok(self.pop())
    }

    async fn len(&self, _cancel: &CancellationToken) -> Result<u64, StorageError> {
        Ok(self.items.lock().len() as u64)
    }
}

#[async_trait]
impl<T: StorageValue> BlockingQueue<T> for MemoryQueue<T> {
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        loop {
            let next = self.pop();
            if next.is_some() {
                return Ok(next);
            }
            tokio::select! {
                _ = self.available.notified() => {}
                _ = cancel.cancelled() => return Ok(None),
            }
        }
    }
}
