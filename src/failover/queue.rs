// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queue facades.
//!
//! [`FallbackQueue`] only writes the secondary during an outage, so recovery
//! drains the secondary into the primary. [`ReplicationBlockingQueue`] keeps
//! the secondary as a full copy, so recovery replaces the primary's stale
//! contents with the secondary's and both sides end up equal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::engine::FailoverEngine;
use super::events::HealthState;
use crate::config::ResilienceConfig;
use crate::metrics;
use crate::storage::traits::{BlockingQueue, Queue, StorageError, StorageValue};
use crate::synchronizer::{QueueCopySynchronizer, QueueMirrorSynchronizer};

/// Every operation runs on the primary and falls back to the secondary.
pub struct FallbackQueue<T> {
    engine: FailoverEngine<dyn Queue<T>>,
}

impl<T: StorageValue> FallbackQueue<T> {
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn Queue<T>>,
        secondary: Arc<dyn Queue<T>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = Arc::new(QueueCopySynchronizer::<T>::new(config.synchronization_timeout()));
        let engine = FailoverEngine::with_config(name, primary, secondary, synchronizer, config)?;
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &FailoverEngine<dyn Queue<T>> {
        &self.engine
    }
}

#[async_trait]
impl<T: StorageValue> Queue<T> for FallbackQueue<T> {
    async fn enqueue(&self, item: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.engine.fallback(|q| q.enqueue(item.clone(), cancel)).await
    }

    async fn dequeue_or_default(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.engine.fallback(|q| q.dequeue_or_default(cancel)).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.engine.fallback(|q| q.len(cancel)).await
    }
}

/// Enqueue and dequeue are applied to both queues so the secondary stays a
/// mirror of the primary; lengths are read from the primary.
///
/// While the primary is down its head is stale, so dequeues first read its
/// length and let a recovery land before anything is taken off either queue.
pub struct ReplicationBlockingQueue<T> {
    engine: FailoverEngine<dyn BlockingQueue<T>>,
}

impl<T: StorageValue> ReplicationBlockingQueue<T> {
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn BlockingQueue<T>>,
        secondary: Arc<dyn BlockingQueue<T>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = Arc::new(QueueMirrorSynchronizer::<T>::new(config.synchronization_timeout()));
        let engine = FailoverEngine::with_config(name, primary, secondary, synchronizer, config)?;
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &FailoverEngine<dyn BlockingQueue<T>> {
        &self.engine
    }

    async fn catch_up(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        if self.engine.health() == HealthState::Down {
            self.engine.fallback(|q| q.len(cancel)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: StorageValue> Queue<T> for ReplicationBlockingQueue<T> {
    async fn enqueue(&self, item: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.engine.replicate(|q| q.enqueue(item.clone(), cancel)).await
    }

    async fn dequeue_or_default(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.catch_up(cancel).await?;
        self.engine.replicate(|q| q.dequeue_or_default(cancel)).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.engine.fallback(|q| q.len(cancel)).await
    }
}

#[async_trait]
impl<T: StorageValue> BlockingQueue<T> for ReplicationBlockingQueue<T> {
    /// Waits on the primary (or the secondary while the primary is down),
    /// then drops the matching head of the secondary.
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.catch_up(cancel).await?;
        let item = self.engine.fallback(|q| q.dequeue(cancel)).await?;
        if item.is_some() && self.engine.health() == HealthState::Up {
            if let Err(err) = self.engine.secondary().dequeue_or_default(cancel).await {
                metrics::record_secondary_error(self.engine.name());
                warn!(engine = %self.engine.name(), error = %err, "Secondary dequeue mirror failed");
            }
        }
        Ok(item)
    }
}
