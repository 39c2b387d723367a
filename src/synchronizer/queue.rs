// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queue synchronizers.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{SyncReport, SyncRun, Synchronizer, DEFAULT_SYNC_TIMEOUT};
use crate::storage::traits::{Queue, StorageError, StorageValue};

/// Drains `source` into `target`, preserving order. Destructive: moved items
/// leave the source.
pub struct QueueCopySynchronizer<T> {
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueueCopySynchronizer<T> {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for QueueCopySynchronizer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_TIMEOUT)
    }
}

#[async_trait]
impl<T, H> Synchronizer<H> for QueueCopySynchronizer<T>
where
    T: StorageValue,
    H: Queue<T> + ?Sized,
{
    fn name(&self) -> &'static str {
        "queue_copy"
    }

    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        let run = SyncRun::start("queue_copy", self.timeout, cancel);
        run.drive(move_items(source, target, &run)).await
    }
}

async fn move_items<T, H>(source: &H, target: &H, run: &SyncRun) -> Result<(), StorageError>
where
    T: StorageValue,
    H: Queue<T> + ?Sized,
{
    let token = run.token();
    while source.len(token).await? > 0 {
        match source.dequeue_or_default(token).await? {
            Some(item) => {
                target.enqueue(item, token).await?;
                run.wrote();
            }
            // Drained by a concurrent consumer
            None => break,
        }
    }
    Ok(())
}

/// Makes `target` an ordered copy of `source` and leaves `source` as it was.
///
/// Stale target items are discarded first, then every source item is
/// rotated: dequeued, put back on the source tail and appended to the
/// target. A run cut short by the timeout leaves the source rotated, never
/// short of items.
pub struct QueueMirrorSynchronizer<T> {
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueueMirrorSynchronizer<T> {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for QueueMirrorSynchronizer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_TIMEOUT)
    }
}

#[async_trait]
impl<T, H> Synchronizer<H> for QueueMirrorSynchronizer<T>
where
    T: StorageValue,
    H: Queue<T> + ?Sized,
{
    fn name(&self) -> &'static str {
        "queue_mirror"
    }

    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        let run = SyncRun::start("queue_mirror", self.timeout, cancel);
        run.drive(mirror_items(source, target, &run)).await
    }
}

async fn mirror_items<T, H>(source: &H, target: &H, run: &SyncRun) -> Result<(), StorageError>
where
    T: StorageValue,
    H: Queue<T> + ?Sized,
{
    let token = run.token();
    while target.dequeue_or_default(token).await?.is_some() {
        run.removed();
    }

    let count = source.len(token).await?;
    for _ in 0..count {
        let Some(item) = source.dequeue_or_default(token).await? else {
            break;
        };
        source.enqueue(item.clone(), token).await?;
        target.enqueue(item, token).await?;
        run.wrote();
    }
    Ok(())
}
