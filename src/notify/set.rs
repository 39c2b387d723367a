// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::{notify, WriteHandler};
use crate::storage::traits::{Set, SetHandle, StorageError, StorageKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetWrite<T> {
    Added(T),
    Removed(T),
}

/// Reports every `add` and each `try_remove` that removed a member.
pub struct NotifyWriteSet<T> {
    inner: SetHandle<T>,
    handler: WriteHandler<SetWrite<T>>,
}

impl<T: StorageKey> NotifyWriteSet<T> {
    pub fn new(inner: SetHandle<T>, handler: WriteHandler<SetWrite<T>>) -> Self {
        Self { inner, handler }
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for NotifyWriteSet<T> {
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.inner.add(value.clone(), cancel).await?;
        notify("set_added", &self.handler, SetWrite::Added(value), cancel).await;
        Ok(())
    }

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        let removed = self.inner.try_remove(value, cancel).await?;
        if removed {
            notify("set_removed", &self.handler, SetWrite::Removed(value.clone()), cancel).await;
        }
        Ok(removed)
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        self.inner.stream(cancel)
    }

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.inner.contains(value, cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.inner.len(cancel).await
    }
}
