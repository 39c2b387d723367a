// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-aside set.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{FutureExt, TryFutureExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use super::engine::CacheEngine;
use crate::config::ResilienceConfig;
use crate::storage::traits::{deferred_stream, Set, StorageError, StorageKey};
use crate::synchronizer::{OverwriteSetSynchronizer, SyncReport};

/// Set reads served from `cache` when it has an answer; members confirmed
/// by the source are copied into the cache.
pub struct CacheSet<T> {
    engine: CacheEngine<dyn Set<T>>,
}

impl<T: StorageKey> CacheSet<T> {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Set<T>>,
        cache: Arc<dyn Set<T>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = Arc::new(OverwriteSetSynchronizer::<T>::new(config.synchronization_timeout()));
        Ok(Self {
            engine: CacheEngine::new(name, source, cache, synchronizer)?,
        })
    }

    pub(crate) fn from_engine(engine: CacheEngine<dyn Set<T>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &CacheEngine<dyn Set<T>> {
        &self.engine
    }

    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<SyncReport, StorageError> {
        self.engine.refresh(cancel).await
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for CacheSet<T> {
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.engine
            .write(
                |s| s.add(value.clone(), cancel),
                |c, _| Some(c.add(value.clone(), cancel)),
            )
            .await
    }

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine
            .write(
                |s| s.try_remove(value, cancel),
                |c, _| Some(c.try_remove(value, cancel).map_ok(|_| true).boxed()),
            )
            .await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        deferred_stream(self.engine.read(
            move |s| s.stream(cancel).try_collect::<Vec<T>>().boxed(),
            move |c, members: Vec<T>| {
                async move {
                    for member in members {
                        c.add(member, cancel).await?;
                    }
                    Ok::<_, StorageError>(())
                }
                .boxed()
            },
        ))
    }

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine
            .read(
                |s| s.contains(value, cancel),
                |c, _| c.add(value.clone(), cancel),
            )
            .await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.engine.read_through(|s| s.len(cancel)).await
    }
}
