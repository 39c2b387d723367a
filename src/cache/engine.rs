// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-aside engine over a Source (system of record) and a Cache.
//!
//! - Reads try the cache first. A cache *error* counts as a miss: the source
//!   answers and the caller never sees the cache failure.
//! - Writes go to the source first. Source errors propagate; a failed or
//!   rejected cache update afterwards triggers a [`refresh`](CacheEngine::refresh)
//!   whose own failure is only logged.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics;
use crate::storage::traits::{CacheProbe, StorageError, WriteOutcome};
use crate::synchronizer::{SyncReport, Synchronizer};

pub struct CacheEngine<H: ?Sized> {
    name: Arc<str>,
    source: Arc<H>,
    cache: Arc<H>,
    synchronizer: Arc<dyn Synchronizer<H>>,
}

impl<H: ?Sized> Clone for CacheEngine<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            source: self.source.clone(),
            cache: self.cache.clone(),
            synchronizer: self.synchronizer.clone(),
        }
    }
}

impl<H: ?Sized + Send + Sync + 'static> CacheEngine<H> {
    /// Fails with [`StorageError::MissingCapability`] when the synchronizer
    /// cannot refresh the cache from the source.
    pub fn new(
        name: impl Into<String>,
        source: Arc<H>,
        cache: Arc<H>,
        synchronizer: Arc<dyn Synchronizer<H>>,
    ) -> Result<Self, StorageError> {
        synchronizer.validate(&source, &cache)?;
        Ok(Self {
            name: Arc::from(name.into()),
            source,
            cache,
            synchronizer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<H> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<H> {
        &self.cache
    }

    /// Cache first; on a miss read the source and, on a source hit, hand
    /// the result to `backfill` to warm the cache.
    pub async fn read<'a, T, F, B>(&'a self, op: F, backfill: B) -> Result<T, StorageError>
    where
        F: Fn(&'a H) -> BoxFuture<'a, Result<T, StorageError>> + Send,
        B: FnOnce(&'a H, T) -> BoxFuture<'a, Result<(), StorageError>> + Send,
        T: CacheProbe + Clone + Send,
    {
        if let Some(hit) = self.probe_cache(&op).await {
            return Ok(hit);
        }

        let value = op(&*self.source).await?;
        if value.is_hit() {
            if let Err(err) = backfill(&*self.cache, value.clone()).await {
                metrics::record_cache_error(&self.name, "backfill");
                warn!(cache = %self.name, error = %err, "Cache backfill failed");
            }
        }
        Ok(value)
    }

    /// Cache first; on a miss answer from the source without warming.
    pub async fn read_through<'a, T, F>(&'a self, op: F) -> Result<T, StorageError>
    where
        F: Fn(&'a H) -> BoxFuture<'a, Result<T, StorageError>> + Send,
        T: CacheProbe + Send,
    {
        if let Some(hit) = self.probe_cache(&op).await {
            return Ok(hit);
        }
        op(&*self.source).await
    }

    /// Apply `source_op`, then the cache update `cache_op` builds from the
    /// source's result (`None` leaves the cache alone).
    pub async fn write<'a, T, W, S, C>(&'a self, source_op: S, cache_op: C) -> Result<T, StorageError>
    where
        S: FnOnce(&'a H) -> BoxFuture<'a, Result<T, StorageError>> + Send,
        C: FnOnce(&'a H, &T) -> Option<BoxFuture<'a, Result<W, StorageError>>> + Send,
        T: Send,
        W: WriteOutcome + Send,
    {
        let value = source_op(&*self.source).await?;

        if let Some(update) = cache_op(&*self.cache, &value) {
            let applied = match update.await {
                Ok(outcome) => outcome.is_accepted(),
                Err(err) => {
                    metrics::record_cache_error(&self.name, "write");
                    warn!(cache = %self.name, error = %err, "Cache update failed, refreshing");
                    false
                }
            };
            if !applied {
                if let Err(err) = self.refresh(&CancellationToken::new()).await {
                    warn!(cache = %self.name, error = %err, "Cache refresh failed");
                }
            }
        }
        Ok(value)
    }

    /// Synchronize source → cache.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<SyncReport, StorageError> {
        let report = self
            .synchronizer
            .synchronize(&self.source, &self.cache, cancel)
            .await?;
        debug!(
            cache = %self.name,
            written = report.written,
            removed = report.removed,
            "Cache refreshed from source"
        );
        Ok(report)
    }

    async fn probe_cache<'a, T, F>(&'a self, op: &F) -> Option<T>
    where
        F: Fn(&'a H) -> BoxFuture<'a, Result<T, StorageError>>,
        T: CacheProbe,
    {
        match op(&*self.cache).await {
            Ok(value) if value.is_hit() => {
                metrics::record_cache_lookup(&self.name, true);
                Some(value)
            }
            Ok(_) => {
                metrics::record_cache_lookup(&self.name, false);
                None
            }
            Err(err) => {
                metrics::record_cache_error(&self.name, "read");
                debug!(cache = %self.name, error = %err, "Cache read failed, serving from source");
                None
            }
        }
    }
}
