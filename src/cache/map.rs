// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-aside map.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, TryFutureExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::engine::CacheEngine;
use super::expiration::touch_key;
use crate::config::ResilienceConfig;
use crate::storage::traits::{delegate_keys, KeysMap, Map, StorageError, StorageKey, StorageValue};
use crate::synchronizer::{IntersectionSynchronizer, SyncReport, Synchronizer};

/// A map whose reads are served from `cache` when possible.
///
/// The source stays authoritative: writes land there first, and key
/// enumeration always reads the source. With a TTL configured and an
/// expirable cache, every cache write restarts the key's expiration.
pub struct CacheMap<K, V> {
    engine: CacheEngine<dyn Map<K, V>>,
    ttl: Option<Duration>,
    mirror_writes: bool,
}

impl<K: StorageKey, V: StorageValue> CacheMap<K, V> {
    /// Refreshes by re-reading every cached key from the source.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Map<K, V>>,
        cache: Arc<dyn Map<K, V>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = Arc::new(IntersectionSynchronizer::<K, V>::new(config.synchronization_timeout()));
        Self::with_synchronizer(name, source, cache, synchronizer, config)
    }

    pub fn with_synchronizer(
        name: impl Into<String>,
        source: Arc<dyn Map<K, V>>,
        cache: Arc<dyn Map<K, V>>,
        synchronizer: Arc<dyn Synchronizer<dyn Map<K, V>>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let name = name.into();
        let ttl = match config.cache_ttl() {
            Some(ttl) if cache.as_expirable().is_none() => {
                warn!(cache = %name, ttl_ms = ttl.as_millis() as u64, "Cache cannot expire keys, ignoring TTL");
                None
            }
            ttl => ttl,
        };
        Ok(Self {
            engine: CacheEngine::new(name, source, cache, synchronizer)?,
            ttl,
            mirror_writes: config.mirror_cache_writes,
        })
    }

    pub fn engine(&self) -> &CacheEngine<dyn Map<K, V>> {
        &self.engine
    }

    /// TTL in effect, `None` when disabled or unsupported by the cache.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<SyncReport, StorageError> {
        self.engine.refresh(cancel).await
    }

    /// Store `value` in the cache and restart its expiration.
    fn cache_put<'a>(
        &self,
        cache: &'a dyn Map<K, V>,
        key: K,
        value: V,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        let ttl = self.ttl;
        async move {
            let stored = cache.try_add(key.clone(), value, true, cancel).await?;
            if let Some(ttl) = ttl {
                touch_key::<K, V, _>(cache, &key, ttl, cancel).await?;
            }
            Ok::<_, StorageError>(stored)
        }
        .boxed()
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for CacheMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        self.engine
            .write(
                |m| m.try_add(key.clone(), value.clone(), overwrite, cancel),
                |cache, added| {
                    if !*added {
                        None
                    } else if self.mirror_writes {
                        Some(self.cache_put(cache, key.clone(), value.clone(), cancel))
                    } else {
                        Some(cache.try_remove(&key, cancel).map_ok(|_| true).boxed())
                    }
                },
            )
            .await
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<V>, StorageError> {
        self.engine
            .read(
                |m| m.get_value_or_default(key, cancel),
                |cache, value| match value {
                    Some(value) => self.cache_put(cache, key.clone(), value, cancel).map_ok(|_| ()).boxed(),
                    None => future::ready(Ok(())).boxed(),
                },
            )
            .await
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine
            .write(
                |m| m.try_remove(key, cancel),
                |cache, _| Some(cache.try_remove(key, cancel).map_ok(|_| true).boxed()),
            )
            .await
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.read_through(|m| m.contains_key(key, cancel)).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        if self.engine.source().as_keys_map().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for CacheMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        delegate_keys::<K, V, _>(&**self.engine.source(), "source", cancel)
    }
}
