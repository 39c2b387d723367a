// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! On-demand cached sets: read-repair without a background sync loop.
//!
//! A per-key cached set is assumed complete once it holds a single member.
//! An empty cache is seeded with the full source enumeration on the next
//! read. Sets that only ever grow through [`OnDemandCacheSet::add`] are
//! therefore never partially cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::engine::CacheEngine;
use super::expiration::{ExpirationHook, KeyExpiration};
use super::set::CacheSet;
use crate::config::ResilienceConfig;
use crate::metrics;
use crate::storage::traits::{
    deferred_stream, delegate_keys, KeysMap, Map, Set, SetHandle, SetMap, StorageError, StorageKey,
};
use crate::synchronizer::OverwriteSetSynchronizer;

/// The cache tier of an on-demand cached set. The source is only read.
pub struct OnDemandCacheSet<T> {
    name: Arc<str>,
    source: SetHandle<T>,
    cache: SetHandle<T>,
    expiration: Option<Arc<dyn ExpirationHook>>,
}

impl<T: StorageKey> OnDemandCacheSet<T> {
    pub fn new(name: impl Into<String>, source: SetHandle<T>, cache: SetHandle<T>) -> Self {
        Self {
            name: Arc::from(name.into()),
            source,
            cache,
            expiration: None,
        }
    }

    /// Slide an expiration every time the cached set gains members.
    #[must_use]
    pub fn with_expiration(mut self, hook: Arc<dyn ExpirationHook>) -> Self {
        self.expiration = Some(hook);
        self
    }

    async fn touch(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        if let Some(hook) = &self.expiration {
            hook.touch(cancel).await?;
        }
        Ok(())
    }

    /// Copy the full source enumeration into the cache and return it.
    ///
    /// A cache failure stops seeding but the source members are still
    /// returned.
    async fn seed(&self, cancel: &CancellationToken) -> Result<Vec<T>, StorageError> {
        let members: Vec<T> = self.source.stream(cancel).try_collect().await?;
        if members.is_empty() {
            return Ok(members);
        }

        let mut seeded = 0;
        for member in &members {
            if let Err(err) = self.cache.add(member.clone(), cancel).await {
                metrics::record_cache_error(&self.name, "seed");
                warn!(cache = %self.name, error = %err, "Seeding cache set failed");
                break;
            }
            seeded += 1;
        }
        if seeded > 0 {
            if let Err(err) = self.touch(cancel).await {
                warn!(cache = %self.name, error = %err, "Sliding cache expiration failed");
            }
        }
        metrics::record_cache_seeded(&self.name, seeded);
        debug!(cache = %self.name, seeded, "Seeded cache set from source");
        Ok(members)
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for OnDemandCacheSet<T> {
    /// Only mirrors into an already populated cache.
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        if self.cache.len(cancel).await? == 0 {
            return Ok(());
        }
        self.cache.add(value, cancel).await?;
        self.touch(cancel).await
    }

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.cache.try_remove(value, cancel).await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        deferred_stream(async move {
            let cached: Vec<T> = self.cache.stream(cancel).try_collect().await?;
            if cached.is_empty() {
                self.seed(cancel).await
            } else {
                Ok(cached)
            }
        })
    }

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        let found = self.cache.contains(value, cancel).await?;
        if found {
            self.cache.add(value.clone(), cancel).await?;
            self.touch(cancel).await?;
        }
        Ok(found)
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        let cached = self.cache.len(cancel).await?;
        if cached > 0 {
            return Ok(cached);
        }
        Ok(self.seed(cancel).await?.len() as u64)
    }
}

/// The set stored under one key of a set map, fetched on first use.
pub struct LazySet<K, V> {
    map: Arc<dyn SetMap<K, V>>,
    key: K,
    set: OnceCell<SetHandle<V>>,
}

impl<K: StorageKey, V: StorageKey> LazySet<K, V> {
    pub fn new(map: Arc<dyn SetMap<K, V>>, key: K) -> Self {
        Self {
            map,
            key,
            set: OnceCell::new(),
        }
    }

    /// Whether the underlying set has been fetched.
    pub fn is_resolved(&self) -> bool {
        self.set.initialized()
    }

    async fn resolve(&self, cancel: &CancellationToken) -> Result<&SetHandle<V>, StorageError> {
        self.set
            .get_or_try_init(|| self.map.get_value_or_empty(&self.key, cancel))
            .await
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Set<V> for LazySet<K, V> {
    async fn add(&self, value: V, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.resolve(cancel).await?.add(value, cancel).await
    }

    async fn try_remove(&self, value: &V, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.resolve(cancel).await?.try_remove(value, cancel).await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<V, StorageError>> {
        stream::once(self.resolve(cancel))
            .map(move |resolved| match resolved {
                Ok(set) => set.stream(cancel),
                Err(err) => stream::once(future::ready(Err(err))).boxed(),
            })
            .flatten()
            .boxed()
    }

    async fn contains(&self, value: &V, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.resolve(cancel).await?.contains(value, cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.resolve(cancel).await?.len(cancel).await
    }
}

/// Set map whose per-key sets are cached on demand.
///
/// Each [`get_value_or_empty`](SetMap::get_value_or_empty) builds a
/// [`CacheSet`] over a [`LazySet`] of the source and an
/// [`OnDemandCacheSet`] of the cache, so a pure cache hit never reaches the
/// source. Whole-set writes go to the source and invalidate the cached key.
pub struct OnDemandCacheSetMap<K, V> {
    name: Arc<str>,
    source: Arc<dyn SetMap<K, V>>,
    cache: Arc<dyn SetMap<K, V>>,
    ttl: Option<Duration>,
    timeout: Duration,
}

impl<K: StorageKey, V: StorageKey> OnDemandCacheSetMap<K, V> {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn SetMap<K, V>>,
        cache: Arc<dyn SetMap<K, V>>,
        config: &ResilienceConfig,
    ) -> Self {
        let name = name.into();
        let ttl = match config.cache_ttl() {
            Some(ttl) if cache.as_expirable().is_none() => {
                warn!(cache = %name, ttl_ms = ttl.as_millis() as u64, "Cache cannot expire keys, ignoring TTL");
                None
            }
            ttl => ttl,
        };
        Self {
            name: Arc::from(name),
            source,
            cache,
            ttl,
            timeout: config.synchronization_timeout(),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    async fn invalidate(&self, key: &K, cancel: &CancellationToken) {
        if let Err(err) = self.cache.try_remove(key, cancel).await {
            metrics::record_cache_error(&self.name, "invalidate");
            warn!(cache = %self.name, key = ?key, error = %err, "Invalidating cached set failed");
        }
    }

    fn cached_set(&self, key: &K, cache_set: SetHandle<V>) -> Result<SetHandle<V>, StorageError> {
        let source: SetHandle<V> = Arc::new(LazySet::new(self.source.clone(), key.clone()));
        let mut on_demand = OnDemandCacheSet::new(self.name.to_string(), source.clone(), cache_set);
        if let Some(ttl) = self.ttl {
            on_demand = on_demand.with_expiration(Arc::new(KeyExpiration::new(self.cache.clone(), key.clone(), ttl)));
        }

        let engine = CacheEngine::new(
            self.name.to_string(),
            source,
            Arc::new(on_demand) as SetHandle<V>,
            Arc::new(OverwriteSetSynchronizer::<V>::new(self.timeout)),
        )?;
        Ok(Arc::new(CacheSet::from_engine(engine)))
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Map<K, SetHandle<V>> for OnDemandCacheSetMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: SetHandle<V>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        let added = self.source.try_add(key.clone(), value, overwrite, cancel).await?;
        if added {
            self.invalidate(&key, cancel).await;
        }
        Ok(added)
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<SetHandle<V>>, StorageError> {
        if !self.contains_key(key, cancel).await? {
            return Ok(None);
        }
        self.get_value_or_empty(key, cancel).await.map(Some)
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        let removed = self.source.try_remove(key, cancel).await?;
        self.invalidate(key, cancel).await;
        Ok(removed)
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        match self.cache.contains_key(key, cancel).await {
            Ok(true) => {
                metrics::record_cache_lookup(&self.name, true);
                return Ok(true);
            }
            Ok(false) => metrics::record_cache_lookup(&self.name, false),
            Err(err) => {
                metrics::record_cache_error(&self.name, "read");
                debug!(cache = %self.name, error = %err, "Cache read failed, serving from source");
            }
        }
        self.source.contains_key(key, cancel).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, SetHandle<V>>> {
        if self.source.as_keys_map().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl<K: StorageKey, V: StorageKey> KeysMap<K, SetHandle<V>> for OnDemandCacheSetMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        delegate_keys::<K, SetHandle<V>, _>(&*self.source, "source", cancel)
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> SetMap<K, V> for OnDemandCacheSetMap<K, V> {
    async fn get_value_or_empty(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<SetHandle<V>, StorageError> {
        match self.cache.get_value_or_empty(key, cancel).await {
            Ok(cache_set) => self.cached_set(key, cache_set),
            Err(err) => {
                metrics::record_cache_error(&self.name, "read");
                warn!(cache = %self.name, key = ?key, error = %err, "Cache set unavailable, serving from source");
                Ok(Arc::new(LazySet::new(self.source.clone(), key.clone())))
            }
        }
    }
}
