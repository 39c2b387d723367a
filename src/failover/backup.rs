// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backup facades: the primary is authoritative, the secondary receives a
//! copy of every write the primary accepted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{FutureExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::engine::FailoverEngine;
use super::{collect_keys, replicas_have_keys};
use crate::config::ResilienceConfig;
use crate::storage::traits::{
    deferred_stream, KeysMap, Map, Set, SetHandle, SetMap, StorageError, StorageKey, StorageValue,
};
use crate::synchronizer::{OverwriteSetSynchronizer, Synchronizer};

pub struct BackupMap<K, V> {
    engine: FailoverEngine<dyn Map<K, V>>,
}

impl<K: StorageKey, V: StorageValue> BackupMap<K, V> {
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn Map<K, V>>,
        secondary: Arc<dyn Map<K, V>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = config
            .map_sync_strategy
            .build::<K, V, dyn Map<K, V>>(config.synchronization_timeout());
        let engine = FailoverEngine::with_config(name, primary, secondary, synchronizer, config)?;
        Ok(Self { engine })
    }

    pub fn with_synchronizer(
        name: impl Into<String>,
        primary: Arc<dyn Map<K, V>>,
        secondary: Arc<dyn Map<K, V>>,
        synchronizer: Arc<dyn Synchronizer<dyn Map<K, V>>>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            engine: FailoverEngine::new(name, primary, secondary, synchronizer)?,
        })
    }

    pub fn engine(&self) -> &FailoverEngine<dyn Map<K, V>> {
        &self.engine
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for BackupMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        self.engine
            .backup(|m| m.try_add(key.clone(), value.clone(), overwrite, cancel))
            .await
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<V>, StorageError> {
        self.engine.fallback(|m| m.get_value_or_default(key, cancel)).await
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.backup(|m| m.try_remove(key, cancel)).await
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.fallback(|m| m.contains_key(key, cancel)).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        if replicas_have_keys::<K, V, _>(&**self.engine.primary(), &**self.engine.secondary()) {
            Some(self)
        } else {
            None
        }
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for BackupMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        deferred_stream(self.engine.fallback(move |m| collect_keys::<K, V, _>(m, cancel)))
    }
}

pub struct BackupSet<T> {
    engine: FailoverEngine<dyn Set<T>>,
}

impl<T: StorageKey> BackupSet<T> {
    /// Build with an [`OverwriteSetSynchronizer`] bounded by the configured timeout.
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn Set<T>>,
        secondary: Arc<dyn Set<T>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = Arc::new(OverwriteSetSynchronizer::<T>::new(config.synchronization_timeout()));
        let engine = FailoverEngine::with_config(name, primary, secondary, synchronizer, config)?;
        Ok(Self { engine })
    }

    pub(crate) fn from_engine(engine: FailoverEngine<dyn Set<T>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &FailoverEngine<dyn Set<T>> {
        &self.engine
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for BackupSet<T> {
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.engine.backup(|s| s.add(value.clone(), cancel)).await
    }

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.backup(|s| s.try_remove(value, cancel)).await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        deferred_stream(
            self.engine
                .fallback(move |s| s.stream(cancel).try_collect::<Vec<T>>().boxed()),
        )
    }

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.fallback(|s| s.contains(value, cancel)).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.engine.fallback(|s| s.len(cancel)).await
    }
}

/// Backup over set-valued maps.
///
/// The per-key sets handed out by [`SetMap::get_value_or_empty`] are
/// themselves [`BackupSet`]s sharing this map's health state: a failure on
/// a per-key set takes the whole map down, and recovery resynchronizes the
/// whole map.
pub struct BackupSetMap<K, V> {
    engine: FailoverEngine<dyn SetMap<K, V>>,
    set_timeout: Duration,
}

impl<K: StorageKey, V: StorageKey> BackupSetMap<K, V> {
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn SetMap<K, V>>,
        secondary: Arc<dyn SetMap<K, V>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        let synchronizer = config
            .map_sync_strategy
            .build::<K, SetHandle<V>, dyn SetMap<K, V>>(config.synchronization_timeout());
        let engine = FailoverEngine::with_config(name, primary, secondary, synchronizer, config)?;
        Ok(Self {
            engine,
            set_timeout: config.synchronization_timeout(),
        })
    }

    pub fn engine(&self) -> &FailoverEngine<dyn SetMap<K, V>> {
        &self.engine
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Map<K, SetHandle<V>> for BackupSetMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: SetHandle<V>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        self.engine
            .backup(|m| m.try_add(key.clone(), value.clone(), overwrite, cancel))
            .await
    }

    /// The replicated set under `key`, if the key exists.
    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<SetHandle<V>>, StorageError> {
        if self.contains_key(key, cancel).await? {
            Ok(Some(self.get_value_or_empty(key, cancel).await?))
        } else {
            Ok(None)
        }
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.backup(|m| m.try_remove(key, cancel)).await
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.engine.fallback(|m| m.contains_key(key, cancel)).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, SetHandle<V>>> {
        if replicas_have_keys::<K, SetHandle<V>, _>(&**self.engine.primary(), &**self.engine.secondary()) {
            Some(self)
        } else {
            None
        }
    }
}

impl<K: StorageKey, V: StorageKey> KeysMap<K, SetHandle<V>> for BackupSetMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        deferred_stream(
            self.engine
                .fallback(move |m| collect_keys::<K, SetHandle<V>, _>(m, cancel)),
        )
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> SetMap<K, V> for BackupSetMap<K, V> {
    async fn get_value_or_empty(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<SetHandle<V>, StorageError> {
        let primary = match self.engine.primary().get_value_or_empty(key, cancel).await {
            Ok(set) => set,
            Err(err) => {
                self.engine.mark_down(err).await;
                return self.engine.secondary().get_value_or_empty(key, cancel).await;
            }
        };
        self.engine.recover_if_down().await?;

        match self.engine.secondary().get_value_or_empty(key, cancel).await {
            Ok(secondary) => {
                let sets = self.engine.derive(
                    primary,
                    secondary,
                    Arc::new(OverwriteSetSynchronizer::<V>::new(self.set_timeout)),
                );
                Ok(Arc::new(BackupSet::from_engine(sets)))
            }
            Err(err) => {
                warn!(engine = %self.engine.name(), error = %err, "Secondary set unavailable, using primary only");
                Ok(primary)
            }
        }
    }
}
