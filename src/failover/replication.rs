// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dual-write map.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::engine::FailoverEngine;
use super::{collect_keys, replicas_have_keys};
use crate::config::ResilienceConfig;
use crate::storage::traits::{
    deferred_stream, KeysMap, Map, StorageError, StorageKey, StorageValue,
};
use crate::synchronizer::Synchronizer;

/// Writes go to both maps; reads prefer the primary.
///
/// ```
/// # use std::sync::Arc;
/// # use resilience_engine::{Map, MemoryMap, ReplicationMap, ResilienceConfig};
/// # use tokio_util::sync::CancellationToken;
/// # tokio_test_block_on(async {
/// let primary = Arc::new(MemoryMap::<String, u32>::new());
/// let secondary = Arc::new(MemoryMap::<String, u32>::new());
/// let map = ReplicationMap::new("sessions", primary.clone(), secondary.clone(), &ResilienceConfig::default())?;
///
/// let cancel = CancellationToken::new();
/// assert!(map.try_add("a".into(), 1, false, &cancel).await?);
/// assert_eq!(primary.get(&"a".to_string()), Some(1));
/// assert_eq!(secondary.get(&"a".to_string()), Some(1));
/// # Ok::<_, resilience_engine::StorageError>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct ReplicationMap<K, V> {
    engine: FailoverEngine<dyn Map<K, V>>,
}

impl<K: StorageKey, V: StorageValue> ReplicationMap<K, V> {
    /// Build with the configured map synchronizer.
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
impl<K: StorageKey, V: StorageValue> Map<K, V> for ReplicationMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        self.engine
            .replicate(|m| m.try_add(key.clone(), value.clone(), overwrite, cancel))
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
        self.engine.replicate(|m| m.try_remove(key, cancel)).await
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

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for ReplicationMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        deferred_stream(self.engine.fallback(move |m| collect_keys::<K, V, _>(m, cancel)))
    }
}
