// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::{notify, WriteHandler};
use crate::storage::traits::{delegate_keys, ExpirableKeyMap, KeysMap, Map, StorageError, StorageKey, StorageValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapWrite<K, V> {
    Added { key: K, value: V },
    Removed { key: K },
}

/// Reports successful `try_add`/`try_remove` calls on the wrapped map.
pub struct NotifyWriteMap<K, V> {
    inner: Arc<dyn Map<K, V>>,
    handler: WriteHandler<MapWrite<K, V>>,
}

impl<K: StorageKey, V: StorageValue> NotifyWriteMap<K, V> {
    pub fn new(inner: Arc<dyn Map<K, V>>, handler: WriteHandler<MapWrite<K, V>>) -> Self {
        Self { inner, handler }
    }

    pub fn inner(&self) -> &Arc<dyn Map<K, V>> {
        &self.inner
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for NotifyWriteMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        let added = self
            .inner
            .try_add(key.clone(), value.clone(), overwrite, cancel)
            .await?;
        if added {
            notify("map_added", &self.handler, MapWrite::Added { key, value }, cancel).await;
        }
        Ok(added)
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<V>, StorageError> {
        self.inner.get_value_or_default(key, cancel).await
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        let removed = self.inner.try_remove(key, cancel).await?;
        if removed {
            notify("map_removed", &self.handler, MapWrite::Removed { key: key.clone() }, cancel).await;
        }
        Ok(removed)
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.inner.contains_key(key, cancel).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        if self.inner.as_keys_map().is_some() {
            Some(self)
        } else {
            None
        }
    }

    // Expiring a key is not reported.
    fn as_expirable(&self) -> Option<&dyn ExpirableKeyMap<K, V>> {
        self.inner.as_expirable()
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for NotifyWriteMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        delegate_keys::<K, V, _>(&*self.inner, "inner", cancel)
    }
}
