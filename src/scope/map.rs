// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::{remover, MapScope};
use crate::storage::serializer::KeySerializer;
use crate::storage::traits::{
    delegate_keys, ExpirableKeyMap, KeysMap, Map, StorageError, StorageKey, StorageValue,
};

/// Map decorator recording its keys in a [`MapScope`].
///
/// The map is registered in the scope under `id` for as long as the
/// decorator lives; dropping it unregisters the map, and later clears skip
/// its members.
pub struct ScopedMap<K, V> {
    id: String,
    inner: Arc<dyn Map<K, V>>,
    scope: Arc<MapScope>,
    serializer: Arc<dyn KeySerializer<K>>,
}

impl<K: StorageKey, V: StorageValue> ScopedMap<K, V> {
    pub fn new(
        id: impl Into<String>,
        inner: Arc<dyn Map<K, V>>,
        scope: Arc<MapScope>,
        serializer: Arc<dyn KeySerializer<K>>,
    ) -> Result<Self, StorageError> {
        let id = id.into();
        scope.register(&id, remover::<K, V, _>(inner.clone(), serializer.clone()))?;
        Ok(Self {
            id,
            inner,
            scope,
            serializer,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> &Arc<MapScope> {
        &self.scope
    }
}

impl<K, V> Drop for ScopedMap<K, V> {
    fn drop(&mut self) {
        self.scope.unregister(&self.id);
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for ScopedMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        let raw = self.serializer.serialize_key(&key)?;
        let added = self.inner.try_add(key, value, overwrite, cancel).await?;
        if added {
            self.scope.add_key(&self.id, &raw, cancel).await?;
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
        let raw = self.serializer.serialize_key(key)?;
        let removed = self.inner.try_remove(key, cancel).await?;
        if removed {
            self.scope.remove_key(&self.id, &raw, cancel).await?;
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

    fn as_expirable(&self) -> Option<&dyn ExpirableKeyMap<K, V>> {
        self.inner.as_expirable()
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for ScopedMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        delegate_keys::<K, V, _>(&*self.inner, "inner", cancel)
    }
}
