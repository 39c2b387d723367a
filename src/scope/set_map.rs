// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::{remover, MapScope};
use crate::storage::serializer::KeySerializer;
use crate::storage::traits::{
    delegate_keys, ExpirableKeyMap, KeysMap, Map, Set, SetHandle, SetMap, StorageError, StorageKey,
};

/// Set map decorator recording its keys in a [`MapScope`].
///
/// A key is recorded when a whole set is added under it and whenever a
/// member is added through a set returned by
/// [`get_value_or_empty`](SetMap::get_value_or_empty). Clearing the scope
/// removes the whole set stored under each recorded key.
pub struct ScopedSetMap<K, V> {
    id: String,
    inner: Arc<dyn SetMap<K, V>>,
    scope: Arc<MapScope>,
    serializer: Arc<dyn KeySerializer<K>>,
}

impl<K: StorageKey, V: StorageKey> ScopedSetMap<K, V> {
    pub fn new(
        id: impl Into<String>,
        inner: Arc<dyn SetMap<K, V>>,
        scope: Arc<MapScope>,
        serializer: Arc<dyn KeySerializer<K>>,
    ) -> Result<Self, StorageError> {
        let id = id.into();
        scope.register(&id, remover::<K, SetHandle<V>, _>(inner.clone(), serializer.clone()))?;
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

    fn scoped(&self, raw: String, set: SetHandle<V>) -> SetHandle<V> {
        Arc::new(ScopedSet {
            inner: set,
            scope: self.scope.clone(),
            map_id: self.id.clone(),
            raw_key: raw,
        })
    }
}

impl<K, V> Drop for ScopedSetMap<K, V> {
    fn drop(&mut self) {
        self.scope.unregister(&self.id);
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Map<K, SetHandle<V>> for ScopedSetMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: SetHandle<V>,
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
    ) -> Result<Option<SetHandle<V>>, StorageError> {
        let raw = self.serializer.serialize_key(key)?;
        let set = self.inner.get_value_or_default(key, cancel).await?;
        Ok(set.map(|set| self.scoped(raw, set)))
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

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, SetHandle<V>>> {
        if self.inner.as_keys_map().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_expirable(&self) -> Option<&dyn ExpirableKeyMap<K, SetHandle<V>>> {
        self.inner.as_expirable()
    }
}

impl<K: StorageKey, V: StorageKey> KeysMap<K, SetHandle<V>> for ScopedSetMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        delegate_keys::<K, SetHandle<V>, _>(&*self.inner, "inner", cancel)
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> SetMap<K, V> for ScopedSetMap<K, V> {
    async fn get_value_or_empty(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<SetHandle<V>, StorageError> {
        let raw = self.serializer.serialize_key(key)?;
        let set = self.inner.get_value_or_empty(key, cancel).await?;
        Ok(self.scoped(raw, set))
    }
}

/// One key's set of a [`ScopedSetMap`]; adding a member records the key.
pub struct ScopedSet<V> {
    inner: SetHandle<V>,
    scope: Arc<MapScope>,
    map_id: String,
    raw_key: String,
}

#[async_trait]
impl<V: StorageKey> Set<V> for ScopedSet<V> {
    async fn add(&self, value: V, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.inner.add(value, cancel).await?;
        self.scope.add_key(&self.map_id, &self.raw_key, cancel).await
    }

    async fn try_remove(&self, value: &V, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.inner.try_remove(value, cancel).await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<V, StorageError>> {
        self.inner.stream(cancel)
    }

    async fn contains(&self, value: &V, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.inner.contains(value, cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.inner.len(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use crate::storage::serializer::DisplayKeySerializer;
    use crate::storage::{MemorySet, MemorySetMap};

    #[tokio::test]
    async fn test_member_adds_record_key_and_clear_removes_sets() {
        let members = Arc::new(MemorySetMap::<String, String>::new());
        let scope = Arc::new(MapScope::new("scope", members.clone()).unwrap());
        let inner = Arc::new(MemorySetMap::<u32, String>::new());
        let map = ScopedSetMap::new("tags", inner.clone(), scope.clone(), Arc::new(DisplayKeySerializer::<u32>::new()))
            .unwrap();
        let cancel = CancellationToken::new();

        let set = map.get_value_or_empty(&1, &cancel).await.unwrap();
        set.add("red".into(), &cancel).await.unwrap();
        set.add("blue".into(), &cancel).await.unwrap();
        map.try_add(2, Arc::new(MemorySet::from_members(["green".to_string()])), false, &cancel)
            .await
            .unwrap();
        assert_eq!(members.members(&"scope".to_string()).len(), 2);

        assert_eq!(scope.clear(&cancel).await.unwrap(), 2);
        assert!(inner.is_empty());
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn test_reading_does_not_record() {
        let members = Arc::new(MemorySetMap::<String, String>::new());
        let scope = Arc::new(MapScope::new("scope", members.clone()).unwrap());
        let map = ScopedSetMap::new(
            "tags",
            Arc::new(MemorySetMap::<u32, String>::new()),
            scope,
            Arc::new(DisplayKeySerializer::<u32>::new()),
        )
        .unwrap();
        let cancel = CancellationToken::new();

        let set = map.get_value_or_empty(&1, &cancel).await.unwrap();
        assert_eq!(set.len(&cancel).await.unwrap(), 0);
        assert!(map.get_value_or_default(&1, &cancel).await.unwrap().is_none());
        assert!(members.is_empty());
    }
}
