// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::set::{NotifyWriteSet, SetWrite};
use super::{notify, WriteHandler};
use crate::storage::traits::{
    delegate_keys, ExpirableKeyMap, KeysMap, Map, SetHandle, SetMap, StorageError, StorageKey,
};

/// Writes to a set map: whole keys, or members of one key's set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetMapWrite<K, V> {
    Added { key: K },
    Removed { key: K },
    Member { key: K, write: SetWrite<V> },
}

/// Reports whole-set writes, and member writes made through the sets it
/// hands out.
pub struct NotifyWriteSetMap<K, V> {
    inner: Arc<dyn SetMap<K, V>>,
    handler: WriteHandler<SetMapWrite<K, V>>,
}

impl<K: StorageKey, V: StorageKey> NotifyWriteSetMap<K, V> {
    pub fn new(inner: Arc<dyn SetMap<K, V>>, handler: WriteHandler<SetMapWrite<K, V>>) -> Self {
        Self { inner, handler }
    }

    fn wrap(&self, key: &K, set: SetHandle<V>) -> SetHandle<V> {
        let handler = self.handler.clone();
        let key = key.clone();
        let member_handler: WriteHandler<SetWrite<V>> = Arc::new(move |write: SetWrite<V>, cancel: CancellationToken| {
            handler(SetMapWrite::Member { key: key.clone(), write }, cancel)
        });
        Arc::new(NotifyWriteSet::new(set, member_handler))
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Map<K, SetHandle<V>> for NotifyWriteSetMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: SetHandle<V>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        let added = self.inner.try_add(key.clone(), value, overwrite, cancel).await?;
        if added {
            notify("set_map_added", &self.handler, SetMapWrite::Added { key }, cancel).await;
        }
        Ok(added)
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<SetHandle<V>>, StorageError> {
        let set = self.inner.get_value_or_default(key, cancel).await?;
        Ok(set.map(|set| self.wrap(key, set)))
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        let removed = self.inner.try_remove(key, cancel).await?;
        if removed {
            notify("set_map_removed", &self.handler, SetMapWrite::Removed { key: key.clone() }, cancel).await;
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

impl<K: StorageKey, V: StorageKey> KeysMap<K, SetHandle<V>> for NotifyWriteSetMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        delegate_keys::<K, SetHandle<V>, _>(&*self.inner, "inner", cancel)
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> SetMap<K, V> for NotifyWriteSetMap<K, V> {
    async fn get_value_or_empty(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<SetHandle<V>, StorageError> {
        let set = self.inner.get_value_or_empty(key, cancel).await?;
        Ok(self.wrap(key, set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::recorder::recorder;
    use crate::storage::{MemorySet, MemorySetMap};

    #[tokio::test]
    async fn test_member_writes_carry_their_key() {
        let rec = recorder();
        let inner = Arc::new(MemorySetMap::<String, u32>::new());
        let map = NotifyWriteSetMap::new(inner.clone(), rec.handler.clone());
        let cancel = CancellationToken::new();
        let key = "k".to_string();

        let set = map.get_value_or_empty(&key, &cancel).await.unwrap();
        set.add(1, &cancel).await.unwrap();
        assert!(set.try_remove(&1, &cancel).await.unwrap());

        assert_eq!(
            *rec.events.lock(),
            vec![
                SetMapWrite::Member { key: key.clone(), write: SetWrite::Added(1) },
                SetMapWrite::Member { key: key.clone(), write: SetWrite::Removed(1) },
            ]
        );
    }

    #[tokio::test]
    async fn test_whole_set_writes() {
        let rec = recorder();
        let map = NotifyWriteSetMap::new(Arc::new(MemorySetMap::<String, u32>::new()), rec.handler.clone());
        let cancel = CancellationToken::new();
        let key = "k".to_string();

        assert!(map.try_add(key.clone(), Arc::new(MemorySet::from_members([1, 2])), false, &cancel).await.unwrap());
        assert!(map.try_remove(&key, &cancel).await.unwrap());
        assert!(!map.try_remove(&key, &cancel).await.unwrap());

        assert_eq!(
            *rec.events.lock(),
            vec![SetMapWrite::Added { key: key.clone() }, SetMapWrite::Removed { key }]
        );
    }
}
