// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory map backend.
//!
//! DashMap-backed implementation of [`Map`], [`KeysMap`] and
//! [`ExpirableKeyMap`]. Expired entries are dropped lazily when touched and
//! in bulk by [`MemoryMap::purge_expired`].

use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::traits::{
    ttl_until, ExpirableKeyMap, KeysMap, Map, StorageError, StorageKey, StorageValue,
};

/// A stored value plus its optional deadline.
#[derive(Debug, Clone)]
pub(crate) struct Slot<V> {
    pub(crate) value: V,
    pub(crate) expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    pub(crate) fn new(value: V) -> Self {
        Self { value, expires_at: None }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub struct MemoryMap<K, V> {
    data: DashMap<K, Slot<V>>,
}

impl<K: StorageKey, V: StorageValue> MemoryMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of live (non-expired) entries
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    /// Drop every expired entry, returning how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.data.len())
    }

    /// Synchronous snapshot of a live value (test and debugging helper).
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.live(key, |v| v.clone())
    }

    fn live<R>(&self, key: &K, read: impl FnOnce(&V) -> R) -> Option<R> {
        let now = Instant::now();
        let expired = match self.data.get(key) {
            Some(slot) if !slot.is_expired(now) => return Some(read(&slot.value)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.data.remove_if(key, |_, slot| slot.is_expired(now));
        }
        None
    }

    fn expire_at(&self, key: &K, deadline: Instant) -> bool {
        let now = Instant::now();
        if let Some(mut slot) = self.data.get_mut(key) {
            if !slot.is_expired(now) {
                slot.expires_at = Some(deadline);
                return true;
            }
        }
        false
    }
}

impl<K: StorageKey, V: StorageValue> Default for MemoryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for MemoryMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        _cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        let now = Instant::now();
        match self.data.entry(key) {
            Entry::Occupied(mut occupied) => {
                if overwrite || occupied.get().is_expired(now) {
                    occupied.insert(Slot::new(value));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value));
                Ok(true)
            }
        }
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        _cancel: &CancellationToken,
    ) -> Result<Option<V>, StorageError> {
        Ok(self.live(key, |v| v.clone()))
    }

    async fn try_remove(&self, key: &K, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        let now = Instant::now();
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    async fn contains_key(&self, key: &K, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        Ok(self.live(key, |_| ()).is_some())
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        Some(self)
    }

    fn as_expirable(&self) -> Option<&dyn ExpirableKeyMap<K, V>> {
        Some(self)
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for MemoryMap<K, V> {
    fn keys<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        let now = Instant::now();
        // Snapshot so callers may mutate the map while iterating
        let keys: Vec<K> = self
            .data
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        stream::iter(keys.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> ExpirableKeyMap<K, V> for MemoryMap<K, V> {
    async fn set_relative_key_expiration(
        &self,
        key: &K,
        ttl: Duration,
        _cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        Ok(self.expire_at(key, Instant::now() + ttl))
    }

    async fn set_absolute_key_expiration(
        &self,
        key: &K,
        at: SystemTime,
        _cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        Ok(self.expire_at(key, Instant::now() + ttl_until(at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::Arc;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_new_map_is_empty() {
        let map: MemoryMap<String, i32> = MemoryMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[tokio::test]
    async fn test_try_add_and_get() {
        let map = MemoryMap::new();
        let cancel = token();

        assert!(map.try_add("a".to_string(), 1, false, &cancel).await.unwrap());
        assert_eq!(map.get_value_or_default(&"a".to_string(), &cancel).await.unwrap(), Some(1));
        assert!(map.contains_key(&"a".to_string(), &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_try_add_without_overwrite_keeps_existing() {
        let map = MemoryMap::new();
        let cancel = token();

        map.try_add("a".to_string(), 1, false, &cancel).await.unwrap();
        assert!(!map.try_add("a".to_string(), 2, false, &cancel).await.unwrap());
        assert_eq!(map.get(&"a".to_string()), Some(1));

        assert!(map.try_add("a".to_string(), 3, true, &cancel).await.unwrap());
        assert_eq!(map.get(&"a".to_string()), Some(3));
    }

    #[tokio::test]
    async fn test_try_remove() {
        let map = MemoryMap::new();
        let cancel = token();

        map.try_add(1u32, "one".to_string(), false, &cancel).await.unwrap();
        assert!(map.try_remove(&1, &cancel).await.unwrap());
        assert!(!map.try_remove(&1, &cancel).await.unwrap());
        assert!(map.get_value_or_default(&1, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_snapshot() {
        let map = MemoryMap::new();
        let cancel = token();
        for i in 0..5u32 {
            map.try_add(i, i * 10, false, &cancel).await.unwrap();
        }

        let mut keys: Vec<u32> = map.keys(&cancel).try_collect().await.unwrap();
        keys.sort_unstable();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_relative_expiration_hides_entry() {
        let map = MemoryMap::new();
        let cancel = token();
        map.try_add("k".to_string(), 1, false, &cancel).await.unwrap();

        assert!(map
            .set_relative_key_expiration(&"k".to_string(), Duration::ZERO, &cancel)
            .await
            .unwrap());

        assert!(!map.contains_key(&"k".to_string(), &cancel).await.unwrap());
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_expiration_on_missing_key_returns_false() {
        let map: MemoryMap<String, i32> = MemoryMap::new();
        let result = map
            .set_relative_key_expiration(&"missing".to_string(), Duration::from_secs(1), &token())
            .await
            .unwrap();
        assert!(!result);
    }

    #[tokio::test]
    async fn test_overwrite_clears_expiration() {
        let map = MemoryMap::new();
        let cancel = token();
        map.try_add("k".to_string(), 1, false, &cancel).await.unwrap();
        map.set_relative_key_expiration(&"k".to_string(), Duration::from_millis(10), &cancel)
            .await
            .unwrap();
        map.try_add("k".to_string(), 2, true, &cancel).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(map.get(&"k".to_string()), Some(2));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let map = MemoryMap::new();
        let cancel = token();
        for i in 0..4u32 {
            map.try_add(i, i, false, &cancel).await.unwrap();
        }
        map.set_absolute_key_expiration(&0, SystemTime::now(), &cancel).await.unwrap();
        map.set_absolute_key_expiration(&1, SystemTime::UNIX_EPOCH, &cancel).await.unwrap();

        assert_eq!(map.purge_expired(), 2);
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_capabilities_exposed() {
        let map: MemoryMap<u32, u32> = MemoryMap::default();
        assert!(map.as_keys_map().is_some());
        assert!(map.as_expirable().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let map = Arc::new(MemoryMap::new());
        let mut handles = vec![];

        for batch in 0..10u32 {
            let map = map.clone();
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for i in 0..10u32 {
                    map.try_add(batch * 100 + i, i, false, &cancel).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(map.len(), 100);
    }
}
