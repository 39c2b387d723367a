// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory set and set-map backends.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, BoxStream, StreamExt};
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use super::memory::Slot;
use super::traits::{
    ttl_until, ExpirableKeyMap, KeysMap, Map, Set, SetHandle, SetMap, StorageError, StorageKey,
};

pub struct MemorySet<T: StorageKey> {
    members: DashSet<T>,
}

impl<T: StorageKey> MemorySet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: DashSet::new(),
        }
    }

    pub fn from_members(members: impl IntoIterator<Item = T>) -> Self {
        let set = Self::new();
        for member in members {
            set.members.insert(member);
        }
        set
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sorted-free snapshot of the members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.members.iter().map(|m| m.key().clone()).collect()
    }
}

impl<T: StorageKey> Default for MemorySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for MemorySet<T> {
    async fn add(&self, value: T, _cancel: &CancellationToken) -> Result<(), StorageError> {
        self.members.insert(value);
        Ok(())
    }

    async fn try_remove(&self, value: &T, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        Ok(self.members.remove(value).is_some())
    }

    fn stream<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        stream::iter(self.snapshot().into_iter().map(Ok)).boxed()
    }

    async fn contains(&self, value: &T, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        Ok(self.members.contains(value))
    }

    async fn len(&self, _cancel: &CancellationToken) -> Result<u64, StorageError> {
        Ok(self.members.len() as u64)
    }
}

type SetSlots<K, V> = DashMap<K, Slot<HashSet<V>>>;

/// Map of keys to sets. A key exists while its set has at least one member.
pub struct MemorySetMap<K: StorageKey, V: StorageKey> {
    sets: Arc<SetSlots<K, V>>,
}

impl<K: StorageKey, V: StorageKey> MemorySetMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sets: Arc::new(DashMap::new()),
        }
    }

    /// Number of live keys
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sets.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous snapshot of the members stored under `key`.
    #[must_use]
    pub fn members(&self, key: &K) -> Vec<V> {
        live_members(&self.sets, key)
            .map(|m| m.into_iter().collect())
            .unwrap_or_default()
    }

    fn handle(&self, key: &K) -> SetHandle<V> {
        Arc::new(KeyedSet {
            sets: self.sets.clone(),
            key: key.clone(),
        })
    }

    fn is_live(&self, key: &K) -> bool {
        live_members(&self.sets, key).is_some()
    }

    fn expire_at(&self, key: &K, deadline: Instant) -> bool {
        let now = Instant::now();
        if let Some(mut slot) = self.sets.get_mut(key) {
            if !slot.is_expired(now) {
                slot.expires_at = Some(deadline);
                return true;
            }
        }
        false
    }
}

impl<K: StorageKey, V: StorageKey> Default for MemorySetMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn live_members<K: StorageKey, V: StorageKey>(sets: &SetSlots<K, V>, key: &K) -> Option<HashSet<V>> {
    let now = Instant::now();
    let expired = match sets.get(key) {
        Some(slot) if !slot.is_expired(now) => return Some(slot.value.clone()),
        Some(_) => true,
        None => false,
    };
    if expired {
        sets.remove_if(key, |_, slot| slot.is_expired(now));
    }
    None
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Map<K, SetHandle<V>> for MemorySetMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: SetHandle<V>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        if !overwrite && self.is_live(&key) {
            return Ok(false);
        }
        let members: HashSet<V> = value.stream(cancel).try_collect().await?;
        if members.is_empty() {
            self.sets.remove(&key);
        } else {
            self.sets.insert(key, Slot::new(members));
        }
        Ok(true)
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        _cancel: &CancellationToken,
    ) -> Result<Option<SetHandle<V>>, StorageError> {
        Ok(self.is_live(key).then(|| self.handle(key)))
    }

    async fn try_remove(&self, key: &K, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        let now = Instant::now();
        Ok(self
            .sets
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    async fn contains_key(&self, key: &K, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        Ok(self.is_live(key))
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, SetHandle<V>>> {
        Some(self)
    }

    fn as_expirable(&self) -> Option<&dyn ExpirableKeyMap<K, SetHandle<V>>> {
        Some(self)
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> SetMap<K, V> for MemorySetMap<K, V> {
    async fn get_value_or_empty(
        &self,
        key: &K,
        _cancel: &CancellationToken,
    ) -> Result<SetHandle<V>, StorageError> {
        Ok(self.handle(key))
    }
}

impl<K: StorageKey, V: StorageKey> KeysMap<K, SetHandle<V>> for MemorySetMap<K, V> {
    fn keys<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        let now = Instant::now();
        let keys: Vec<K> = self
            .sets
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        stream::iter(keys.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> ExpirableKeyMap<K, SetHandle<V>> for MemorySetMap<K, V> {
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

/// Live view of the set stored under one key of a [`MemorySetMap`].
struct KeyedSet<K: StorageKey, V: StorageKey> {
    sets: Arc<SetSlots<K, V>>,
    key: K,
}

#[async_trait]
impl<K: StorageKey, V: StorageKey> Set<V> for KeyedSet<K, V> {
    async fn add(&self, value: V, _cancel: &CancellationToken) -> Result<(), StorageError> {
        let now = Instant::now();
        let mut slot = self
            .sets
            .entry(self.key.clone())
            .or_insert_with(|| Slot::new(HashSet::new()));
        if slot.is_expired(now) {
            *slot = Slot::new(HashSet::new());
        }
        slot.value.insert(value);
        Ok(())
    }

    async fn try_remove(&self, value: &V, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        let now = Instant::now();
        let (removed, emptied) = match self.sets.get_mut(&self.key) {
            Some(mut slot) if !slot.is_expired(now) => {
                let removed = slot.value.remove(value);
                (removed, slot.value.is_empty())
            }
            _ => (false, false),
        };
        if emptied {
            self.sets.remove_if(&self.key, |_, slot| slot.value.is_empty());
        }
        Ok(removed)
    }

    fn stream<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxStream<'a, Result<V, StorageError>> {
        let members = live_members(&self.sets, &self.key).unwrap_or_default();
        stream::iter(members.into_iter().map(Ok)).boxed()
    }

    async fn contains(&self, value: &V, _cancel: &CancellationToken) -> Result<bool, StorageError> {
        let now = Instant::now();
        Ok(self
            .sets
            .get(&self.key)
            .is_some_and(|slot| !slot.is_expired(now) && slot.value.contains(value)))
    }

    async fn len(&self, _cancel: &CancellationToken) -> Result<u64, StorageError> {
        Ok(live_members(&self.sets, &self.key).map_or(0, |m| m.len() as u64))
    }
}
