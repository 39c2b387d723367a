// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named groups of keys for bulk invalidation.
//!
//! A [`MapScope`] records `"<map id>:<serialized key>"` members in a set map
//! under the scope's identifier. [`ScopedMap`] and [`ScopedSetMap`] add a
//! member on every successful insert and drop it on every successful
//! remove. [`Scope::clear`] removes every recorded key from the map that
//! wrote it, then deletes the scope's own record.
//!
//! Membership is eventually consistent with the maps: the record is written
//! after the map write, and clearing tolerates keys that are already gone.
//!
//! ```
//! # use std::sync::Arc;
//! # use resilience_engine::{DisplayKeySerializer, Map, MapScope, MemoryMap, MemorySetMap, Scope, ScopedMap};
//! # use tokio_util::sync::CancellationToken;
//! # tokio_test_block_on(async {
//! let scope = Arc::new(MapScope::new("tenant-7", Arc::new(MemorySetMap::new()))?);
//! let users = Arc::new(MemoryMap::<u64, String>::new());
//! let scoped = ScopedMap::new("users", users.clone(), scope.clone(), Arc::new(DisplayKeySerializer::<u64>::new()))?;
//!
//! let cancel = CancellationToken::new();
//! scoped.try_add(1, "ada".into(), false, &cancel).await?;
//! assert_eq!(scope.clear(&cancel).await?, 1);
//! assert!(users.is_empty());
//! # Ok::<_, resilience_engine::StorageError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod map;
pub mod set_map;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{FutureExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::storage::serializer::KeySerializer;
use crate::storage::traits::{Map, SetMap, StorageError, StorageKey};

pub use map::ScopedMap;
pub use set_map::{ScopedSet, ScopedSetMap};

/// Separates the map identifier from the serialized key in a member record.
pub const SCOPE_SEPARATOR: char = ':';

#[async_trait]
pub trait Scope: Send + Sync {
    fn identifier(&self) -> &str;

    /// Remove every member key from its map and forget the members.
    /// Returns the number of keys actually removed.
    async fn clear(&self, cancel: &CancellationToken) -> Result<usize, StorageError>;
}

/// Removes one serialized key from a registered map.
pub(crate) type Remover =
    Arc<dyn Fn(String, CancellationToken) -> BoxFuture<'static, Result<bool, StorageError>> + Send + Sync>;

/// Remover deleting keys from `map`.
pub(crate) fn remover<K, V, H>(map: Arc<H>, serializer: Arc<dyn KeySerializer<K>>) -> Remover
where
    K: StorageKey,
    H: Map<K, V> + ?Sized + 'static,
{
    Arc::new(move |raw: String, cancel: CancellationToken| {
        let map = map.clone();
        let serializer = serializer.clone();
        async move {
            let key = serializer.deserialize_key(&raw)?;
            map.try_remove(&key, &cancel).await
        }
        .boxed()
    })
}

/// Reject empty identifiers and identifiers containing [`SCOPE_SEPARATOR`].
pub(crate) fn validate_identifier(kind: &str, identifier: &str) -> Result<(), StorageError> {
    if identifier.is_empty() {
        return Err(StorageError::InvalidArgument(format!("{kind} identifier is empty")));
    }
    if identifier.contains(SCOPE_SEPARATOR) {
        return Err(StorageError::InvalidArgument(format!(
            "{kind} identifier '{identifier}' contains '{SCOPE_SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Scope backed by a `SetMap<String, String>` keyed by scope identifier.
pub struct MapScope {
    identifier: String,
    members: Arc<dyn SetMap<String, String>>,
    maps: DashMap<String, Remover>,
}

impl MapScope {
    pub fn new(
        identifier: impl Into<String>,
        members: Arc<dyn SetMap<String, String>>,
    ) -> Result<Self, StorageError> {
        let identifier = identifier.into();
        validate_identifier("scope", &identifier)?;
        Ok(Self {
            identifier,
            members,
            maps: DashMap::new(),
        })
    }

    /// Identifiers of the maps currently registered.
    pub fn registered_maps(&self) -> Vec<String> {
        self.maps.iter().map(|e| e.key().clone()).collect()
    }

    pub(crate) fn register(&self, map_id: &str, remover: Remover) -> Result<(), StorageError> {
        validate_identifier("map", map_id)?;
        match self.maps.entry(map_id.to_string()) {
            Entry::Occupied(_) => Err(StorageError::InvalidArgument(format!(
                "map '{}' is already registered in scope '{}'",
                map_id, self.identifier
            ))),
            Entry::Vacant(slot) => {
                slot.insert(remover);
                debug!(scope = %self.identifier, map = %map_id, "Registered scoped map");
                Ok(())
            }
        }
    }

    pub(crate) fn unregister(&self, map_id: &str) {
        if self.maps.remove(map_id).is_some() {
            debug!(scope = %self.identifier, map = %map_id, "Unregistered scoped map");
        }
    }

    pub async fn add_key(
        &self,
        map_id: &str,
        raw_key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.members
            .get_value_or_empty(&self.identifier, cancel)
            .await?
            .add(member(map_id, raw_key), cancel)
            .await
    }

    pub async fn remove_key(
        &self,
        map_id: &str,
        raw_key: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        self.members
            .get_value_or_empty(&self.identifier, cancel)
            .await?
            .try_remove(&member(map_id, raw_key), cancel)
            .await
    }

    /// Number of recorded members.
    pub async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.members
            .get_value_or_empty(&self.identifier, cancel)
            .await?
            .len(cancel)
            .await
    }
}

fn member(map_id: &str, raw_key: &str) -> String {
    format!("{map_id}{SCOPE_SEPARATOR}{raw_key}")
}

#[async_trait]
impl Scope for MapScope {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn clear(&self, cancel: &CancellationToken) -> Result<usize, StorageError> {
        let set = self.members.get_value_or_empty(&self.identifier, cancel).await?;
        let recorded: Vec<String> = set.stream(cancel).try_collect().await?;

        let mut removed = 0;
        for entry in &recorded {
            let Some((map_id, raw_key)) = entry.split_once(SCOPE_SEPARATOR) else {
                warn!(scope = %self.identifier, member = %entry, "Skipping malformed scope member");
                continue;
            };
            // Clone out so no map guard is held across the await
            let remover = self.maps.get(map_id).map(|r| r.value().clone());
            let Some(remover) = remover else {
                debug!(scope = %self.identifier, map = %map_id, "Skipping member of unregistered map");
                continue;
            };
            if remover(raw_key.to_string(), cancel.clone()).await? {
                removed += 1;
            } else {
                debug!(scope = %self.identifier, member = %entry, "Scoped key already gone");
            }
        }

        self.members.try_remove(&self.identifier, cancel).await?;
        metrics::record_scope_clear(&self.identifier, removed);
        info!(
            scope = %self.identifier,
            members = recorded.len(),
            removed,
            "Scope cleared"
        );
        Ok(removed)
    }
}
