// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sliding expiration for cached keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::storage::traits::{Map, SetHandle, SetMap, StorageError, StorageKey};

/// Push `key`'s expiration `ttl` into the future. A no-op returning `false`
/// when the map cannot expire keys.
pub async fn touch_key<K, V, H>(
    map: &H,
    key: &K,
    ttl: Duration,
    cancel: &CancellationToken,
) -> Result<bool, StorageError>
where
    H: Map<K, V> + ?Sized,
{
    match map.as_expirable() {
        Some(expirable) => expirable.set_relative_key_expiration(key, ttl, cancel).await,
        None => Ok(false),
    }
}

/// Hook fired whenever a cached set gains members.
#[async_trait]
pub trait ExpirationHook: Send + Sync {
    async fn touch(&self, cancel: &CancellationToken) -> Result<bool, StorageError>;
}

/// Slides the expiration of one key of a cache set map.
pub struct KeyExpiration<K, V> {
    map: Arc<dyn SetMap<K, V>>,
    key: K,
    ttl: Duration,
}

impl<K: StorageKey, V> KeyExpiration<K, V> {
    pub fn new(map: Arc<dyn SetMap<K, V>>, key: K, ttl: Duration) -> Self {
        Self { map, key, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl<K: StorageKey, V: Send + Sync + 'static> ExpirationHook for KeyExpiration<K, V> {
    async fn touch(&self, cancel: &CancellationToken) -> Result<bool, StorageError> {
        touch_key::<K, SetHandle<V>, _>(&*self.map, &self.key, self.ttl, cancel).await
    }
}
