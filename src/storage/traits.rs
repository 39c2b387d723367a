// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage contracts consumed by the engines.
//!
//! Every backend (Redis, SQL, search, brokers, the in-memory structures in
//! [`super::memory`]) implements one or more of these traits. The engines
//! never look past this surface.
//!
//! Optional capabilities (key enumeration, key expiration) are discovered
//! through typed queries on [`Map`] rather than downcasting.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("{role} handle does not implement {capability}")]
    MissingCapability {
        role: &'static str,
        capability: &'static str,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Resynchronization failed: {0}")]
    Resync(#[source] Box<StorageError>),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True for failures raised by a backend call, as opposed to
    /// configuration or argument errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Keys and set members.
pub trait StorageKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> StorageKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Map values and queue items.
pub trait StorageValue: Clone + Send + Sync + 'static {}

impl<T> StorageValue for T where T: Clone + Send + Sync + 'static {}

/// Shared handle to a set, as returned by [`SetMap::get_value_or_empty`].
pub type SetHandle<T> = Arc<dyn Set<T>>;

#[async_trait]
pub trait Map<K, V>: Send + Sync {
    /// Insert `value` under `key`. Returns `false` when the key exists and
    /// `overwrite` is not set.
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError>;

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<V>, StorageError>;

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError>;

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError>;

    /// Key enumeration capability, if this handle supports it.
    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        None
    }

    /// Per-key expiration capability, if this handle supports it.
    fn as_expirable(&self) -> Option<&dyn ExpirableKeyMap<K, V>> {
        None
    }
}

pub trait KeysMap<K, V>: Map<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>>;
}

#[async_trait]
pub trait ExpirableKeyMap<K, V>: Map<K, V> {
    /// Expire `key` after `ttl`. Returns `false` if the key does not exist.
    async fn set_relative_key_expiration(
        &self,
        key: &K,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError>;

    /// Expire `key` at a wall-clock instant; an instant in the past expires
    /// the key immediately.
    async fn set_absolute_key_expiration(
        &self,
        key: &K,
        at: SystemTime,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError>;
}

/// Relative TTL remaining until `at`, saturating at zero.
#[must_use]
pub fn ttl_until(at: SystemTime) -> Duration {
    at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO)
}

#[async_trait]
pub trait Set<T>: Send + Sync {
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError>;

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError>;

    /// All members, in no particular order.
    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>>;

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError>;

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait Queue<T>: Send + Sync {
    async fn enqueue(&self, item: T, cancel: &CancellationToken) -> Result<(), StorageError>;

    /// Pop the head of the queue, `None` when empty.
    async fn dequeue_or_default(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError>;

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait BlockingQueue<T>: Queue<T> {
    /// Wait for the next item. Cancellation ends the wait with `Ok(None)`.
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError>;
}

#[async_trait]
pub trait SetMap<K, V>: Map<K, SetHandle<V>> {
    /// The set stored under `key`; an empty set when the key is absent.
    async fn get_value_or_empty(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<SetHandle<V>, StorageError>;
}

/// Business-level outcome of a write: `false` means the store refused it
/// without failing.
pub trait WriteOutcome {
    fn is_accepted(&self) -> bool;
}

impl WriteOutcome for bool {
    fn is_accepted(&self) -> bool {
        *self
    }
}

impl WriteOutcome for () {
    fn is_accepted(&self) -> bool {
        true
    }
}

/// Whether a cache read produced something worth returning.
pub trait CacheProbe {
    fn is_hit(&self) -> bool;
}

impl<T> CacheProbe for Option<T> {
    fn is_hit(&self) -> bool {
        self.is_some()
    }
}

impl CacheProbe for bool {
    fn is_hit(&self) -> bool {
        *self
    }
}

impl CacheProbe for u64 {
    fn is_hit(&self) -> bool {
        *self > 0
    }
}

impl<T> CacheProbe for Vec<T> {
    fn is_hit(&self) -> bool {
        !self.is_empty()
    }
}

/// Resolve the key enumeration capability or fail with a configuration error.
pub fn require_keys<'h, K, V, H>(
    handle: &'h H,
    role: &'static str,
) -> Result<&'h dyn KeysMap<K, V>, StorageError>
where
    H: Map<K, V> + ?Sized,
{
    handle.as_keys_map().ok_or(StorageError::MissingCapability {
        role,
        capability: "KeysMap",
    })
}

/// Enumerate the keys of `handle`, or yield a single capability error.
pub(crate) fn delegate_keys<'a, K, V, H>(
    handle: &'a H,
    role: &'static str,
    cancel: &'a CancellationToken,
) -> BoxStream<'a, Result<K, StorageError>>
where
    K: Send + 'a,
    V: 'a,
    H: Map<K, V> + ?Sized,
{
    match require_keys(handle, role) {
        Ok(keys) => keys.keys(cancel),
        Err(err) => stream::once(future::ready(Err(err))).boxed(),
    }
}

/// Stream the items produced by `fut` once it resolves.
pub(crate) fn deferred_stream<'a, T, F>(fut: F) -> BoxStream<'a, Result<T, StorageError>>
where
    T: Send + 'a,
    F: Future<Output = Result<Vec<T>, StorageError>> + Send + 'a,
{
    stream::once(fut)
        .map(|result| match result {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).left_stream(),
            Err(err) => stream::once(future::ready(Err(err))).right_stream(),
        })
        .flatten()
        .boxed()
}
