// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Failure-injecting wrappers over the memory backends, for unit tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::memory::MemoryMap;
use super::memory_queue::MemoryQueue;
use super::memory_set::MemorySet;
use super::traits::{
    BlockingQueue, KeysMap, Map, Queue, Set, StorageError, StorageKey, StorageValue,
};

/// Shared failure switch and call counter.
#[derive(Default)]
pub(crate) struct Faults {
    failing: AtomicBool,
    fail_next: AtomicU64,
    calls: AtomicU64,
}

impl Faults {
    pub(crate) fn check(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scheduled = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled || self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn error_stream<'a, T: Send + 'a>() -> BoxStream<'a, Result<T, StorageError>> {
        stream::once(future::ready(Err(StorageError::Backend("injected failure".into())))).boxed()
    }
}

pub(crate) struct FailingMap<K, V> {
    inner: MemoryMap<K, V>,
    faults: Faults,
    expose_keys: bool,
}

impl<K: StorageKey, V: StorageValue> FailingMap<K, V> {
    pub(crate) fn new(inner: MemoryMap<K, V>) -> Self {
        Self { inner, faults: Faults::default(), expose_keys: true }
    }

    /// A map that hides its key enumeration capability.
    pub(crate) fn without_keys(inner: MemoryMap<K, V>) -> Self {
        Self { expose_keys: false, ..Self::new(inner) }
    }

    pub(crate) fn fail(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only the next `n` calls.
    pub(crate) fn fail_next(&self, n: u64) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u64 {
        self.faults.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inner(&self) -> &MemoryMap<K, V> {
        &self.inner
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for FailingMap<K, V> {
    async fn try_add(&self, key: K, value: V, overwrite: bool, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.faults.check()?;
        self.inner.try_add(key, value, overwrite, cancel).await
    }

    async fn get_value_or_default(&self, key: &K, cancel: &CancellationToken) -> Result<Option<V>, StorageError> {
        self.faults.check()?;
        self.inner.get_value_or_default(key, cancel).await
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.faults.check()?;
        self.inner.try_remove(key, cancel).await
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.faults.check()?;
        self.inner.contains_key(key, cancel).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        if self.expose_keys {
            Some(self)
        } else {
            None
        }
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for FailingMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        match self.faults.check() {
            Ok(()) => self.inner.keys(cancel),
            Err(_) => Faults::error_stream(),
        }
    }
}

/// Delays every point operation by a fixed amount.
pub(crate) struct SlowMap<K, V> {
    inner: MemoryMap<K, V>,
    delay: Duration,
}

impl<K: StorageKey, V: StorageValue> SlowMap<K, V> {
    pub(crate) fn new(inner: MemoryMap<K, V>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub(crate) fn inner(&self) -> &MemoryMap<K, V> {
        &self.inner
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for SlowMap<K, V> {
    async fn try_add(&self, key: K, value: V, overwrite: bool, cancel: &CancellationToken) -> Result<bool, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.try_add(key, value, overwrite, cancel).await
    }

    async fn get_value_or_default(&self, key: &K, cancel: &CancellationToken) -> Result<Option<V>, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_value_or_default(key, cancel).await
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.try_remove(key, cancel).await
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.contains_key(key, cancel).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        Some(self)
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for SlowMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        self.inner.keys(cancel)
    }
}

pub(crate) struct FailingSet<T: StorageKey> {
    inner: MemorySet<T>,
    faults: Faults,
}

impl<T: StorageKey> FailingSet<T> {
    pub(crate) fn new(inner: MemorySet<T>) -> Self {
        Self { inner, faults: Faults::default() }
    }

    pub(crate) fn fail(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only the next `n` calls.
    pub(crate) fn fail_next(&self, n: u64) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u64 {
        self.faults.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inner(&self) -> &MemorySet<T> {
        &self.inner
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for FailingSet<T> {
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.faults.check()?;
        self.inner.add(value, cancel).await
    }

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.faults.check()?;
        self.inner.try_remove(value, cancel).await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        match self.faults.check() {
            Ok(()) => self.inner.stream(cancel),
            Err(_) => Faults::error_stream(),
        }
    }

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.faults.check()?;
        self.inner.contains(value, cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.faults.check()?;
        Set::len(&self.inner, cancel).await
    }
}

pub(crate) struct FailingQueue<T> {
    inner: MemoryQueue<T>,
    faults: Faults,
}

impl<T: StorageValue> FailingQueue<T> {
    pub(crate) fn new() -> Self {
        Self { inner: MemoryQueue::new(), faults: Faults::default() }
    }

    pub(crate) fn fail(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only the next `n` calls.
    pub(crate) fn fail_next(&self, n: u64) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn inner(&self) -> &MemoryQueue<T> {
        &self.inner
    }
}

#[async_trait]
impl<T: StorageValue> Queue<T> for FailingQueue<T> {
    async fn enqueue(&self, item: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.faults.check()?;
        self.inner.enqueue(item, cancel).await
    }

    async fn dequeue_or_default(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.faults.check()?;
        self.inner.dequeue_or_default(cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.faults.check()?;
        Queue::len(&self.inner, cancel).await
    }
}

#[async_trait]
impl<T: StorageValue> BlockingQueue<T> for FailingQueue<T> {
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.faults.check()?;
        self.inner.dequeue(cancel).await
    }
}
