//! Shared fakes for the integration tests.
//!
//! The crate's own failing wrappers are test-only and not visible here, so
//! these mirror them on the public surface.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use resilience_engine::{
    BlockingQueue, KeysMap, Map, MemoryMap, MemoryQueue, MemorySet, Queue, Set, StorageError, StorageKey, StorageValue,
};

/// Log to the test writer when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn injected() -> StorageError {
    StorageError::Backend("injected failure".into())
}

/// In-memory map whose calls can be switched to fail.
pub struct FlakyMap<K, V> {
    inner: MemoryMap<K, V>,
    failing: AtomicBool,
    calls: AtomicU64,
}

impl<K: StorageKey, V: StorageValue> FlakyMap<K, V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryMap::new(),
            failing: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Direct access, bypassing failure injection and call counting.
    pub fn inner(&self) -> &MemoryMap<K, V> {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(injected())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<K: StorageKey, V: StorageValue> Map<K, V> for FlakyMap<K, V> {
    async fn try_add(
        &self,
        key: K,
        value: V,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.try_add(key, value, overwrite, cancel).await
    }

    async fn get_value_or_default(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<V>, StorageError> {
        self.check()?;
        self.inner.get_value_or_default(key, cancel).await
    }

    async fn try_remove(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.try_remove(key, cancel).await
    }

    async fn contains_key(&self, key: &K, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.contains_key(key, cancel).await
    }

    fn as_keys_map(&self) -> Option<&dyn KeysMap<K, V>> {
        Some(self)
    }
}

impl<K: StorageKey, V: StorageValue> KeysMap<K, V> for FlakyMap<K, V> {
    fn keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<K, StorageError>> {
        match self.check() {
            Ok(()) => self.inner.keys(cancel),
            Err(err) => stream::once(async move { Err::<K, _>(err) }).boxed(),
        }
    }
}

/// In-memory set counting every call made through it.
pub struct CountingSet<T: StorageKey> {
    inner: MemorySet<T>,
    calls: AtomicU64,
}

impl<T: StorageKey> CountingSet<T> {
    pub fn from_members(members: impl IntoIterator<Item = T>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySet::from_members(members),
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: StorageKey> Set<T> for CountingSet<T> {
    async fn add(&self, value: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.count();
        self.inner.add(value, cancel).await
    }

    async fn try_remove(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.count();
        self.inner.try_remove(value, cancel).await
    }

    fn stream<'a>(&'a self, cancel: &'a CancellationToken) -> BoxStream<'a, Result<T, StorageError>> {
        self.count();
        self.inner.stream(cancel)
    }

    async fn contains(&self, value: &T, cancel: &CancellationToken) -> Result<bool, StorageError> {
        self.count();
        self.inner.contains(value, cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.count();
        Set::len(&self.inner, cancel).await
    }
}

/// In-memory blocking queue whose calls can be switched to fail.
pub struct FlakyQueue<T> {
    inner: MemoryQueue<T>,
    failing: AtomicBool,
}

impl<T: StorageValue> FlakyQueue<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryQueue::new(),
            failing: AtomicBool::new(false),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryQueue<T> {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(injected())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<T: StorageValue> Queue<T> for FlakyQueue<T> {
    async fn enqueue(&self, item: T, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.check()?;
        self.inner.enqueue(item, cancel).await
    }

    async fn dequeue_or_default(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.check()?;
        self.inner.dequeue_or_default(cancel).await
    }

    async fn len(&self, cancel: &CancellationToken) -> Result<u64, StorageError> {
        self.check()?;
        Queue::len(&self.inner, cancel).await
    }
}

#[async_trait]
impl<T: StorageValue> BlockingQueue<T> for FlakyQueue<T> {
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Option<T>, StorageError> {
        self.check()?;
        self.inner.dequeue(cancel).await
    }
}
