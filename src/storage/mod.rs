//! Storage contracts and the in-memory reference backends.
//!
//! - [`traits`]: `Map`, `KeysMap`, `ExpirableKeyMap`, `Set`, `Queue`,
//!   `BlockingQueue`, `SetMap` and [`StorageError`](traits::StorageError)
//! - [`memory`], [`memory_set`], [`memory_queue`]: DashMap-backed backends
//! - [`serializer`]: key serializers for scope membership records

pub mod traits;
pub mod memory;
pub mod memory_set;
pub mod memory_queue;
pub mod serializer;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryMap;
pub use memory_queue::MemoryQueue;
pub use memory_set::{MemorySet, MemorySetMap};
pub use serializer::{DisplayKeySerializer, JsonKeySerializer, KeySerializer};
