//! Source/cache topologies.
//!
//! [`CacheEngine`] implements cache-aside reads and write-through to the
//! source; [`CacheMap`] and [`CacheSet`] expose it through the storage
//! contracts. [`OnDemandCacheSetMap`] caches each key's set lazily and
//! keeps it warm with a sliding TTL.

pub mod engine;
pub mod expiration;
pub mod map;
pub mod on_demand;
pub mod set;

pub use engine::CacheEngine;
pub use expiration::{touch_key, ExpirationHook, KeyExpiration};
pub use map::CacheMap;
pub use on_demand::{LazySet, OnDemandCacheSet, OnDemandCacheSetMap};
pub use set::CacheSet;
