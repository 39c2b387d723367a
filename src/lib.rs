//! # Resilience Engine
//!
//! Failover, caching and scoping middleware over abstract storage contracts.
//!
//! ## Architecture
//!
//! Every engine wraps two handles of the same contract and decides, per
//! operation, which handle serves it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Facades                            │
//! │  • ReplicationMap, BackupMap, BackupSetMap, FallbackQueue   │
//! │  • CacheMap, CacheSet, OnDemandCacheSetMap                  │
//! │  • NotifyWrite*, Scoped*                                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (fallback / replicate / backup)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               FailoverEngine / CacheEngine                  │
//! │  • Up/Down health behind one mutex per engine               │
//! │  • PrimaryFailed / MasterDown / MasterRecovered events      │
//! │  • Cache-aside reads, source-first writes                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (resync on recovery)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Synchronizers                         │
//! │  • Copy, Differential, Intersection (maps)                  │
//! │  • Overwrite (sets), Queue copy and mirror (queues)         │
//! │  • Bounded by a timeout; partial convergence is not an error│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resilience_engine::{BackupMap, FailoverEvent, Map, MemoryMap, ResilienceConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), resilience_engine::StorageError> {
//!     let config = ResilienceConfig::default();
//!     let map = BackupMap::new(
//!         "sessions",
//!         Arc::new(MemoryMap::<String, String>::new()),
//!         Arc::new(MemoryMap::<String, String>::new()),
//!         &config,
//!     )?;
//!
//!     let mut events = map.engine().subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let FailoverEvent::PrimaryFailed { error } = &event {
//!                 eprintln!("primary failed: {error}");
//!             }
//!         }
//!     });
//!
//!     let cancel = CancellationToken::new();
//!     map.try_add("user:1".into(), "token".into(), true, &cancel).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`ResilienceConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`storage`]: Storage contracts and in-memory backends
//! - [`synchronizer`]: Convergence algorithms
//! - [`failover`]: [`FailoverEngine`] and the replication/backup facades
//! - [`cache`]: [`CacheEngine`] and the cache facades
//! - [`notify`]: Write notification decorators
//! - [`scope`]: Scoped key tracking and bulk invalidation

pub mod config;
pub mod storage;
pub mod synchronizer;
pub mod failover;
pub mod cache;
pub mod notify;
pub mod scope;
pub mod metrics;

pub use config::ResilienceConfig;
pub use storage::traits::{
    BlockingQueue, CacheProbe, ExpirableKeyMap, KeysMap, Map, Queue, Set, SetHandle, SetMap,
    StorageError, StorageKey, StorageValue, WriteOutcome,
};
pub use storage::{
    DisplayKeySerializer, JsonKeySerializer, KeySerializer, MemoryMap, MemoryQueue, MemorySet,
    MemorySetMap,
};
pub use synchronizer::{
    CopySynchronizer, DifferentialSynchronizer, IntersectionSynchronizer, MapSyncStrategy,
    OverwriteSetSynchronizer, QueueCopySynchronizer, QueueMirrorSynchronizer, SyncReport, Synchronizer,
};
pub use failover::{
    BackupMap, BackupSet, BackupSetMap, FailoverEngine, FailoverEvent, FallbackQueue, HealthState,
    ReplicationBlockingQueue, ReplicationMap, SyncDirection,
};
pub use cache::{
    CacheEngine, CacheMap, CacheSet, ExpirationHook, KeyExpiration, LazySet, OnDemandCacheSet,
    OnDemandCacheSetMap,
};
pub use notify::{
    write_handler, MapWrite, NotifyWriteMap, NotifyWriteSet, NotifyWriteSetMap, SetMapWrite,
    SetWrite, WriteHandler,
};
pub use scope::{MapScope, Scope, ScopedMap, ScopedSet, ScopedSetMap, SCOPE_SEPARATOR};
pub use metrics::SyncTimer;
