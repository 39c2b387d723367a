// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Primary/secondary failover and replication.
//!
//! [`FailoverEngine`] holds the health state machine; the facades below
//! implement the storage contracts on top of it and choose a template per
//! operation:
//!
//! | Facade | Writes | Reads | Resync |
//! |--------|--------|-------|--------|
//! | [`ReplicationMap`] | replicate | fallback | map strategy |
//! | [`BackupMap`] | backup | fallback | map strategy |
//! | [`BackupSet`] | backup | fallback | overwrite set |
//! | [`BackupSetMap`] | backup | fallback | map strategy (per-key sets: overwrite set) |
//! | [`FallbackQueue`] | fallback | fallback | queue copy |
//! | [`ReplicationBlockingQueue`] | replicate | fallback | queue mirror |

pub mod backup;
pub mod engine;
pub mod events;
pub mod queue;
pub mod replication;

use futures::future::BoxFuture;
use futures::{FutureExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::storage::traits::{require_keys, Map, StorageError, StorageKey};

pub use backup::{BackupMap, BackupSet, BackupSetMap};
pub use engine::FailoverEngine;
pub use events::{FailoverEvent, HealthState, SyncDirection};
pub use queue::{FallbackQueue, ReplicationBlockingQueue};
pub use replication::ReplicationMap;

/// Enumerate every key of one replica.
pub(crate) fn collect_keys<'a, K, V, H>(
    map: &'a H,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<Vec<K>, StorageError>>
where
    K: StorageKey,
    H: Map<K, V> + ?Sized,
{
    async move {
        let keys = require_keys(map, "replica")?;
        keys.keys(cancel).try_collect::<Vec<K>>().await
    }
    .boxed()
}

/// Both replicas can enumerate their keys.
pub(crate) fn replicas_have_keys<K, V, H>(primary: &H, secondary: &H) -> bool
where
    H: Map<K, V> + ?Sized,
{
    primary.as_keys_map().is_some() && secondary.as_keys_map().is_some()
}
