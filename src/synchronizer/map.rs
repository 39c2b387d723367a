// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Map synchronizers.
//!
//! All three work over any `H: Map<K, V>`, including set-maps whose values
//! are set handles. Key enumeration is resolved through
//! [`Map::as_keys_map`]; a missing capability is a configuration error.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use super::{SyncReport, SyncRun, Synchronizer, DEFAULT_SYNC_TIMEOUT};
use crate::storage::traits::{require_keys, Map, StorageError, StorageKey, StorageValue};

macro_rules! map_synchronizer {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<K, V> {
            timeout: Duration,
            _marker: PhantomData<fn() -> (K, V)>,
        }

        impl<K, V> $name<K, V> {
            #[must_use]
            pub fn new(timeout: Duration) -> Self {
                Self {
                    timeout,
                    _marker: PhantomData,
                }
            }

            #[must_use]
            pub fn timeout(&self) -> Duration {
                self.timeout
            }
        }

        impl<K, V> Default for $name<K, V> {
            fn default() -> Self {
                Self::new(DEFAULT_SYNC_TIMEOUT)
            }
        }
    };
}

map_synchronizer! {
    /// Full mirror: afterwards `target` holds exactly `source`'s entries.
    CopySynchronizer
}

map_synchronizer! {
    /// Additive only: copies source keys missing from the target and never
    /// overwrites or deletes. Target-only keys survive.
    DifferentialSynchronizer
}

map_synchronizer! {
    /// Refreshes the target's own keys from the source and deletes the ones
    /// the source no longer has. Never adds source-only keys.
    IntersectionSynchronizer
}

#[async_trait]
impl<K, V, H> Synchronizer<H> for CopySynchronizer<K, V>
where
    K: StorageKey,
    V: StorageValue,
    H: Map<K, V> + ?Sized,
{
    fn name(&self) -> &'static str {
        "copy"
    }

    fn validate(&self, source: &H, target: &H) -> Result<(), StorageError> {
        require_keys(source, "source")?;
        require_keys(target, "target")?;
        Ok(())
    }

    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        self.validate(source, target)?;
        let run = SyncRun::start("copy", self.timeout, cancel);
        run.drive(copy_entries(source, target, &run)).await
    }
}

async fn copy_entries<K, V, H>(source: &H, target: &H, run: &SyncRun) -> Result<(), StorageError>
where
    K: StorageKey,
    V: StorageValue,
    H: Map<K, V> + ?Sized,
{
    let token = run.token();
    let mut stale: HashSet<K> = require_keys(target, "target")?.keys(token).try_collect().await?;

    let mut keys = require_keys(source, "source")?.keys(token);
    while let Some(key) = keys.try_next().await? {
        if let Some(value) = source.get_value_or_default(&key, token).await? {
            stale.remove(&key);
            target.try_add(key, value, true, token).await?;
            run.wrote();
        }
    }

    for key in stale {
        if target.try_remove(&key, token).await? {
            run.removed();
        }
    }
    Ok(())
}

#[async_trait]
impl<K, V, H> Synchronizer<H> for DifferentialSynchronizer<K, V>
where
    K: StorageKey,
    V: StorageValue,
    H: Map<K, V> + ?Sized,
{
    fn name(&self) -> &'static str {
        "differential"
    }

    fn validate(&self, source: &H, _target: &H) -> Result<(), StorageError> {
        require_keys(source, "source").map(|_| ())
    }

    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        self.validate(source, target)?;
        let run = SyncRun::start("differential", self.timeout, cancel);
        run.drive(add_missing_entries(source, target, &run)).await
    }
}

async fn add_missing_entries<K, V, H>(source: &H, target: &H, run: &SyncRun) -> Result<(), StorageError>
where
    K: StorageKey,
    V: StorageValue,
    H: Map<K, V> + ?Sized,
{
    let token = run.token();
    let mut keys = require_keys(source, "source")?.keys(token);
    while let Some(key) = keys.try_next().await? {
        if let Some(value) = source.get_value_or_default(&key, token).await? {
            if target.try_add(key, value, false, token).await? {
                run.wrote();
            }
        }
    }
    Ok(())
}

#[async_trait]
impl<K, V, H> Synchronizer<H> for IntersectionSynchronizer<K, V>
where
    K: StorageKey,
    V: StorageValue,
    H: Map<K, V> + ?Sized,
{
    fn name(&self) -> &'static str {
        "intersection"
    }

    fn validate(&self, _source: &H, target: &H) -> Result<(), StorageError> {
        require_keys(target, "target").map(|_| ())
    }

    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        self.validate(source, target)?;
        let run = SyncRun::start("intersection", self.timeout, cancel);
        run.drive(refresh_target_entries(source, target, &run)).await
    }
}

async fn refresh_target_entries<K, V, H>(source: &H, target: &H, run: &SyncRun) -> Result<(), StorageError>
where
    K: StorageKey,
    V: StorageValue,
    H: Map<K, V> + ?Sized,
{
    let token = run.token();
    // Collected up front: the loop mutates the target
    let keys: Vec<K> = require_keys(target, "target")?.keys(token).try_collect().await?;
    for key in keys {
        match source.get_value_or_default(&key, token).await? {
            Some(value) => {
                target.try_add(key, value, true, token).await?;
                run.wrote();
            }
            None => {
                if target.try_remove(&key, token).await? {
                    run.removed();
                }
            }
        }
    }
    Ok(())
}
