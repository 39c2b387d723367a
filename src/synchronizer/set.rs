// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Set synchronizer.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use super::{SyncReport, SyncRun, Synchronizer, DEFAULT_SYNC_TIMEOUT};
use crate::storage::traits::{Set, StorageError, StorageKey};

/// Makes `target` hold exactly the members of `source`: target-only members
/// are removed first, then every source member is added.
pub struct OverwriteSetSynchronizer<T> {
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OverwriteSetSynchronizer<T> {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for OverwriteSetSynchronizer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_TIMEOUT)
    }
}

#[async_trait]
impl<T, H> Synchronizer<H> for OverwriteSetSynchronizer<T>
where
    T: StorageKey,
    H: Set<T> + ?Sized,
{
    fn name(&self) -> &'static str {
        "overwrite_set"
    }

    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        let run = SyncRun::start("overwrite_set", self.timeout, cancel);
        run.drive(overwrite_members(source, target, &run)).await
    }
}

async fn overwrite_members<T, H>(source: &H, target: &H, run: &SyncRun) -> Result<(), StorageError>
where
    T: StorageKey,
    H: Set<T> + ?Sized,
{
    let token = run.token();
    let wanted: HashSet<T> = source.stream(token).try_collect().await?;
    let present: Vec<T> = target.stream(token).try_collect().await?;

    for member in present.iter().filter(|m| !wanted.contains(*m)) {
        if target.try_remove(member, token).await? {
            run.removed();
        }
    }
    for member in wanted {
        target.add(member, token).await?;
        run.wrote();
    }
    Ok(())
}
