// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronizers: timeout-bounded algorithms converging a target handle
//! toward a source handle.
//!
//! | Synchronizer | Handles | Deletes target-only data |
//! |--------------|---------|--------------------------|
//! | [`CopySynchronizer`] | `Map` (both `KeysMap`) | yes |
//! | [`DifferentialSynchronizer`] | `Map` (source `KeysMap`) | **no** |
//! | [`IntersectionSynchronizer`] | `Map` (target `KeysMap`) | yes |
//! | [`OverwriteSetSynchronizer`] | `Set` | yes |
//! | [`QueueCopySynchronizer`] | `Queue` | drains the source |
//! | [`QueueMirrorSynchronizer`] | `Queue` | yes, source kept |
//!
//! Each run derives its own cancellation token from the caller's and stops
//! when the configured timeout elapses. Stopping early is not an error: the
//! run returns a [`SyncReport`] with `timed_out` set and the partial counts.

pub mod map;
pub mod queue;
pub mod set;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::{self, SyncTimer};
use crate::storage::traits::{Map, StorageError, StorageKey, StorageValue};

pub use map::{CopySynchronizer, DifferentialSynchronizer, IntersectionSynchronizer};
pub use queue::{QueueCopySynchronizer, QueueMirrorSynchronizer};
pub use set::OverwriteSetSynchronizer;

/// Default bound for one synchronizer run.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Synchronizer<H: ?Sized + Send + Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check that `source` and `target` expose the capabilities this
    /// algorithm needs.
    fn validate(&self, _source: &H, _target: &H) -> Result<(), StorageError> {
        Ok(())
    }

    /// Converge `target` toward `source`.
    async fn synchronize(
        &self,
        source: &H,
        target: &H,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError>;
}

/// Outcome of one synchronizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries written (or moved) into the target
    pub written: u64,
    /// Entries deleted from the target
    pub removed: u64,
    /// The run stopped early on timeout or cancellation
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// Which map synchronizer to run when resynchronizing a map pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSyncStrategy {
    #[default]
    Copy,
    Differential,
    Intersection,
}

impl MapSyncStrategy {
    /// Build the synchronizer for map handles of type `H`.
    pub fn build<K, V, H>(self, timeout: Duration) -> Arc<dyn Synchronizer<H>>
    where
        K: StorageKey,
        V: StorageValue,
        H: Map<K, V> + ?Sized + 'static,
    {
        match self {
            Self::Copy => Arc::new(CopySynchronizer::<K, V>::new(timeout)),
            Self::Differential => Arc::new(DifferentialSynchronizer::<K, V>::new(timeout)),
            Self::Intersection => Arc::new(IntersectionSynchronizer::<K, V>::new(timeout)),
        }
    }
}

/// Bookkeeping for one bounded run.
pub(crate) struct SyncRun {
    name: &'static str,
    token: CancellationToken,
    timeout: Duration,
    written: AtomicU64,
    removed: AtomicU64,
    timer: SyncTimer,
}

impl SyncRun {
    pub(crate) fn start(name: &'static str, timeout: Duration, cancel: &CancellationToken) -> Self {
        Self {
            name,
            token: cancel.child_token(),
            timeout,
            written: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            timer: SyncTimer::new(name),
        }
    }

    /// Token handed to every backend call of this run.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn wrote(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Run `body` until it completes, the timeout elapses, or the caller
    /// cancels. Only a backend error from `body` is reported as `Err`.
    pub(crate) async fn drive<F>(&self, body: F) -> Result<SyncReport, StorageError>
    where
        F: Future<Output = Result<(), StorageError>>,
    {
        let timed_out = if self.token.is_cancelled() {
            true
        } else {
            tokio::select! {
                result = tokio::time::timeout(self.timeout, body) => match result {
                    Ok(Ok(())) => false,
                    Ok(Err(err)) => {
                        metrics::record_sync_run(self.name, "failure");
                        warn!(synchronizer = self.name, error = %err, "Synchronization failed");
                        return Err(err);
                    }
                    Err(_) => true,
                },
                _ = self.token.cancelled() => true,
            }
        };
        if timed_out {
            self.token.cancel();
        }

        let report = SyncReport {
            written: self.written.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            timed_out,
            elapsed: self.timer.elapsed(),
        };
        metrics::record_sync_items(self.name, report.written, report.removed);
        if timed_out {
            metrics::record_sync_run(self.name, "timeout");
            warn!(
                synchronizer = self.name,
                written = report.written,
                removed = report.removed,
                "Synchronization stopped early, convergence is partial"
            );
        } else {
            metrics::record_sync_run(self.name, "success");
            debug!(
                synchronizer = self.name,
                written = report.written,
                removed = report.removed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Synchronization completed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryMap;

    #[test]
    fn test_strategy_names() {
        let copy = MapSyncStrategy::Copy.build::<u32, u32, MemoryMap<u32, u32>>(DEFAULT_SYNC_TIMEOUT);
        let diff = MapSyncStrategy::Differential.build::<u32, u32, MemoryMap<u32, u32>>(DEFAULT_SYNC_TIMEOUT);
        let inter = MapSyncStrategy::Intersection.build::<u32, u32, MemoryMap<u32, u32>>(DEFAULT_SYNC_TIMEOUT);

        assert_eq!(copy.name(), "copy");
        assert_eq!(diff.name(), "differential");
        assert_eq!(inter.name(), "intersection");
    }

    #[test]
    fn test_strategy_deserialize() {
        let strategy: MapSyncStrategy = serde_json::from_str("\"differential\"").unwrap();
        assert_eq!(strategy, MapSyncStrategy::Differential);
        assert_eq!(MapSyncStrategy::default(), MapSyncStrategy::Copy);
    }

    #[tokio::test]
    async fn test_run_reports_counts() {
        let run = SyncRun::start("copy", DEFAULT_SYNC_TIMEOUT, &CancellationToken::new());
        let report = run
            .drive(async {
                run.wrote();
                run.wrote();
                run.removed();
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.removed, 1);
        assert!(!report.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_keeps_partial_progress() {
        let run = SyncRun::start("copy", Duration::from_millis(50), &CancellationToken::new());
        let report = run
            .drive(async {
                run.wrote();
                tokio::time::sleep(Duration::from_secs(60)).await;
                run.wrote();
                Ok(())
            })
            .await
            .unwrap();

        assert!(report.timed_out);
        assert_eq!(report.written, 1);
        assert!(run.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_caller_cancelled_is_not_an_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = SyncRun::start("copy", DEFAULT_SYNC_TIMEOUT, &cancel);
        let report = run.drive(async { Ok(()) }).await.unwrap();
        assert!(report.timed_out);
        assert_eq!(report.written, 0);
    }

    #[tokio::test]
    async fn test_run_propagates_backend_error() {
        let run = SyncRun::start("copy", DEFAULT_SYNC_TIMEOUT, &CancellationToken::new());
        let result = run.drive(async { Err(StorageError::Backend("down".into())) }).await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
    }
}
