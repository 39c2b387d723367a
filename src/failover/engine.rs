// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The generic primary/secondary engine.
//!
//! One engine wraps two handles of the same contract `H` plus the
//! [`Synchronizer`] used to reconcile them. Facades pick a template per
//! operation:
//!
//! - [`fallback`](FailoverEngine::fallback): primary, then secondary on error
//! - [`replicate`](FailoverEngine::replicate): both handles, primary's result wins
//! - [`backup`](FailoverEngine::backup): primary, mirrored to secondary only
//!   when the primary accepted the write
//!
//! # State machine
//!
//! ```text
//!        primary call fails                 primary call succeeds
//!   Up ──────────────────────► Down ─────────────────────────────► resync ──► Up
//!       PrimaryFailed +                     (secondary → primary)     MasterRecovered
//!       MasterDown
//! ```
//!
//! Transitions and resync runs are serialized by a one-permit mutex and
//! re-check the state once the permit is held, so each edge fires its events
//! exactly once however many callers fail at the same time. Ordinary calls
//! never take the mutex.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{FailoverEvent, HealthState, SyncDirection};
use crate::config::ResilienceConfig;
use crate::metrics;
use crate::storage::traits::{StorageError, WriteOutcome};
use crate::synchronizer::{SyncReport, Synchronizer};

/// State shared by an engine and every engine derived from it.
struct FailoverCore {
    name: String,
    health: watch::Sender<HealthState>,
    events: broadcast::Sender<FailoverEvent>,
    sync_lock: Mutex<()>,
}

impl FailoverCore {
    fn emit(&self, event: FailoverEvent) {
        metrics::record_failover_event(&self.name, event.label());
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Something that can be resynchronized, erasing the handle type so derived
/// engines can drive their parent's recovery.
#[async_trait]
trait Resync: Send + Sync {
    async fn resync(
        &self,
        direction: SyncDirection,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError>;
}

struct ReplicaPair<H: ?Sized> {
    primary: Arc<H>,
    secondary: Arc<H>,
    synchronizer: Arc<dyn Synchronizer<H>>,
}

#[async_trait]
impl<H: ?Sized + Send + Sync + 'static> Resync for ReplicaPair<H> {
    async fn resync(
        &self,
        direction: SyncDirection,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        let (source, target) = match direction {
            SyncDirection::PrimaryToSecondary => (&*self.primary, &*self.secondary),
            SyncDirection::SecondaryToPrimary => (&*self.secondary, &*self.primary),
        };
        self.synchronizer.synchronize(source, target, cancel).await
    }
}

pub struct FailoverEngine<H: ?Sized> {
    pair: Arc<ReplicaPair<H>>,
    core: Arc<FailoverCore>,
    recovery: Arc<dyn Resync>,
}

impl<H: ?Sized> Clone for FailoverEngine<H> {
    fn clone(&self) -> Self {
        Self {
            pair: self.pair.clone(),
            core: self.core.clone(),
            recovery: self.recovery.clone(),
        }
    }
}

impl<H: ?Sized + Send + Sync + 'static> FailoverEngine<H> {
    /// Create an engine with default configuration.
    ///
    /// Fails with [`StorageError::MissingCapability`] when the synchronizer
    /// cannot run in either direction over these handles.
    pub fn new(
        name: impl Into<String>,
        primary: Arc<H>,
        secondary: Arc<H>,
        synchronizer: Arc<dyn Synchronizer<H>>,
    ) -> Result<Self, StorageError> {
        Self::with_config(name, primary, secondary, synchronizer, &ResilienceConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        primary: Arc<H>,
        secondary: Arc<H>,
        synchronizer: Arc<dyn Synchronizer<H>>,
        config: &ResilienceConfig,
    ) -> Result<Self, StorageError> {
        synchronizer.validate(&primary, &secondary)?;
        synchronizer.validate(&secondary, &primary)?;

        let name = name.into();
        let (health, _) = watch::channel(HealthState::Up);
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        metrics::set_primary_healthy(&name, true);
        debug!(engine = %name, synchronizer = synchronizer.name(), "Failover engine created");

        let pair = Arc::new(ReplicaPair {
            primary,
            secondary,
            synchronizer,
        });
        Ok(Self {
            recovery: pair.clone(),
            pair,
            core: Arc::new(FailoverCore {
                name,
                health,
                events,
                sync_lock: Mutex::new(()),
            }),
        })
    }

    /// Build an engine over another pair of handles that shares this
    /// engine's health, lock and events.
    ///
    /// Recovery of the derived engine resynchronizes this engine's pair; the
    /// derived pair is only used to repair a missed backup write.
    pub fn derive<C>(
        &self,
        primary: Arc<C>,
        secondary: Arc<C>,
        synchronizer: Arc<dyn Synchronizer<C>>,
    ) -> FailoverEngine<C>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        FailoverEngine {
            pair: Arc::new(ReplicaPair {
                primary,
                secondary,
                synchronizer,
            }),
            core: self.core.clone(),
            recovery: self.recovery.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn primary(&self) -> &Arc<H> {
        &self.pair.primary
    }

    pub fn secondary(&self) -> &Arc<H> {
        &self.pair.secondary
    }

    pub fn health(&self) -> HealthState {
        *self.core.health.borrow()
    }

    /// Get a receiver to watch health changes.
    pub fn health_receiver(&self) -> watch::Receiver<HealthState> {
        self.core.health.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FailoverEvent> {
        self.core.events.subscribe()
    }

    /// Run `op` on the primary; on error, switch to the secondary.
    ///
    /// A primary success while `Down` resynchronizes secondary → primary
    /// before returning. If that resync fails, the caller gets
    /// [`StorageError::Resync`] and the engine stays `Down`.
    pub async fn fallback<'a, T, F>(&'a self, op: F) -> Result<T, StorageError>
    where
        F: Fn(&'a H) -> BoxFuture<'a, Result<T, StorageError>> + Send,
        T: Send,
    {
        match op(&*self.pair.primary).await {
            Ok(value) => {
                self.recover_if_down().await?;
                Ok(value)
            }
            Err(err) => {
                self.mark_down(err).await;
                op(&*self.pair.secondary).await
            }
        }
    }

    /// Run `op` on both handles. Returns the primary's result if it
    /// succeeded, otherwise the secondary's.
    ///
    /// A secondary error after a primary success is logged and swallowed.
    pub async fn replicate<'a, T, F>(&'a self, op: F) -> Result<T, StorageError>
    where
        F: Fn(&'a H) -> BoxFuture<'a, Result<T, StorageError>> + Send,
        T: Send,
    {
        let primary = op(&*self.pair.primary).await;
        let secondary = op(&*self.pair.secondary).await;

        match primary {
            Ok(value) => {
                if let Err(err) = secondary {
                    metrics::record_secondary_error(&self.core.name);
                    warn!(engine = %self.core.name, error = %err, "Secondary write failed, primary result kept");
                }
                self.recover_if_down().await?;
                Ok(value)
            }
            Err(err) => {
                self.mark_down(err).await;
                secondary
            }
        }
    }

    /// Run `op` on the primary and mirror it to the secondary.
    ///
    /// A write the primary rejects (`false`) returns immediately without
    /// touching the secondary. A primary error falls back to the secondary.
    /// An accepted write reaches the secondary before any recovery resync,
    /// so the resync carries it back onto the primary instead of erasing it.
    /// A secondary error after a primary success resynchronizes
    /// primary → secondary; the caller still gets the primary's result.
    pub async fn backup<'a, T, F>(&'a self, op: F) -> Result<T, StorageError>
    where
        F: Fn(&'a H) -> BoxFuture<'a, Result<T, StorageError>> + Send,
        T: WriteOutcome + Send,
    {
        let value = match op(&*self.pair.primary).await {
            Ok(value) => value,
            Err(err) => {
                self.mark_down(err).await;
                return op(&*self.pair.secondary).await;
            }
        };
        if !value.is_accepted() {
            return Ok(value);
        }

        let mirrored = op(&*self.pair.secondary).await;
        self.recover_if_down().await?;

        if let Err(err) = mirrored {
            metrics::record_secondary_error(&self.core.name);
            warn!(engine = %self.core.name, error = %err, "Backup write missed, repairing secondary");
            self.repair_secondary().await;
        }
        Ok(value)
    }

    /// Run the synchronizer now, under the engine lock.
    pub async fn resync(
        &self,
        direction: SyncDirection,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, StorageError> {
        let _guard = self.core.sync_lock.lock().await;
        self.pair.resync(direction, cancel).await
    }

    /// Record a primary failure, transitioning Up → Down at most once.
    pub(crate) async fn mark_down(&self, err: StorageError) {
        if self.health() == HealthState::Down {
            debug!(engine = %self.core.name, error = %err, "Primary still failing");
            return;
        }

        let _guard = self.core.sync_lock.lock().await;
        if self.health() == HealthState::Down {
            // Another caller got here first
            debug!(engine = %self.core.name, error = %err, "Primary failure already handled");
            return;
        }

        self.core.health.send_replace(HealthState::Down);
        metrics::set_primary_healthy(&self.core.name, false);
        warn!(engine = %self.core.name, error = %err, "Primary failed, serving from secondary");
        self.core.emit(FailoverEvent::PrimaryFailed { error: Arc::new(err) });
        self.core.emit(FailoverEvent::MasterDown);
    }

    /// After a primary success: if `Down`, resync secondary → primary and
    /// transition back to `Up`.
    pub(crate) async fn recover_if_down(&self) -> Result<(), StorageError> {
        if self.health() == HealthState::Up {
            return Ok(());
        }

        let _guard = self.core.sync_lock.lock().await;
        if self.health() == HealthState::Up {
            return Ok(());
        }

        info!(engine = %self.core.name, "Primary answering again, resynchronizing from secondary");
        // Resync runs under its own timeout, independent of the caller
        let report = self
            .recovery
            .resync(SyncDirection::SecondaryToPrimary, &CancellationToken::new())
            .await
            .map_err(|err| {
                error!(engine = %self.core.name, error = %err, "Recovery resync failed, primary stays down");
                StorageError::Resync(Box::new(err))
            })?;

        self.core.health.send_replace(HealthState::Up);
        metrics::set_primary_healthy(&self.core.name, true);
        info!(
            engine = %self.core.name,
            written = report.written,
            removed = report.removed,
            partial = report.timed_out,
            "Primary recovered"
        );
        self.core.emit(FailoverEvent::MasterRecovered);
        Ok(())
    }

    async fn repair_secondary(&self) {
        let _guard = self.core.sync_lock.lock().await;
        match self
            .pair
            .resync(SyncDirection::PrimaryToSecondary, &CancellationToken::new())
            .await
        {
            Ok(report) => debug!(
                engine = %self.core.name,
                written = report.written,
                removed = report.removed,
                "Secondary repaired"
            ),
            Err(err) => error!(engine = %self.core.name, error = %err, "Secondary repair failed"),
        }
    }
}
