// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Health state and failover notifications.

use std::sync::Arc;

use crate::storage::traits::StorageError;

/// Health of the primary handle, one per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Up,
    Down,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Broadcast to every [`subscribe`](super::FailoverEngine::subscribe)r.
///
/// `PrimaryFailed` and `MasterDown` are sent together, once per Up→Down
/// edge; `MasterRecovered` once per Down→Up edge.
#[derive(Debug, Clone)]
pub enum FailoverEvent {
    PrimaryFailed { error: Arc<StorageError> },
    MasterDown,
    MasterRecovered,
}

impl FailoverEvent {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::PrimaryFailed { .. } => "primary_failed",
            Self::MasterDown => "master_down",
            Self::MasterRecovered => "master_recovered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Repair the secondary after a missed write
    PrimaryToSecondary,
    /// Catch the primary up after an outage
    SecondaryToPrimary,
}
