//! Configuration for the resilience engines.
//!
//! # Example
//!
//! ```
//! use resilience_engine::{MapSyncStrategy, ResilienceConfig};
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = ResilienceConfig::default();
//! assert_eq!(config.synchronization_timeout(), Duration::from_secs(30));
//!
//! // Tuned config
//! let config = ResilienceConfig {
//!     map_sync_strategy: MapSyncStrategy::Differential,
//!     cache_ttl_ms: Some(60_000),
//!     ..Default::default()
//! };
//! assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::synchronizer::MapSyncStrategy;

/// Configuration shared by the failover and cache engines.
///
/// All fields have defaults, so an empty JSON object deserializes to
/// [`ResilienceConfig::default`].
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Upper bound for one synchronizer run (default: 30 s)
    #[serde(default = "default_synchronization_timeout_ms")]
    pub synchronization_timeout_ms: u64,

    /// Algorithm used to resynchronize map pairs
    #[serde(default)]
    pub map_sync_strategy: MapSyncStrategy,

    /// Sliding TTL applied to cache entries (default: none)
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,

    /// Mirror writes into the cache; when false, writes invalidate the cached key
    #[serde(default = "default_mirror_cache_writes")]
    pub mirror_cache_writes: bool,

    /// Buffered failover events per subscriber before lagging
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_synchronization_timeout_ms() -> u64 { 30_000 }
fn default_mirror_cache_writes() -> bool { true }
fn default_event_channel_capacity() -> usize { 64 }

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            synchronization_timeout_ms: default_synchronization_timeout_ms(),
            map_sync_strategy: MapSyncStrategy::default(),
            cache_ttl_ms: None,
            mirror_cache_writes: default_mirror_cache_writes(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ResilienceConfig {
    #[must_use]
    pub fn synchronization_timeout(&self) -> Duration {
        Duration::from_millis(self.synchronization_timeout_ms)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.synchronization_timeout_ms, 30_000);
        assert_eq!(config.map_sync_strategy, MapSyncStrategy::Copy);
        assert!(config.cache_ttl().is_none());
        assert!(config.mirror_cache_writes);
        assert_eq!(config.event_channel_capacity, 64);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: ResilienceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.synchronization_timeout(), Duration::from_secs(30));
        assert!(config.mirror_cache_writes);
    }

    #[test]
    fn test_deserialize_overrides() {
        let config: ResilienceConfig = serde_json::from_str(
            r#"{
                "synchronization_timeout_ms": 500,
                "map_sync_strategy": "intersection",
                "cache_ttl_ms": 1500,
                "mirror_cache_writes": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.synchronization_timeout(), Duration::from_millis(500));
        assert_eq!(config.map_sync_strategy, MapSyncStrategy::Intersection);
        assert_eq!(config.cache_ttl(), Some(Duration::from_millis(1500)));
        assert!(!config.mirror_cache_writes);
    }
}
