//! Resolver configuration (`resolver.*`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_KEY_PREFIX: &str = "dhcp";
const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_STALENESS_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;
const DEFAULT_REFRESH_AFTER_SECS: u64 = 300;
const DEFAULT_MISSED_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_CACHE_SIZE: usize = 65_536;

/// DHT resolver configuration (`resolver.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// DHT namespace (`resolver.namespace`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// DHT key prefix (`resolver.key_prefix`). Keys are
    /// `<key_prefix>:<namespace>:<key>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,

    /// Lookups per key before failing hard (`resolver.max_attempts`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Cache staleness window in seconds (`resolver.staleness_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness_secs: Option<u64>,

    /// Sweep period in seconds (`resolver.sweep_interval_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,

    /// Verified-entry age in seconds that triggers a re-lookup
    /// (`resolver.refresh_after_secs`). Zero disables refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_after_secs: Option<u64>,

    /// Missed-mapping broadcast capacity (`resolver.missed_channel_capacity`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missed_channel_capacity: Option<usize>,

    /// Max entries per cache (`resolver.cache_size`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<usize>,
}

impl ResolverConfig {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn key_prefix(&self) -> &str {
        self.key_prefix.as_deref().unwrap_or(DEFAULT_KEY_PREFIX)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs.unwrap_or(DEFAULT_STALENESS_SECS))
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero period would spin the sweeper.
        Duration::from_secs(
            self.sweep_interval_secs
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
                .max(1),
        )
    }

    /// Refresh age, or `None` if refresh is disabled.
    pub fn refresh_after(&self) -> Option<Duration> {
        match self.refresh_after_secs.unwrap_or(DEFAULT_REFRESH_AFTER_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn missed_channel_capacity(&self) -> usize {
        self.missed_channel_capacity
            .unwrap_or(DEFAULT_MISSED_CHANNEL_CAPACITY)
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size.unwrap_or(DEFAULT_CACHE_SIZE)
    }

    /// Merge another section into this one; set fields in `other` win.
    pub fn merge(&mut self, other: ResolverConfig) {
        if other.namespace.is_some() {
            self.namespace = other.namespace;
        }
        if other.key_prefix.is_some() {
            self.key_prefix = other.key_prefix;
        }
        if other.max_attempts.is_some() {
            self.max_attempts = other.max_attempts;
        }
        if other.staleness_secs.is_some() {
            self.staleness_secs = other.staleness_secs;
        }
        if other.sweep_interval_secs.is_some() {
            self.sweep_interval_secs = other.sweep_interval_secs;
        }
        if other.refresh_after_secs.is_some() {
            self.refresh_after_secs = other.refresh_after_secs;
        }
        if other.missed_channel_capacity.is_some() {
            self.missed_channel_capacity = other.missed_channel_capacity;
        }
        if other.cache_size.is_some() {
            self.cache_size = other.cache_size;
        }
    }
}
