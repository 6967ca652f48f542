//! Multiplexer and on-demand configuration (`mux.*`, `ondemand.*`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default protocol tag.
const DEFAULT_PROTOCOL_TAG: &str = "overmux";

/// Default `ConnectionReady` channel capacity.
const DEFAULT_READY_CHANNEL_CAPACITY: usize = 256;

/// Default minimum gap between connection requests for one address.
const DEFAULT_REQUEST_BACKOFF_SECS: u64 = 10;

/// Multiplexer configuration (`mux.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MuxConfig {
    /// Protocol tag framing every payload (`mux.protocol_tag`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_tag: Option<String>,

    /// `ConnectionReady` broadcast capacity (`mux.ready_channel_capacity`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_channel_capacity: Option<usize>,

    /// Seconds between repeated connection requests (`mux.request_backoff_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_backoff_secs: Option<u64>,
}

impl MuxConfig {
    /// Get the protocol tag, using default if not configured.
    pub fn protocol_tag(&self) -> &str {
        self.protocol_tag.as_deref().unwrap_or(DEFAULT_PROTOCOL_TAG)
    }

    /// Get the ready channel capacity, using default if not configured.
    pub fn ready_channel_capacity(&self) -> usize {
        self.ready_channel_capacity
            .unwrap_or(DEFAULT_READY_CHANNEL_CAPACITY)
    }

    /// Get the connection request backoff, using default if not configured.
    pub fn request_backoff(&self) -> Duration {
        Duration::from_secs(
            self.request_backoff_secs
                .unwrap_or(DEFAULT_REQUEST_BACKOFF_SECS),
        )
    }

    /// Merge another section into this one; set fields in `other` win.
    pub fn merge(&mut self, other: MuxConfig) {
        if other.protocol_tag.is_some() {
            self.protocol_tag = other.protocol_tag;
        }
        if other.ready_channel_capacity.is_some() {
            self.ready_channel_capacity = other.ready_channel_capacity;
        }
        if other.request_backoff_secs.is_some() {
            self.request_backoff_secs = other.request_backoff_secs;
        }
    }
}

/// On-demand connection policy (`ondemand.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnDemandConfig {
    /// Idle seconds before a desired address may be released
    /// (`ondemand.idle_timeout_secs`). Zero or unset never releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

impl OnDemandConfig {
    /// Idle timeout, or `None` if idle release is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }

    /// Merge another section into this one; set fields in `other` win.
    pub fn merge(&mut self, other: OnDemandConfig) {
        if other.idle_timeout_secs.is_some() {
            self.idle_timeout_secs = other.idle_timeout_secs;
        }
    }
}
