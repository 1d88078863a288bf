//! Collector and sync-point configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ServerId;

/// Default node-wide memory quota (1 GiB)
pub const DEFAULT_GLOBAL_MEMORY_QUOTA: u64 = 1 << 30;

/// Event collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// This node's id; destination of every control message
    pub server_id: ServerId,

    /// Ceiling on buffered-but-undrained event bytes across all dispatchers
    pub global_memory_quota: u64,

    /// Per-dispatcher budget used to derive speed-ratio feedback
    /// (None = feedback disabled)
    #[serde(default)]
    pub dispatcher_memory_quota: Option<u64>,
}

impl CollectorConfig {
    pub fn new(server_id: impl Into<ServerId>, global_memory_quota: u64) -> Self {
        Self {
            server_id: server_id.into(),
            global_memory_quota,
            dispatcher_memory_quota: None,
        }
    }

    pub fn with_dispatcher_memory_quota(mut self, quota: u64) -> Self {
        self.dispatcher_memory_quota = Some(quota);
        self
    }
}

/// Sync-point injection settings of one dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPointConfig {
    /// Spacing of consecutive sync points, in commit-ts wall-clock time
    pub interval: Duration,
}

impl SyncPointConfig {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for SyncPointConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
        }
    }
}
