//! Node configuration model

use serde::{Deserialize, Serialize};
use std::time::Duration;

use contracts::{CollectorConfig, ServerId, SyncPointConfig, DEFAULT_GLOBAL_MEMORY_QUOTA};
use observability::{LogFormat, ObservabilityConfig};

/// Default sync-point spacing (10 minutes)
pub const DEFAULT_SYNC_POINT_INTERVAL_SECS: u64 = 600;

/// Top-level configuration of one event collector node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's id on the messaging layer
    pub server_id: ServerId,
    #[serde(default)]
    pub collector: CollectorSection,
    #[serde(default)]
    pub sync_point: SyncPointSection,
    #[serde(default)]
    pub observability: ObservabilitySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSection {
    /// Bytes of buffered events allowed across all dispatchers
    #[serde(default = "default_global_memory_quota")]
    pub global_memory_quota: u64,
    /// Per-dispatcher budget for speed-ratio feedback (None = disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatcher_memory_quota: Option<u64>,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            global_memory_quota: DEFAULT_GLOBAL_MEMORY_QUOTA,
            dispatcher_memory_quota: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPointSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sync_point_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncPointSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_SYNC_POINT_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilitySection {
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus port (None = exporter disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            metrics_port: None,
            log_level: default_log_level(),
        }
    }
}

fn default_global_memory_quota() -> u64 {
    DEFAULT_GLOBAL_MEMORY_QUOTA
}

fn default_sync_point_interval_secs() -> u64 {
    DEFAULT_SYNC_POINT_INTERVAL_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Minimal configuration with every section at its default
    pub fn new(server_id: impl Into<ServerId>) -> Self {
        Self {
            server_id: server_id.into(),
            collector: CollectorSection::default(),
            sync_point: SyncPointSection::default(),
            observability: ObservabilitySection::default(),
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        let config = CollectorConfig::new(self.server_id.clone(), self.collector.global_memory_quota);
        match self.collector.dispatcher_memory_quota {
            Some(quota) => config.with_dispatcher_memory_quota(quota),
            None => config,
        }
    }

    /// Sync-point settings for new dispatchers, None when disabled
    pub fn sync_point_config(&self) -> Option<SyncPointConfig> {
        self.sync_point
            .enabled
            .then(|| SyncPointConfig::new(Duration::from_secs(self.sync_point.interval_secs)))
    }

    pub fn observability_config(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            log_format: self.observability.log_format,
            metrics_port: self.observability.metrics_port,
            default_log_level: self.observability.log_level.clone(),
        }
    }
}
