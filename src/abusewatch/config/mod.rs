//! Pipeline configuration
//!
//! Configuration can be assembled in code, loaded from YAML, and then
//! overridden from the environment.
//!
//! ## Environment Variables
//!
//! - `ABUSEWATCH_MONITORED_RESOURCE`: resource name prefixed to alert summaries
//! - `ABUSEWATCH_PARTITIONS`: number of partition workers (default: 4)
//! - `ABUSEWATCH_CHANNEL_CAPACITY`: per-partition queue depth (default: 1024)
//! - `ABUSEWATCH_MAX_OUT_OF_ORDERNESS_MS`: watermark lag behind max event time (default: 0)
//! - `ABUSEWATCH_MAX_STATE_RETRIES`: retries for unavailable state (default: 3)
//!
//! ## Example
//!
//! ```yaml
//! monitored_resource: accounts
//! partitions: 8
//! escalation:
//!   categories:
//!     threshold_analysis: false
//! detectors:
//!   - type: threshold
//!     tag: source_login_failure
//!     key: source_address
//!     actions: [loginFailure]
//!     limit: 10
//!     window: { kind: fixed, size_secs: 600 }
//! ```

pub mod detector;

pub use detector::{
    ActivityMonitorConfig, DetectorConfig, DistributedCorrelationConfig, LoginFailureAtRiskConfig,
    NatDetectionConfig, RelayForwardConfig, StatisticalThresholdConfig, StatusComparatorConfig,
    ThresholdConfig, VelocityConfig,
};

use crate::abusewatch::alert::EscalationPolicy;
use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::window::watermark::WatermarkConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Event-time window shape for a detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowConfig {
    /// Non-overlapping windows aligned to the epoch
    Fixed {
        size_secs: u64,
        #[serde(default)]
        allowed_lateness_secs: u64,
    },
    /// One unbounded window, fired every `early_fire_count` new events
    Global { early_fire_count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkSettings {
    #[serde(default)]
    pub max_out_of_orderness_ms: u64,
    #[serde(default = "default_min_advance_ms")]
    pub min_advance_ms: u64,
}

fn default_min_advance_ms() -> u64 {
    1000
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            max_out_of_orderness_ms: 0,
            min_advance_ms: default_min_advance_ms(),
        }
    }
}

impl WatermarkSettings {
    pub fn to_watermark_config(&self) -> WatermarkConfig {
        WatermarkConfig {
            max_out_of_orderness: Duration::from_millis(self.max_out_of_orderness_ms),
            min_advance: Duration::from_millis(self.min_advance_ms),
        }
    }
}

fn default_monitored_resource() -> String {
    "default".to_string()
}

fn default_partitions() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_max_state_retries() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Resource name prefixed to every alert summary
    #[serde(default = "default_monitored_resource")]
    pub monitored_resource: String,

    /// Number of partition workers events are routed across
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Bounded queue depth per partition; a full queue applies backpressure
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub watermark: WatermarkSettings,

    /// Which detector tags reach the sinks
    #[serde(default)]
    pub escalation: EscalationPolicy,

    /// Retries for retryable state errors before the pipeline fails
    #[serde(default = "default_max_state_retries")]
    pub max_state_retries: u32,

    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(default_monitored_resource())
    }
}

impl PipelineConfig {
    pub fn new(monitored_resource: impl Into<String>) -> Self {
        Self {
            monitored_resource: monitored_resource.into(),
            partitions: default_partitions(),
            channel_capacity: default_channel_capacity(),
            watermark: WatermarkSettings::default(),
            escalation: EscalationPolicy::default(),
            max_state_retries: default_max_state_retries(),
            detectors: Vec::new(),
        }
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_max_out_of_orderness(mut self, lag: Duration) -> Self {
        self.watermark.max_out_of_orderness_ms = lag.as_millis() as u64;
        self
    }

    pub fn with_escalation(mut self, policy: EscalationPolicy) -> Self {
        self.escalation = policy;
        self
    }

    pub fn with_max_state_retries(mut self, retries: u32) -> Self {
        self.max_state_retries = retries;
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> DetectionResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> DetectionResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            DetectionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        info!(
            "Loaded pipeline configuration from {} ({} detectors)",
            path.display(),
            config.detectors.len()
        );
        Ok(config)
    }

    /// Apply `ABUSEWATCH_*` overrides on top of the current values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(resource) = env::var("ABUSEWATCH_MONITORED_RESOURCE") {
            self.monitored_resource = resource;
        }

        self.partitions = env::var("ABUSEWATCH_PARTITIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.partitions);

        self.channel_capacity = env::var("ABUSEWATCH_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.channel_capacity);

        self.watermark.max_out_of_orderness_ms = env::var("ABUSEWATCH_MAX_OUT_OF_ORDERNESS_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.watermark.max_out_of_orderness_ms);

        self.max_state_retries = env::var("ABUSEWATCH_MAX_STATE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.max_state_retries);

        self
    }

    pub fn validate(&self) -> DetectionResult<()> {
        if self.monitored_resource.trim().is_empty() {
            return Err(DetectionError::config("monitored_resource must not be empty"));
        }
        if self.partitions == 0 {
            return Err(DetectionError::config("partitions must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(DetectionError::config("channel_capacity must be at least 1"));
        }

        let mut ids = HashSet::new();
        for detector in &self.detectors {
            detector.validate()?;
            let id = detector.id();
            if !ids.insert(id.clone()) {
                return Err(DetectionError::config(format!(
                    "duplicate detector '{id}'"
                )));
            }
        }
        Ok(())
    }
}
