//! Detector configuration
//!
//! Each entry under `detectors:` is tagged by `type`:
//!
//! ```yaml
//! detectors:
//!   - type: threshold
//!     tag: source_login_failure
//!     key: source_address
//!     actions: [loginFailure]
//!     limit: 10
//!     window: { kind: fixed, size_secs: 600 }
//!   - type: velocity
//!     settings:
//!       min_distance_km: 500
//!   - type: summary
//!     window: { kind: fixed, size_secs: 900 }
//! ```

use super::WindowConfig;
use crate::abusewatch::aggregation::KeyExtractor;
use crate::abusewatch::alert::Severity;
use crate::abusewatch::criteria::{
    ActivityMonitor, AlertProfile, Criterion, DistributedCorrelationCriterion,
    DistributedSummaryStyle, IntegrityComparator, LoginFailureAtRisk, RelayForwardComparator,
    StatisticalSettings, StatisticalThresholdCriterion, StatusComparator, SummaryCriterion,
    ThresholdCriterion, VelocityCriterion, VelocitySettings, MONITOR_ONLY_SUFFIX,
};
use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::event::{ActionType, EventField};
use crate::abusewatch::lists::StaticList;
use crate::abusewatch::pipeline::Detector;
use crate::abusewatch::side_input::NatDetector;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CATEGORY: &str = "customs";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_velocity_tag() -> String {
    "velocity".to_string()
}

fn default_uid_key() -> KeyExtractor {
    KeyExtractor::Field(EventField::Uid)
}

fn default_early_fire_count() -> usize {
    5
}

fn default_relay_tag() -> String {
    "private_relay_forward".to_string()
}

fn default_status_tag() -> String {
    "status_comparator".to_string()
}

fn default_activity_tag() -> String {
    "activity_monitor".to_string()
}

fn default_at_risk_tag() -> String {
    "login_failure_at_risk_account".to_string()
}

fn default_summary_tag() -> String {
    "summary".to_string()
}

fn default_summary_actions() -> Vec<ActionType> {
    vec![
        ActionType::LoginFailure,
        ActionType::LoginSuccess,
        ActionType::AccountCreate,
        ActionType::PasswordReset,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    pub key: KeyExtractor,
    /// Accepted actions; empty accepts every action
    #[serde(default)]
    pub actions: Vec<ActionType>,
    pub limit: usize,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatDetectionConfig {
    #[serde(default = "default_min_user_agents")]
    pub min_distinct_user_agents: usize,
}

fn default_min_user_agents() -> usize {
    2
}

impl Default for NatDetectionConfig {
    fn default() -> Self {
        Self {
            min_distinct_user_agents: default_min_user_agents(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalThresholdConfig {
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    pub key: KeyExtractor,
    #[serde(default)]
    pub actions: Vec<ActionType>,
    pub window: WindowConfig,
    #[serde(default)]
    pub settings: StatisticalSettings,
    #[serde(default)]
    pub monitor_only: bool,
    /// Derive the NAT side input from each window when no external one is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat_detection: Option<NatDetectionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityConfig {
    #[serde(default = "default_velocity_tag")]
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_uid_key")]
    pub key: KeyExtractor,
    #[serde(default)]
    pub actions: Vec<ActionType>,
    #[serde(default)]
    pub settings: VelocitySettings,
    /// New events per identity between velocity evaluations
    #[serde(default = "default_early_fire_count")]
    pub early_fire_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedCorrelationConfig {
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    pub key: KeyExtractor,
    pub secondary: EventField,
    #[serde(default)]
    pub actions: Vec<ActionType>,
    pub threshold: usize,
    pub window: WindowConfig,
    #[serde(default)]
    pub summary: DistributedSummaryStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayForwardConfig {
    #[serde(default = "default_relay_tag")]
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusComparatorConfig {
    #[serde(default = "default_status_tag")]
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    /// Newline-delimited list of known addresses
    pub address_list: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMonitorConfig {
    #[serde(default = "default_activity_tag")]
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    /// Newline-delimited list of monitored accounts
    pub account_list: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginFailureAtRiskConfig {
    #[serde(default = "default_at_risk_tag")]
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Per-window counts of selected actions, reported as one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_tag")]
    pub tag: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    /// Actions counted; empty counts every action
    #[serde(default = "default_summary_actions")]
    pub actions: Vec<ActionType>,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorConfig {
    Threshold(ThresholdConfig),
    StatisticalThreshold(StatisticalThresholdConfig),
    Velocity(VelocityConfig),
    DistributedCorrelation(DistributedCorrelationConfig),
    RelayForward(RelayForwardConfig),
    StatusComparator(StatusComparatorConfig),
    ActivityMonitor(ActivityMonitorConfig),
    LoginFailureAtRisk(LoginFailureAtRiskConfig),
    Summary(SummaryConfig),
}

fn fixed_window(size_secs: u64) -> WindowConfig {
    WindowConfig::Fixed {
        size_secs,
        allowed_lateness_secs: 0,
    }
}

impl DetectorConfig {
    /// Login failures per source address
    pub fn source_login_failure(limit: usize, window_secs: u64) -> Self {
        DetectorConfig::Threshold(ThresholdConfig {
            tag: "source_login_failure".to_string(),
            category: default_category(),
            severity: Severity::Info,
            key: KeyExtractor::Field(EventField::SourceAddress),
            actions: vec![ActionType::LoginFailure],
            limit,
            window: fixed_window(window_secs),
        })
    }

    /// Account creations per source address
    pub fn account_creation_abuse(limit: usize, window_secs: u64) -> Self {
        DetectorConfig::Threshold(ThresholdConfig {
            tag: "account_creation_abuse".to_string(),
            category: default_category(),
            severity: Severity::Info,
            key: KeyExtractor::Field(EventField::SourceAddress),
            actions: vec![ActionType::AccountCreate],
            limit,
            window: fixed_window(window_secs),
        })
    }

    /// One account failing logins from many source addresses
    pub fn source_login_failure_distributed(threshold: usize, window_secs: u64) -> Self {
        DetectorConfig::DistributedCorrelation(DistributedCorrelationConfig {
            tag: "source_login_failure_distributed".to_string(),
            category: default_category(),
            severity: Severity::Info,
            key: KeyExtractor::Field(EventField::AccountId),
            secondary: EventField::SourceAddress,
            actions: vec![ActionType::LoginFailure],
            threshold,
            window: fixed_window(window_secs),
            summary: DistributedSummaryStyle::LoginFailure,
        })
    }

    /// One source address creating many distinct accounts
    pub fn account_creation_abuse_distributed(threshold: usize, window_secs: u64) -> Self {
        DetectorConfig::DistributedCorrelation(DistributedCorrelationConfig {
            tag: "account_creation_abuse_distributed".to_string(),
            category: default_category(),
            severity: Severity::Info,
            key: KeyExtractor::Field(EventField::SourceAddress),
            secondary: EventField::AccountId,
            actions: vec![ActionType::AccountCreate],
            threshold,
            window: fixed_window(window_secs),
            summary: DistributedSummaryStyle::AccountCreation,
        })
    }

    /// One source address resetting passwords on many distinct accounts
    pub fn password_reset_abuse(threshold: usize, window_secs: u64) -> Self {
        DetectorConfig::DistributedCorrelation(DistributedCorrelationConfig {
            tag: "password_reset_abuse".to_string(),
            category: default_category(),
            severity: Severity::Info,
            key: KeyExtractor::Field(EventField::SourceAddress),
            secondary: EventField::AccountId,
            actions: vec![ActionType::PasswordReset],
            threshold,
            window: fixed_window(window_secs),
            summary: DistributedSummaryStyle::PasswordReset,
        })
    }

    /// Implausible travel between successful logins of one uid
    pub fn velocity(settings: VelocitySettings) -> Self {
        DetectorConfig::Velocity(VelocityConfig {
            tag: default_velocity_tag(),
            category: default_category(),
            severity: Severity::Info,
            key: default_uid_key(),
            actions: vec![ActionType::LoginSuccess],
            settings,
            early_fire_count: default_early_fire_count(),
        })
    }

    /// Request volume per source address relative to the window population
    pub fn threshold_analysis(settings: StatisticalSettings, window_secs: u64) -> Self {
        DetectorConfig::StatisticalThreshold(StatisticalThresholdConfig {
            tag: "threshold_analysis".to_string(),
            category: "httprequest".to_string(),
            severity: Severity::Info,
            key: KeyExtractor::Field(EventField::SourceAddress),
            actions: vec![ActionType::HttpRequest],
            window: fixed_window(window_secs),
            settings,
            monitor_only: false,
            nat_detection: None,
        })
    }

    /// Per-period activity counts
    pub fn summary_analysis(window_secs: u64) -> Self {
        DetectorConfig::Summary(SummaryConfig {
            tag: default_summary_tag(),
            category: default_category(),
            severity: Severity::Info,
            actions: default_summary_actions(),
            window: fixed_window(window_secs),
        })
    }

    pub fn relay_forward() -> Self {
        DetectorConfig::RelayForward(RelayForwardConfig {
            tag: default_relay_tag(),
            category: default_category(),
            severity: Severity::Info,
        })
    }

    pub fn status_comparator(address_list: impl Into<PathBuf>) -> Self {
        DetectorConfig::StatusComparator(StatusComparatorConfig {
            tag: default_status_tag(),
            category: default_category(),
            severity: Severity::Info,
            address_list: address_list.into(),
        })
    }

    pub fn activity_monitor(account_list: impl Into<PathBuf>) -> Self {
        DetectorConfig::ActivityMonitor(ActivityMonitorConfig {
            tag: default_activity_tag(),
            category: default_category(),
            severity: Severity::Info,
            account_list: account_list.into(),
        })
    }

    pub fn login_failure_at_risk() -> Self {
        DetectorConfig::LoginFailureAtRisk(LoginFailureAtRiskConfig {
            tag: default_at_risk_tag(),
            category: default_category(),
            severity: Severity::Info,
        })
    }

    pub fn tag(&self) -> &str {
        match self {
            DetectorConfig::Threshold(c) => &c.tag,
            DetectorConfig::StatisticalThreshold(c) => &c.tag,
            DetectorConfig::Velocity(c) => &c.tag,
            DetectorConfig::DistributedCorrelation(c) => &c.tag,
            DetectorConfig::RelayForward(c) => &c.tag,
            DetectorConfig::StatusComparator(c) => &c.tag,
            DetectorConfig::ActivityMonitor(c) => &c.tag,
            DetectorConfig::LoginFailureAtRisk(c) => &c.tag,
            DetectorConfig::Summary(c) => &c.tag,
        }
    }

    /// Unique identity among configured detectors
    pub fn id(&self) -> String {
        match self {
            DetectorConfig::StatisticalThreshold(c) if c.monitor_only => {
                format!("{}{}", c.tag, MONITOR_ONLY_SUFFIX)
            }
            other => other.tag().to_string(),
        }
    }

    /// Check the detector's own settings
    pub fn validate(&self) -> DetectionResult<()> {
        let tag = self.tag();
        if tag.trim().is_empty() {
            return Err(DetectionError::config("detector tag must not be empty"));
        }
        let invalid = |what: &str| DetectionError::config(format!("detector '{tag}': {what}"));

        match self {
            DetectorConfig::Threshold(c) => {
                validate_window(&c.window, tag)?;
                if c.limit == 0 {
                    return Err(invalid("limit must be at least 1"));
                }
            }
            DetectorConfig::StatisticalThreshold(c) => {
                if !matches!(c.window, WindowConfig::Fixed { .. }) {
                    return Err(invalid("statistical threshold requires a fixed window"));
                }
                validate_window(&c.window, tag)?;
                if !(c.settings.threshold_modifier > 0.0) {
                    return Err(invalid("threshold_modifier must be positive"));
                }
                if let Some(max) = c.settings.clamp_threshold_maximum {
                    if !(max > 0.0) {
                        return Err(invalid("clamp_threshold_maximum must be positive"));
                    }
                }
            }
            DetectorConfig::Velocity(c) => {
                if c.early_fire_count == 0 {
                    return Err(invalid("early_fire_count must be at least 1"));
                }
                if !(c.settings.min_distance_km >= 0.0) {
                    return Err(invalid("min_distance_km must not be negative"));
                }
            }
            DetectorConfig::DistributedCorrelation(c) => {
                validate_window(&c.window, tag)?;
                if c.threshold == 0 {
                    return Err(invalid("threshold must be at least 1"));
                }
                if c.summary.requires_fixed_window()
                    && !matches!(c.window, WindowConfig::Fixed { .. })
                {
                    return Err(invalid(&format!(
                        "{:?} summary reports minutes and requires a fixed window",
                        c.summary
                    )));
                }
            }
            DetectorConfig::Summary(c) => {
                if !matches!(c.window, WindowConfig::Fixed { .. }) {
                    return Err(invalid("summary requires a fixed window"));
                }
                validate_window(&c.window, tag)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Compile into a runnable detector. Static lists are read here, once.
    pub fn build(&self) -> DetectionResult<Detector> {
        self.validate()?;
        let id = self.id();

        let detector = match self {
            DetectorConfig::Threshold(c) => {
                let mut criterion = ThresholdCriterion::new(
                    AlertProfile::new(&c.tag, &c.category, c.severity),
                    c.limit,
                );
                if let KeyExtractor::Field(field) = c.key {
                    criterion = criterion.with_key_field(field);
                }
                Detector::new(id, c.key.clone(), Criterion::Threshold(criterion))
                    .with_actions(c.actions.clone())
                    .with_window(c.window.clone())
            }
            DetectorConfig::StatisticalThreshold(c) => {
                let mut criterion = StatisticalThresholdCriterion::new(
                    AlertProfile::new(&c.tag, &c.category, c.severity),
                    c.settings.clone(),
                )
                .monitor_only(c.monitor_only);
                if let KeyExtractor::Field(field) = c.key {
                    criterion = criterion.with_key_field(field);
                }
                let mut detector =
                    Detector::new(id, c.key.clone(), Criterion::StatisticalThreshold(criterion))
                        .with_actions(c.actions.clone())
                        .with_window(c.window.clone());
                if let Some(nat) = &c.nat_detection {
                    detector = detector.with_nat_detector(NatDetector::new(
                        nat.min_distinct_user_agents,
                    ));
                }
                detector
            }
            DetectorConfig::Velocity(c) => {
                let criterion = VelocityCriterion::new(
                    AlertProfile::new(&c.tag, &c.category, c.severity),
                    c.settings.clone(),
                );
                Detector::new(id, c.key.clone(), Criterion::Velocity(criterion))
                    .with_actions(c.actions.clone())
                    .with_window(WindowConfig::Global {
                        early_fire_count: c.early_fire_count,
                    })
            }
            DetectorConfig::DistributedCorrelation(c) => {
                let mut criterion = DistributedCorrelationCriterion::new(
                    AlertProfile::new(&c.tag, &c.category, c.severity),
                    c.secondary,
                    c.threshold,
                )
                .with_summary(c.summary.formatter());
                if let KeyExtractor::Field(field) = c.key {
                    criterion = criterion.with_key_field(field);
                }
                Detector::new(id, c.key.clone(), Criterion::DistributedCorrelation(criterion))
                    .with_actions(c.actions.clone())
                    .with_window(c.window.clone())
            }
            DetectorConfig::RelayForward(c) => Detector::new(
                id,
                KeyExtractor::Field(EventField::Uid),
                Criterion::Integrity(IntegrityComparator::RelayForward(
                    RelayForwardComparator::new(AlertProfile::new(
                        &c.tag,
                        &c.category,
                        c.severity,
                    )),
                )),
            )
            .with_actions(vec![
                ActionType::RelayAddressRegistered,
                ActionType::RelayForward,
            ]),
            DetectorConfig::StatusComparator(c) => {
                let known = StaticList::from_file(&c.address_list)?;
                Detector::new(
                    id,
                    KeyExtractor::Field(EventField::AccountId),
                    Criterion::Integrity(IntegrityComparator::StatusComparator(
                        StatusComparator::new(
                            AlertProfile::new(&c.tag, &c.category, c.severity),
                            known,
                        ),
                    )),
                )
                .with_actions(vec![ActionType::AccountStatusCheck])
            }
            DetectorConfig::ActivityMonitor(c) => {
                let monitored = StaticList::from_file(&c.account_list)?;
                Detector::new(
                    id,
                    KeyExtractor::Field(EventField::AccountId),
                    Criterion::Integrity(IntegrityComparator::ActivityMonitor(
                        ActivityMonitor::new(
                            AlertProfile::new(&c.tag, &c.category, c.severity),
                            monitored,
                        ),
                    )),
                )
            }
            DetectorConfig::LoginFailureAtRisk(c) => Detector::new(
                id,
                KeyExtractor::Field(EventField::AccountId),
                Criterion::Integrity(IntegrityComparator::LoginFailureAtRisk(
                    LoginFailureAtRisk::new(AlertProfile::new(&c.tag, &c.category, c.severity)),
                )),
            )
            .with_actions(vec![ActionType::LoginFailure]),
            DetectorConfig::Summary(c) => Detector::new(
                id,
                KeyExtractor::Field(EventField::Action),
                Criterion::Summary(SummaryCriterion::new(AlertProfile::new(
                    &c.tag,
                    &c.category,
                    c.severity,
                ))),
            )
            .with_actions(c.actions.clone())
            .with_window(c.window.clone()),
        };
        Ok(detector)
    }
}

fn validate_window(window: &WindowConfig, tag: &str) -> DetectionResult<()> {
    match window {
        WindowConfig::Fixed { size_secs: 0, .. } => Err(DetectionError::config(format!(
            "detector '{tag}': window size must be at least 1 second"
        ))),
        WindowConfig::Global {
            early_fire_count: 0,
        } => Err(DetectionError::config(format!(
            "detector '{tag}': early_fire_count must be at least 1"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for config in [
            DetectorConfig::source_login_failure(10, 600),
            DetectorConfig::account_creation_abuse(3, 600),
            DetectorConfig::source_login_failure_distributed(10, 600),
            DetectorConfig::account_creation_abuse_distributed(6, 600),
            DetectorConfig::password_reset_abuse(5, 600),
            DetectorConfig::velocity(VelocitySettings::default()),
            DetectorConfig::threshold_analysis(StatisticalSettings::default(), 60),
            DetectorConfig::relay_forward(),
            DetectorConfig::login_failure_at_risk(),
            DetectorConfig::summary_analysis(900),
        ] {
            assert!(config.validate().is_ok(), "{} should validate", config.tag());
        }
    }

    #[test]
    fn test_invalid_settings() {
        let mut config = DetectorConfig::source_login_failure(0, 600);
        assert!(config.validate().is_err());

        config = DetectorConfig::source_login_failure(10, 0);
        assert!(config.validate().is_err());

        let config = DetectorConfig::threshold_analysis(
            StatisticalSettings::default().with_modifier(0.0),
            60,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minute_wordings_reject_global_window() {
        let global = WindowConfig::Global {
            early_fire_count: 5,
        };
        for mut config in [
            DetectorConfig::password_reset_abuse(5, 600),
            DetectorConfig::source_login_failure_distributed(10, 600),
        ] {
            if let DetectorConfig::DistributedCorrelation(c) = &mut config {
                c.window = global.clone();
            }
            assert!(config.validate().is_err(), "{} should reject", config.tag());
        }

        let mut config = DetectorConfig::account_creation_abuse_distributed(6, 600);
        if let DetectorConfig::DistributedCorrelation(c) = &mut config {
            c.window = global.clone();
        }
        assert!(config.validate().is_ok());

        let mut summary = DetectorConfig::summary_analysis(900);
        if let DetectorConfig::Summary(c) = &mut summary {
            c.window = global;
        }
        assert!(summary.validate().is_err());
    }

    #[test]
    fn test_summary_detector_keys_by_action() {
        use crate::abusewatch::event::NormalizedEvent;

        let detector = DetectorConfig::summary_analysis(900).build().unwrap();
        assert_eq!(detector.id(), "summary");
        let failure = NormalizedEvent::at_millis(ActionType::LoginFailure, 0);
        assert_eq!(detector.accepts(&failure).as_deref(), Some("loginFailure"));
        let request = NormalizedEvent::at_millis(ActionType::HttpRequest, 0);
        assert_eq!(detector.accepts(&request), None);

        let config: DetectorConfig =
            serde_yaml::from_str("type: summary\nwindow: { kind: fixed, size_secs: 900 }\n")
                .unwrap();
        assert_eq!(config, DetectorConfig::summary_analysis(900));
    }

    #[test]
    fn test_monitor_only_id() {
        let mut config = DetectorConfig::threshold_analysis(StatisticalSettings::default(), 60);
        assert_eq!(config.id(), "threshold_analysis");
        if let DetectorConfig::StatisticalThreshold(c) = &mut config {
            c.monitor_only = true;
        }
        assert_eq!(config.id(), "threshold_analysis_monitor_only");
    }

    #[test]
    fn test_build_reads_lists_once() {
        let missing = DetectorConfig::status_comparator("/nonexistent/abusewatch/known.txt");
        assert!(matches!(
            missing.build(),
            Err(DetectionError::ListLoad { .. })
        ));
    }

    #[test]
    fn test_yaml_detector() {
        let yaml = r#"
type: distributed_correlation
tag: password_reset_abuse
key: source_address
secondary: account_id
actions: [passwordReset]
threshold: 5
window: { kind: fixed, size_secs: 600 }
summary: password_reset
"#;
        let config: DetectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config, DetectorConfig::password_reset_abuse(5, 600));
    }
}
