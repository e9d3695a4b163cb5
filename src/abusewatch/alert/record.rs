//! Alert record and its serialized form

use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::event::NormalizedEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Bounded event evidence attached to an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSample {
    pub events: Vec<NormalizedEvent>,
    /// More contributing events existed than were sampled
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    /// Detector tag that produced the alert
    #[serde(default)]
    pub subcategory: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Downstream grouping/deduplication key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_merge_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<AlertSample>,
}

/// Fields that must be present on every alert
const REQUIRED_FIELDS: [&str; 5] = ["id", "timestamp", "category", "severity", "summary"];

impl Alert {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Check the structural invariant
    pub fn validate(&self) -> DetectionResult<()> {
        let mut missing = Vec::new();
        if self.id.is_nil() {
            missing.push("id");
        }
        if self.category.trim().is_empty() {
            missing.push("category");
        }
        if self.summary.trim().is_empty() {
            missing.push("summary");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DetectionError::AlertSchema { missing })
        }
    }

    pub fn to_json(&self) -> DetectionResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an alert, rejecting input that violates the structural invariant
    pub fn from_json(input: &str) -> DetectionResult<Alert> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        let object = value.as_object().ok_or_else(|| DetectionError::Serialization {
            message: "alert must be a JSON object".to_string(),
        })?;

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| object.get(*f).map_or(true, serde_json::Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(DetectionError::AlertSchema { missing });
        }

        let alert: Alert = serde_json::from_value(value)?;
        alert.validate()?;
        Ok(alert)
    }
}
