//! Alert assembly with schema enforcement

use super::record::{Alert, AlertSample, Severity};
use crate::abusewatch::error::{DetectionError, DetectionResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Builder for `Alert`.
///
/// `id` and `timestamp` default to a fresh v4 UUID and the current time.
/// `build` fails with `DetectionError::AlertSchema` when category, severity or
/// summary were not supplied; that is a defect in the calling criterion.
#[derive(Debug, Default, Clone)]
pub struct AlertBuilder {
    id: Option<Uuid>,
    timestamp: Option<DateTime<Utc>>,
    category: Option<String>,
    subcategory: Option<String>,
    severity: Option<Severity>,
    summary: Option<String>,
    metadata: BTreeMap<String, String>,
    notify_merge_key: Option<String>,
    sample: Option<AlertSample>,
}

impl AlertBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Attach a metadata value only when present
    pub fn metadata_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.metadata(key, v),
            None => self,
        }
    }

    pub fn notify_merge_key(mut self, key: impl Into<String>) -> Self {
        self.notify_merge_key = Some(key.into());
        self
    }

    pub fn sample(mut self, sample: AlertSample) -> Self {
        self.sample = Some(sample);
        self
    }

    pub fn build(self) -> DetectionResult<Alert> {
        let mut missing = Vec::new();
        if self.category.as_deref().map_or(true, |c| c.trim().is_empty()) {
            missing.push("category");
        }
        if self.severity.is_none() {
            missing.push("severity");
        }
        if self.summary.as_deref().map_or(true, |s| s.trim().is_empty()) {
            missing.push("summary");
        }
        if !missing.is_empty() {
            return Err(DetectionError::AlertSchema { missing });
        }

        let subcategory = self.subcategory.unwrap_or_default();
        let notify_merge_key = self
            .notify_merge_key
            .or_else(|| (!subcategory.is_empty()).then(|| subcategory.clone()));

        let alert = Alert {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            category: self.category.unwrap_or_default(),
            subcategory,
            severity: self.severity.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            metadata: self.metadata,
            notify_merge_key,
            sample: self.sample,
        };
        alert.validate()?;
        Ok(alert)
    }
}
