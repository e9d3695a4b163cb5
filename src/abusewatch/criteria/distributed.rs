//! One identity acting through many distinct secondary values
//!
//! Duplicate secondary values are collapsed before the comparison, so six
//! attempts through five distinct addresses count as five.

use super::sampling::{sample_events, MAX_SAMPLE_SIZE};
use super::{AlertProfile, EvaluationContext};
use crate::abusewatch::alert::{meta, Alert};
use crate::abusewatch::error::DetectionResult;
use crate::abusewatch::event::EventField;
use crate::abusewatch::window::Pane;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Values available to a summary formatter
#[derive(Debug, Clone, Copy)]
pub struct DistributedSummary<'a> {
    pub resource: &'a str,
    pub tag: &'a str,
    pub key: &'a str,
    pub secondary: EventField,
    pub distinct: usize,
    pub threshold: usize,
    pub window_minutes: i64,
}

pub type SummaryFormatter = fn(&DistributedSummary<'_>) -> String;

/// Named summary wordings selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributedSummaryStyle {
    #[default]
    Generic,
    PasswordReset,
    LoginFailure,
    AccountCreation,
}

impl DistributedSummaryStyle {
    pub fn formatter(self) -> SummaryFormatter {
        match self {
            DistributedSummaryStyle::Generic => generic_summary,
            DistributedSummaryStyle::PasswordReset => password_reset_summary,
            DistributedSummaryStyle::LoginFailure => login_failure_summary,
            DistributedSummaryStyle::AccountCreation => account_creation_summary,
        }
    }

    /// Wordings that report the window length in minutes, which a global
    /// window does not have
    pub fn requires_fixed_window(self) -> bool {
        matches!(
            self,
            DistributedSummaryStyle::PasswordReset | DistributedSummaryStyle::LoginFailure
        )
    }
}

fn generic_summary(s: &DistributedSummary<'_>) -> String {
    format!(
        "{} {} {} {} distinct {} {}",
        s.resource,
        s.tag,
        s.key,
        s.distinct,
        s.secondary.as_str(),
        s.threshold
    )
}

fn password_reset_summary(s: &DistributedSummary<'_>) -> String {
    format!(
        "{} {} attempted password reset on {} distinct accounts in {} minute window",
        s.resource, s.key, s.distinct, s.window_minutes
    )
}

fn login_failure_summary(s: &DistributedSummary<'_>) -> String {
    format!(
        "{} distributed source login failure threshold exceeded for single account, \
         {} addresses in {} minutes",
        s.resource, s.distinct, s.window_minutes
    )
}

fn account_creation_summary(s: &DistributedSummary<'_>) -> String {
    format!(
        "{} suspicious distributed account creation, {} {}",
        s.resource, s.key, s.distinct
    )
}

pub struct DistributedCorrelationCriterion {
    profile: AlertProfile,
    secondary: EventField,
    threshold: usize,
    key_field: Option<EventField>,
    summary: SummaryFormatter,
}

impl DistributedCorrelationCriterion {
    pub fn new(profile: AlertProfile, secondary: EventField, threshold: usize) -> Self {
        info!(
            "Initialized distributed correlation criterion '{}' ({} distinct {})",
            profile.tag,
            threshold,
            secondary.as_str()
        );
        Self {
            profile,
            secondary,
            threshold,
            key_field: None,
            summary: generic_summary,
        }
    }

    pub fn with_key_field(mut self, field: EventField) -> Self {
        self.key_field = Some(field);
        self
    }

    pub fn with_summary(mut self, formatter: SummaryFormatter) -> Self {
        self.summary = formatter;
        self
    }

    pub fn profile(&self) -> &AlertProfile {
        &self.profile
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn evaluate(&self, pane: &Pane, ctx: &EvaluationContext) -> DetectionResult<Option<Alert>> {
        let mut seen = HashSet::new();
        let mut distinct: Vec<&str> = Vec::new();
        for event in pane.events() {
            if let Some(value) = event.field(self.secondary).filter(|v| !v.is_empty()) {
                if seen.insert(value) {
                    distinct.push(value);
                }
            }
        }

        if distinct.len() < self.threshold {
            return Ok(None);
        }

        let summary = (self.summary)(&DistributedSummary {
            resource: &ctx.monitored_resource,
            tag: &self.profile.tag,
            key: pane.key(),
            secondary: self.secondary,
            distinct: distinct.len(),
            threshold: self.threshold,
            window_minutes: pane.bounds().duration_ms() / 60_000,
        });

        let secondary_sample = distinct
            .iter()
            .take(MAX_SAMPLE_SIZE)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");

        let mut builder = self
            .profile
            .builder()
            .summary(summary)
            .metadata(meta::KEY, pane.key())
            .metadata(meta::COUNT, distinct.len())
            .metadata(meta::THRESHOLD, self.threshold)
            .metadata(meta::SECONDARY_SAMPLE, secondary_sample);
        if let Some(name) = self.key_field.and_then(meta::for_field) {
            builder = builder.metadata(name, pane.key());
        }

        builder.sample(sample_events(pane.events())).build().map(Some)
    }
}
