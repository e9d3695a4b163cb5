//! Absolute threshold over one key's pane

use super::sampling::{sample_events, uniqueness_metadata};
use super::{AlertProfile, EvaluationContext};
use crate::abusewatch::alert::{meta, Alert};
use crate::abusewatch::error::DetectionResult;
use crate::abusewatch::event::EventField;
use crate::abusewatch::window::Pane;
use log::info;

/// Fires when a key's count in a window reaches `limit`
#[derive(Debug, Clone)]
pub struct ThresholdCriterion {
    profile: AlertProfile,
    limit: usize,
    /// Field the key was derived from, reported under its well-known metadata key
    key_field: Option<EventField>,
}

impl ThresholdCriterion {
    pub fn new(profile: AlertProfile, limit: usize) -> Self {
        info!(
            "Initialized threshold criterion '{}' with limit {}",
            profile.tag, limit
        );
        Self {
            profile,
            limit,
            key_field: None,
        }
    }

    pub fn with_key_field(mut self, field: EventField) -> Self {
        self.key_field = Some(field);
        self
    }

    pub fn profile(&self) -> &AlertProfile {
        &self.profile
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn evaluate(&self, pane: &Pane, ctx: &EvaluationContext) -> DetectionResult<Option<Alert>> {
        let count = pane.count();
        if count < self.limit {
            return Ok(None);
        }

        let sample = sample_events(pane.events());
        let mut builder = self
            .profile
            .builder()
            .summary(format!(
                "{} {} {} {} {}",
                ctx.monitored_resource,
                self.profile.tag,
                pane.key(),
                count,
                self.limit
            ))
            .metadata(meta::KEY, pane.key())
            .metadata(meta::COUNT, count)
            .metadata(meta::THRESHOLD, self.limit);

        if let Some(name) = self.key_field.and_then(meta::for_field) {
            builder = builder.metadata(name, pane.key());
        }
        for (key, value) in uniqueness_metadata(&sample.events) {
            builder = builder.metadata(key, value);
        }

        builder.sample(sample).build().map(Some)
    }
}
