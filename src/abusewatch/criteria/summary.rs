//! Per-window activity summary
//!
//! Keyed by action, so a closed window's aggregate holds one count per
//! action seen. One informational alert reports every count, labelled in
//! snake case (`loginFailure` becomes `login_failure`), in label order.
//! An empty window produces nothing.

use super::{AlertProfile, EvaluationContext};
use crate::abusewatch::aggregation::WindowAggregate;
use crate::abusewatch::alert::{meta, Alert};
use crate::abusewatch::error::DetectionResult;
use log::{debug, info};

pub struct SummaryCriterion {
    profile: AlertProfile,
}

impl SummaryCriterion {
    pub fn new(profile: AlertProfile) -> Self {
        info!("Initialized summary criterion '{}'", profile.tag);
        Self { profile }
    }

    pub fn profile(&self) -> &AlertProfile {
        &self.profile
    }

    pub fn evaluate(
        &self,
        aggregate: &WindowAggregate,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Option<Alert>> {
        let mut counts: Vec<(String, usize)> = aggregate
            .counts()
            .filter(|(_, count)| *count > 0)
            .map(|(action, count)| (snake_case(action), count))
            .collect();
        if counts.is_empty() {
            debug!("'{}' window {}: nothing to report", self.profile.tag, aggregate.bounds());
            return Ok(None);
        }
        counts.sort();

        let period = counts
            .iter()
            .map(|(label, count)| format!("{} {}", label, count))
            .collect::<Vec<_>>()
            .join(", ");

        let mut builder = self
            .profile
            .builder()
            .summary(format!("{} summary for period, {}", ctx.monitored_resource, period))
            .metadata(meta::WINDOW_TIMESTAMP, aggregate.bounds().max_timestamp_rfc3339());
        for (label, count) in &counts {
            builder = builder.metadata(label.as_str(), count);
        }
        builder.build().map(Some)
    }
}

/// `loginFailure` to `login_failure`; labels already in snake case pass through
fn snake_case(action: &str) -> String {
    let mut out = String::with_capacity(action.len() + 4);
    for c in action.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
