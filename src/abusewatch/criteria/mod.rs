//! Criterion families
//!
//! Every family decides whether a group of events (or a single event)
//! constitutes abuse. "Not abusive" is always an empty result, never an error.
//!
//! ## Inputs
//!
//! | Family | Input |
//! |---|---|
//! | Threshold | one key's pane |
//! | Distributed correlation | one key's pane |
//! | Velocity | one key's pane (new events only) or a single event |
//! | Statistical threshold | every key of a closed window |
//! | Summary | every action of a closed window |
//! | Integrity comparators | a single event |

pub mod distributed;
pub mod integrity;
pub mod sampling;
pub mod statistical;
pub mod summary;
pub mod threshold;
pub mod velocity;

pub use distributed::{DistributedCorrelationCriterion, DistributedSummaryStyle};
pub use integrity::{
    ActivityMonitor, IntegrityComparator, LoginFailureAtRisk, RelayForwardComparator,
    StatusComparator,
};
pub use statistical::{StatisticalSettings, StatisticalThresholdCriterion};
pub use summary::SummaryCriterion;
pub use threshold::ThresholdCriterion;
pub use velocity::{VelocityCriterion, VelocitySettings};

use crate::abusewatch::aggregation::WindowAggregate;
use crate::abusewatch::alert::{meta, Alert, AlertBuilder, Severity};
use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::event::NormalizedEvent;
use crate::abusewatch::lists::FlaggedAccounts;
use crate::abusewatch::side_input::NatSnapshot;
use crate::abusewatch::state::{InMemoryStateStore, KeyedLocks, StateStore};
use crate::abusewatch::window::{Pane, PaneMode, WindowBounds};
use std::collections::HashSet;
use std::sync::Arc;

/// Suffix for the notify-merge key of monitor-only alerts
pub const MONITOR_ONLY_SUFFIX: &str = "_monitor_only";

/// Identity stamped on every alert a detector produces
#[derive(Debug, Clone, PartialEq)]
pub struct AlertProfile {
    pub tag: String,
    pub category: String,
    pub severity: Severity,
}

impl AlertProfile {
    pub fn new(tag: impl Into<String>, category: impl Into<String>, severity: Severity) -> Self {
        Self {
            tag: tag.into(),
            category: category.into(),
            severity,
        }
    }

    /// Builder pre-filled with category, subcategory, severity and detector tag
    pub fn builder(&self) -> AlertBuilder {
        AlertBuilder::new()
            .category(&self.category)
            .subcategory(&self.tag)
            .severity(self.severity)
            .metadata(meta::DETECTOR, &self.tag)
    }

    pub fn monitor_only_merge_key(&self) -> String {
        format!("{}{}", self.tag, MONITOR_ONLY_SUFFIX)
    }
}

/// Shared collaborators available to every evaluation
#[derive(Clone)]
pub struct EvaluationContext {
    pub monitored_resource: String,
    pub state: Arc<dyn StateStore>,
    pub locks: Arc<KeyedLocks>,
    pub flagged: FlaggedAccounts,
}

impl EvaluationContext {
    pub fn new(monitored_resource: impl Into<String>, state: Arc<dyn StateStore>) -> Self {
        Self {
            monitored_resource: monitored_resource.into(),
            state,
            locks: Arc::new(KeyedLocks::new()),
            flagged: FlaggedAccounts::new(),
        }
    }

    pub fn in_memory(monitored_resource: impl Into<String>) -> Self {
        Self::new(monitored_resource, Arc::new(InMemoryStateStore::new()))
    }

    pub fn with_flagged_accounts(mut self, flagged: FlaggedAccounts) -> Self {
        self.flagged = flagged;
        self
    }
}

/// What a criterion consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pane,
    Population,
    Event,
}

/// Data handed to `Criterion::evaluate`
#[derive(Debug, Clone, Copy)]
pub enum CriterionInput<'a> {
    Pane(&'a Pane),
    Population {
        aggregate: &'a WindowAggregate,
        nat: &'a NatSnapshot,
    },
    Event {
        key: &'a str,
        event: &'a NormalizedEvent,
    },
}

impl CriterionInput<'_> {
    fn kind(&self) -> InputKind {
        match self {
            CriterionInput::Pane(_) => InputKind::Pane,
            CriterionInput::Population { .. } => InputKind::Population,
            CriterionInput::Event { .. } => InputKind::Event,
        }
    }
}

/// Tagged variant over the criterion families
pub enum Criterion {
    Threshold(ThresholdCriterion),
    StatisticalThreshold(StatisticalThresholdCriterion),
    Velocity(VelocityCriterion),
    DistributedCorrelation(DistributedCorrelationCriterion),
    Integrity(IntegrityComparator),
    Summary(SummaryCriterion),
}

impl Criterion {
    pub fn profile(&self) -> &AlertProfile {
        match self {
            Criterion::Threshold(c) => c.profile(),
            Criterion::StatisticalThreshold(c) => c.profile(),
            Criterion::Velocity(c) => c.profile(),
            Criterion::DistributedCorrelation(c) => c.profile(),
            Criterion::Integrity(c) => c.profile(),
            Criterion::Summary(c) => c.profile(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.profile().tag
    }

    pub fn input_kind(&self) -> InputKind {
        match self {
            Criterion::Threshold(_) | Criterion::DistributedCorrelation(_) => InputKind::Pane,
            Criterion::Velocity(_) => InputKind::Pane,
            Criterion::StatisticalThreshold(_) | Criterion::Summary(_) => InputKind::Population,
            Criterion::Integrity(_) => InputKind::Event,
        }
    }

    /// Inputs a pane is evaluated as, each retried on its own.
    ///
    /// Velocity is evaluated event by event: every event moves the stored
    /// baseline, so retrying the whole pane would compare events that already
    /// advanced it against a later baseline.
    pub fn pane_inputs<'a>(&self, pane: &'a Pane) -> Vec<CriterionInput<'a>> {
        match self {
            Criterion::Velocity(_) => VelocityCriterion::ordered_events(pane)
                .into_iter()
                .map(|event| CriterionInput::Event {
                    key: pane.key(),
                    event,
                })
                .collect(),
            _ => vec![CriterionInput::Pane(pane)],
        }
    }

    /// How a window keeps events between panes.
    ///
    /// Velocity only reads the events added since the previous pane, so its
    /// window discards them once emitted.
    pub fn pane_mode(&self) -> PaneMode {
        match self {
            Criterion::Velocity(_) => PaneMode::Discarding,
            _ => PaneMode::Accumulating,
        }
    }

    /// Whether population evaluation needs the NAT side input
    pub fn reads_nat(&self) -> bool {
        matches!(self, Criterion::StatisticalThreshold(_))
    }

    /// Aggregate criteria must not fire again on a superset pane of a window
    pub fn fires_once_per_window(&self) -> bool {
        matches!(
            self,
            Criterion::Threshold(_)
                | Criterion::DistributedCorrelation(_)
                | Criterion::StatisticalThreshold(_)
                | Criterion::Summary(_)
        )
    }

    pub async fn evaluate(
        &self,
        input: CriterionInput<'_>,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Vec<Alert>> {
        match (self, input) {
            (Criterion::Threshold(c), CriterionInput::Pane(pane)) => {
                Ok(c.evaluate(pane, ctx)?.into_iter().collect())
            }
            (Criterion::DistributedCorrelation(c), CriterionInput::Pane(pane)) => {
                Ok(c.evaluate(pane, ctx)?.into_iter().collect())
            }
            (Criterion::Velocity(c), CriterionInput::Pane(pane)) => c.evaluate_pane(pane, ctx).await,
            (Criterion::Velocity(c), CriterionInput::Event { key, event }) => {
                c.evaluate_event(key, event, ctx).await
            }
            (Criterion::StatisticalThreshold(c), CriterionInput::Population { aggregate, nat }) => {
                c.evaluate(aggregate, nat, ctx)
            }
            (Criterion::Summary(c), CriterionInput::Population { aggregate, .. }) => {
                Ok(c.evaluate(aggregate, ctx)?.into_iter().collect())
            }
            (Criterion::Integrity(c), CriterionInput::Event { event, .. }) => {
                Ok(c.evaluate(event, ctx).await?.into_iter().collect())
            }
            (criterion, input) => Err(DetectionError::config(format!(
                "criterion '{}' expects {:?} input, got {:?}",
                criterion.tag(),
                criterion.input_kind(),
                input.kind()
            ))),
        }
    }
}

/// Remembers which (key, window) pairs already fired.
///
/// Fixed-window entries are released when their window expires. A global
/// window never expires, so an aggregate detector on a global window fires at
/// most once per key until the partition is flushed at drain or cancel.
#[derive(Debug, Default)]
pub struct FiredGuard {
    fired: HashSet<(String, WindowBounds)>,
}

impl FiredGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fired(&self, key: &str, bounds: WindowBounds) -> bool {
        self.fired.contains(&(key.to_string(), bounds))
    }

    /// Returns false if the pair had already fired
    pub fn mark(&mut self, key: &str, bounds: WindowBounds) -> bool {
        self.fired.insert((key.to_string(), bounds))
    }

    /// Release entries for a window that can no longer produce panes
    pub fn forget_window(&mut self, bounds: WindowBounds) {
        self.fired.retain(|(_, b)| *b != bounds);
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fired_guard() {
        let bounds = WindowBounds::new(0, 600_000);
        let mut guard = FiredGuard::new();
        assert!(!guard.has_fired("10.0.0.1", bounds));
        assert!(guard.mark("10.0.0.1", bounds));
        assert!(!guard.mark("10.0.0.1", bounds));
        assert!(!guard.has_fired("10.0.0.1", WindowBounds::new(600_000, 1_200_000)));

        guard.forget_window(bounds);
        assert!(guard.is_empty());
    }

    #[test]
    fn test_profile_builder() {
        let profile = AlertProfile::new("velocity", "customs", Severity::Info);
        let alert = profile.builder().summary("s").build().unwrap();
        assert_eq!(alert.subcategory, "velocity");
        assert_eq!(alert.metadata_value(meta::DETECTOR), Some("velocity"));
        assert_eq!(profile.monitor_only_merge_key(), "velocity_monitor_only");
    }

    #[tokio::test]
    async fn test_mismatched_input_is_rejected() {
        let criterion = Criterion::Threshold(ThresholdCriterion::new(
            AlertProfile::new("t", "customs", Severity::Info),
            3,
        ));
        let event = NormalizedEvent::at_millis("loginFailure", 0);
        let ctx = EvaluationContext::in_memory("test");
        let result = criterion
            .evaluate(CriterionInput::Event { key: "k", event: &event }, &ctx)
            .await;
        assert!(matches!(result, Err(DetectionError::Config { .. })));
    }
}
