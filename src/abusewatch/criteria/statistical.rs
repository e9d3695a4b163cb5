//! Threshold relative to the window's population
//!
//! ## Algorithm
//!
//! 1. Mean of per-key counts over every key in the window, leaving out keys the
//!    NAT side input marks as shared gateways
//! 2. Skip the window when fewer than `required_minimum_clients` keys
//!    contributed or the mean is below `required_minimum_average`
//! 3. Effective threshold = mean x `threshold_modifier`, capped at
//!    `clamp_threshold_maximum` when set
//! 4. Every key whose count strictly exceeds the effective threshold fires
//!
//! NAT-flagged keys never fire.

use super::{AlertProfile, EvaluationContext};
use crate::abusewatch::aggregation::WindowAggregate;
use crate::abusewatch::alert::{meta, Alert};
use crate::abusewatch::error::DetectionResult;
use crate::abusewatch::event::EventField;
use crate::abusewatch::side_input::NatSnapshot;
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSettings {
    #[serde(default = "default_modifier")]
    pub threshold_modifier: f64,
    #[serde(default = "default_minimum_average")]
    pub required_minimum_average: f64,
    #[serde(default = "default_minimum_clients")]
    pub required_minimum_clients: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_threshold_maximum: Option<f64>,
}

fn default_modifier() -> f64 {
    75.0
}

fn default_minimum_average() -> f64 {
    5.0
}

fn default_minimum_clients() -> usize {
    5
}

impl Default for StatisticalSettings {
    fn default() -> Self {
        Self {
            threshold_modifier: default_modifier(),
            required_minimum_average: default_minimum_average(),
            required_minimum_clients: default_minimum_clients(),
            clamp_threshold_maximum: None,
        }
    }
}

impl StatisticalSettings {
    pub fn with_modifier(mut self, modifier: f64) -> Self {
        self.threshold_modifier = modifier;
        self
    }

    pub fn with_minimum_average(mut self, average: f64) -> Self {
        self.required_minimum_average = average;
        self
    }

    pub fn with_minimum_clients(mut self, clients: usize) -> Self {
        self.required_minimum_clients = clients;
        self
    }

    pub fn with_clamp_maximum(mut self, maximum: f64) -> Self {
        self.clamp_threshold_maximum = Some(maximum);
        self
    }
}

/// Result of the population pass for one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStats {
    pub clients: usize,
    pub mean: f64,
    pub threshold: f64,
}

pub struct StatisticalThresholdCriterion {
    profile: AlertProfile,
    settings: StatisticalSettings,
    monitor_only: bool,
    key_field: Option<EventField>,
}

impl StatisticalThresholdCriterion {
    pub fn new(profile: AlertProfile, settings: StatisticalSettings) -> Self {
        info!(
            "Initialized statistical threshold criterion '{}' (modifier {})",
            profile.tag, settings.threshold_modifier
        );
        Self {
            profile,
            settings,
            monitor_only: false,
            key_field: None,
        }
    }

    /// Route matches to the monitor-only merge key instead of raising primary alerts
    pub fn monitor_only(mut self, monitor_only: bool) -> Self {
        self.monitor_only = monitor_only;
        self
    }

    pub fn with_key_field(mut self, field: EventField) -> Self {
        self.key_field = Some(field);
        self
    }

    pub fn profile(&self) -> &AlertProfile {
        &self.profile
    }

    pub fn settings(&self) -> &StatisticalSettings {
        &self.settings
    }

    pub fn is_monitor_only(&self) -> bool {
        self.monitor_only
    }

    /// Population statistics, or `None` when the window must be skipped
    pub fn population_stats(
        &self,
        aggregate: &WindowAggregate,
        nat: &NatSnapshot,
    ) -> Option<PopulationStats> {
        let counts: Vec<usize> = aggregate
            .counts()
            .filter(|(key, _)| !nat.is_nat(key))
            .map(|(_, count)| count)
            .collect();

        let clients = counts.len();
        if clients == 0 || clients < self.settings.required_minimum_clients {
            debug!(
                "'{}' window {}: {} clients below minimum {}",
                self.profile.tag,
                aggregate.bounds(),
                clients,
                self.settings.required_minimum_clients
            );
            return None;
        }

        let mean = counts.iter().sum::<usize>() as f64 / clients as f64;
        if mean < self.settings.required_minimum_average {
            debug!(
                "'{}' window {}: mean {:.2} below minimum {}",
                self.profile.tag,
                aggregate.bounds(),
                mean,
                self.settings.required_minimum_average
            );
            return None;
        }

        let mut threshold = mean * self.settings.threshold_modifier;
        if let Some(max) = self.settings.clamp_threshold_maximum {
            threshold = threshold.min(max);
        }
        Some(PopulationStats {
            clients,
            mean,
            threshold,
        })
    }

    pub fn evaluate(
        &self,
        aggregate: &WindowAggregate,
        nat: &NatSnapshot,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Vec<Alert>> {
        let Some(stats) = self.population_stats(aggregate, nat) else {
            return Ok(Vec::new());
        };

        let window_timestamp = aggregate.bounds().max_timestamp_rfc3339();
        let mut alerts = Vec::new();

        for (key, count) in aggregate.counts() {
            if nat.is_nat(key) || (count as f64) <= stats.threshold {
                continue;
            }

            let mut summary = format!(
                "{} {} {} {} {}",
                ctx.monitored_resource, self.profile.category, self.profile.tag, key, count
            );
            let mut builder = self.profile.builder();
            if self.monitor_only {
                summary.push_str(" (monitor only)");
                builder = builder.notify_merge_key(self.profile.monitor_only_merge_key());
            }

            builder = builder
                .summary(summary)
                .metadata(meta::KEY, key)
                .metadata(meta::COUNT, count)
                .metadata(meta::MEAN, stats.mean)
                .metadata(meta::THRESHOLD, stats.threshold)
                .metadata(meta::THRESHOLD_MODIFIER, self.settings.threshold_modifier)
                .metadata(meta::WINDOW_TIMESTAMP, &window_timestamp);
            if let Some(name) = self.key_field.and_then(meta::for_field) {
                builder = builder.metadata(name, key);
            }
            alerts.push(builder.build()?);
        }
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::alert::Severity;
    use crate::abusewatch::event::{ActionType, NormalizedEvent, SharedEvent};
    use crate::abusewatch::window::{Pane, WindowBounds};
    use std::sync::Arc;

    fn aggregate(counts: &[(&str, usize)]) -> WindowAggregate {
        let bounds = WindowBounds::new(0, 60_000);
        WindowAggregate::from_panes(
            bounds,
            counts.iter().map(|(key, n)| {
                let events: Vec<SharedEvent> = (0..*n)
                    .map(|_| {
                        Arc::new(
                            NormalizedEvent::at_millis(ActionType::HttpRequest, 1_000)
                                .with_source_address(*key),
                        )
                    })
                    .collect();
                Pane::single(*key, bounds, events)
            }),
        )
    }

    fn criterion(settings: StatisticalSettings) -> StatisticalThresholdCriterion {
        StatisticalThresholdCriterion::new(
            AlertProfile::new("threshold_analysis", "httprequest", Severity::Info),
            settings,
        )
        .with_key_field(EventField::SourceAddress)
    }

    fn population() -> WindowAggregate {
        // mean = (100 + 9 * 4) / 10 = 13.6
        let mut counts = vec![("10.0.0.1", 100)];
        let others: Vec<String> = (2..11).map(|i| format!("10.0.0.{i}")).collect();
        counts.extend(others.iter().map(|k| (k.as_str(), 4)));
        aggregate(&counts)
    }

    #[test]
    fn test_single_outlier_fires() {
        let ctx = EvaluationContext::in_memory("test");
        let settings = StatisticalSettings::default()
            .with_modifier(1.0)
            .with_minimum_average(3.0)
            .with_minimum_clients(5);
        let alerts = criterion(settings)
            .evaluate(&population(), &NatSnapshot::default(), &ctx)
            .unwrap();

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.summary, "test httprequest threshold_analysis 10.0.0.1 100");
        assert_eq!(alert.metadata_value(meta::SOURCEADDRESS), Some("10.0.0.1"));
        let mean: f64 = alert.metadata_value(meta::MEAN).unwrap().parse().unwrap();
        assert!((mean - 13.6).abs() < 0.1);
        let modifier: f64 = alert
            .metadata_value(meta::THRESHOLD_MODIFIER)
            .unwrap()
            .parse()
            .unwrap();
        assert!((modifier - 1.0).abs() < 0.1);
        assert_eq!(
            alert.metadata_value(meta::WINDOW_TIMESTAMP),
            Some("1970-01-01T00:00:59.999Z")
        );
    }

    #[test]
    fn test_minimums_suppress_window() {
        let ctx = EvaluationContext::in_memory("test");
        let nat = NatSnapshot::default();
        let high_average = StatisticalSettings::default()
            .with_modifier(1.0)
            .with_minimum_average(250.0)
            .with_minimum_clients(1);
        assert!(criterion(high_average)
            .evaluate(&population(), &nat, &ctx)
            .unwrap()
            .is_empty());

        let many_clients = StatisticalSettings::default()
            .with_modifier(1.0)
            .with_minimum_average(1.0)
            .with_minimum_clients(500);
        assert!(criterion(many_clients)
            .evaluate(&population(), &nat, &ctx)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_exact_tie_does_not_fire() {
        let ctx = EvaluationContext::in_memory("test");
        // mean = 5, threshold = 10
        let agg = aggregate(&[("a", 10), ("b", 0), ("c", 5), ("d", 5), ("e", 5)]);
        let settings = StatisticalSettings::default()
            .with_modifier(2.0)
            .with_minimum_average(1.0)
            .with_minimum_clients(1);
        let c = criterion(settings);
        let stats = c.population_stats(&agg, &NatSnapshot::default()).unwrap();
        assert_eq!(stats.threshold, 10.0);
        assert!(c.evaluate(&agg, &NatSnapshot::default(), &ctx).unwrap().is_empty());
    }

    #[test]
    fn test_clamp_maximum() {
        let ctx = EvaluationContext::in_memory("test");
        let settings = StatisticalSettings::default()
            .with_modifier(1.0)
            .with_minimum_average(1.0)
            .with_minimum_clients(1)
            .with_clamp_maximum(1.0);
        let alerts = criterion(settings)
            .evaluate(&population(), &NatSnapshot::default(), &ctx)
            .unwrap();
        assert_eq!(alerts.len(), 10);
    }

    #[test]
    fn test_nat_keys_excluded_and_silent() {
        let ctx = EvaluationContext::in_memory("test");
        let agg = aggregate(&[("nat", 100), ("a", 10), ("b", 10), ("c", 10), ("d", 60)]);
        let settings = StatisticalSettings::default()
            .with_modifier(2.0)
            .with_minimum_average(1.0)
            .with_minimum_clients(1);
        let c = criterion(settings);

        // Without NAT information the large gateway dominates the mean (38)
        let alerts = c.evaluate(&agg, &NatSnapshot::default(), &ctx).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metadata_value(meta::KEY), Some("nat"));

        // Excluding it, mean is 22.5 and only "d" exceeds 45
        let nat = NatSnapshot::new(["nat".to_string()]);
        let alerts = c.evaluate(&agg, &nat, &ctx).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metadata_value(meta::KEY), Some("d"));
        let mean: f64 = alerts[0].metadata_value(meta::MEAN).unwrap().parse().unwrap();
        assert!((mean - 22.5).abs() < 0.1);
    }

    #[test]
    fn test_monitor_only_variant() {
        let ctx = EvaluationContext::in_memory("test");
        let settings = StatisticalSettings::default()
            .with_modifier(1.0)
            .with_minimum_average(1.0)
            .with_minimum_clients(1);
        let alerts = criterion(settings)
            .monitor_only(true)
            .evaluate(&population(), &NatSnapshot::default(), &ctx)
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0].summary,
            "test httprequest threshold_analysis 10.0.0.1 100 (monitor only)"
        );
        assert_eq!(
            alerts[0].notify_merge_key.as_deref(),
            Some("threshold_analysis_monitor_only")
        );
    }
}
