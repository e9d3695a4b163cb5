//! Geographic velocity between consecutive events of one identity
//!
//! The baseline (last known location and time) lives in the state store under
//! the `velocity` namespace. Each evaluation re-reads it, compares, and writes
//! the current event back, all while holding the identity's lock. The baseline
//! always advances to the evaluated event, alert or not.
//!
//! Primary and monitor-only thresholds are checked independently: both may
//! fire for the same pair of events.

use super::{AlertProfile, EvaluationContext};
use crate::abusewatch::alert::{meta, Alert};
use crate::abusewatch::error::DetectionResult;
use crate::abusewatch::event::NormalizedEvent;
use crate::abusewatch::geo;
use crate::abusewatch::state::StateCursor;
use crate::abusewatch::window::Pane;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// State store namespace for velocity baselines
pub const VELOCITY_NAMESPACE: &str = "velocity";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocitySettings {
    /// Minimum distance in kilometers for a primary alert
    pub min_distance_km: f64,
    /// Minimum distance in kilometers for a monitor-only alert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_only_min_distance_km: Option<f64>,
    /// When set, the travel speed must also exceed this many km/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_kilometers_per_second: Option<f64>,
}

impl Default for VelocitySettings {
    fn default() -> Self {
        Self {
            min_distance_km: 5000.0,
            monitor_only_min_distance_km: None,
            max_kilometers_per_second: None,
        }
    }
}

/// Persisted last-known position of an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Baseline {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    address: Option<String>,
    timestamp_ms: i64,
}

impl Baseline {
    fn from_event(event: &NormalizedEvent, (latitude, longitude): (f64, f64)) -> Self {
        Self {
            latitude,
            longitude,
            city: event.geo.city.clone(),
            country: event.geo.country.clone(),
            address: event.source_address.clone(),
            timestamp_ms: event.event_time_millis(),
        }
    }
}

pub struct VelocityCriterion {
    profile: AlertProfile,
    settings: VelocitySettings,
}

impl VelocityCriterion {
    pub fn new(profile: AlertProfile, settings: VelocitySettings) -> Self {
        info!(
            "Initialized velocity criterion '{}' (min distance {} km)",
            profile.tag, settings.min_distance_km
        );
        Self { profile, settings }
    }

    pub fn profile(&self) -> &AlertProfile {
        &self.profile
    }

    pub fn settings(&self) -> &VelocitySettings {
        &self.settings
    }

    /// Events a pane added since the previous pane, in event-time order
    pub fn ordered_events(pane: &Pane) -> Vec<&NormalizedEvent> {
        let mut events: Vec<&NormalizedEvent> = pane.new_events().iter().map(|e| &**e).collect();
        events.sort_by_key(|e| e.event_time_millis());
        events
    }

    /// Evaluate a pane's new events in event-time order.
    ///
    /// Each event advances the baseline as it is evaluated, so a failure part
    /// way through must be resumed from the failing event rather than by
    /// re-running the pane. The pipeline does this by evaluating the events
    /// of `ordered_events` one at a time.
    pub async fn evaluate_pane(
        &self,
        pane: &Pane,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Vec<Alert>> {
        let mut alerts = Vec::new();
        for event in Self::ordered_events(pane) {
            alerts.extend(self.evaluate_event(pane.key(), event, ctx).await?);
        }
        Ok(alerts)
    }

    pub async fn evaluate_event(
        &self,
        key: &str,
        event: &NormalizedEvent,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Vec<Alert>> {
        let Some(position) = event.geo.coordinates() else {
            debug!("'{}': event for {} has no coordinates", self.profile.tag, key);
            return Ok(Vec::new());
        };

        let _guard = ctx
            .locks
            .lock(&format!("{}/{}", VELOCITY_NAMESPACE, key))
            .await;
        let cursor = StateCursor::new(ctx.state.as_ref(), VELOCITY_NAMESPACE);

        let previous: Option<Baseline> = cursor.get(key).await?;
        let current = Baseline::from_event(event, position);

        let mut alerts = Vec::new();
        if let Some(previous) = previous {
            let km = geo::km_between(
                (previous.latitude, previous.longitude),
                (current.latitude, current.longitude),
            );
            let seconds = (current.timestamp_ms - previous.timestamp_ms).abs() / 1000;

            if self.exceeds(km, seconds, self.settings.min_distance_km) {
                alerts.push(self.alert(key, event, &previous, km, seconds, false, ctx)?);
            }
            if let Some(monitor_km) = self.settings.monitor_only_min_distance_km {
                if self.exceeds(km, seconds, monitor_km) {
                    alerts.push(self.alert(key, event, &previous, km, seconds, true, ctx)?);
                }
            }
        }

        cursor.put(key, &current).await?;
        Ok(alerts)
    }

    fn exceeds(&self, km: f64, seconds: i64, min_distance_km: f64) -> bool {
        if km < min_distance_km {
            return false;
        }
        match self.settings.max_kilometers_per_second {
            Some(max_speed) => km / seconds.max(1) as f64 > max_speed,
            None => true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn alert(
        &self,
        key: &str,
        event: &NormalizedEvent,
        previous: &Baseline,
        km: f64,
        seconds: i64,
        monitor_only: bool,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Alert> {
        let mut summary = format!(
            "{} {} velocity exceeded, {:.2} km in {} seconds",
            ctx.monitored_resource, key, km, seconds
        );
        let mut builder = self.profile.builder();
        if monitor_only {
            summary.push_str(" (monitor only)");
            builder = builder.notify_merge_key(self.profile.monitor_only_merge_key());
        }

        builder
            .summary(summary)
            .metadata(meta::KEY, key)
            .metadata(meta::UID, key)
            .metadata(meta::KM_DISTANCE, format!("{:.2}", km))
            .metadata(meta::TIME_DELTA_SECONDS, seconds)
            .metadata_opt(meta::EMAIL, event.account_id.as_deref())
            .metadata_opt(meta::SOURCEADDRESS, event.source_address.as_deref())
            .metadata_opt(meta::SOURCEADDRESS_CITY, event.geo.city.as_deref())
            .metadata_opt(meta::SOURCEADDRESS_COUNTRY, event.geo.country.as_deref())
            .metadata_opt(meta::SOURCEADDRESS_PREVIOUS, previous.address.as_deref())
            .metadata_opt(meta::SOURCEADDRESS_PREVIOUS_CITY, previous.city.as_deref())
            .metadata_opt(
                meta::SOURCEADDRESS_PREVIOUS_COUNTRY,
                previous.country.as_deref(),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::alert::Severity;
    use crate::abusewatch::event::{ActionType, GeoPoint};
    use crate::abusewatch::state::{InMemoryStateStore, StateStore};
    use std::sync::Arc;

    const UID: &str = "00000000000000000000000000000000";

    fn milton(millis: i64) -> NormalizedEvent {
        NormalizedEvent::at_millis(ActionType::LoginSuccess, millis)
            .with_uid(UID)
            .with_account_id("riker@mozilla.com")
            .with_source_address("216.160.83.56")
            .with_geo(GeoPoint::new("Milton", "US", 47.2513, -122.5154))
    }

    fn london(millis: i64) -> NormalizedEvent {
        NormalizedEvent::at_millis(ActionType::LoginSuccess, millis)
            .with_uid(UID)
            .with_account_id("riker@mozilla.com")
            .with_source_address("81.2.69.192")
            .with_geo(GeoPoint::new("London", "GB", 51.5142, -0.0931))
    }

    fn criterion(settings: VelocitySettings) -> VelocityCriterion {
        VelocityCriterion::new(
            AlertProfile::new("velocity", "customs", Severity::Info),
            settings,
        )
    }

    #[tokio::test]
    async fn test_first_observation_never_alerts() {
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings::default());
        assert!(c.evaluate_event(UID, &milton(0), &ctx).await.unwrap().is_empty());
        assert!(ctx.state.get(VELOCITY_NAMESPACE, UID).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_velocity_alert() {
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings {
            min_distance_km: 500.0,
            ..Default::default()
        });
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        let alerts = c.evaluate_event(UID, &london(9_000), &ctx).await.unwrap();

        assert_eq!(alerts.len(), 1);
        let a = &alerts[0];
        assert_eq!(
            a.summary,
            "test 00000000000000000000000000000000 velocity exceeded, 7740.82 km in 9 seconds"
        );
        assert_eq!(a.notify_merge_key.as_deref(), Some("velocity"));
        assert_eq!(a.metadata_value(meta::SOURCEADDRESS), Some("81.2.69.192"));
        assert_eq!(a.metadata_value(meta::SOURCEADDRESS_PREVIOUS), Some("216.160.83.56"));
        assert_eq!(a.metadata_value(meta::SOURCEADDRESS_CITY), Some("London"));
        assert_eq!(a.metadata_value(meta::SOURCEADDRESS_PREVIOUS_COUNTRY), Some("US"));
        assert_eq!(a.metadata_value(meta::KM_DISTANCE), Some("7740.82"));
        assert_eq!(a.metadata_value(meta::TIME_DELTA_SECONDS), Some("9"));
        assert_eq!(a.metadata_value(meta::EMAIL), Some("riker@mozilla.com"));
    }

    #[tokio::test]
    async fn test_distance_below_minimum() {
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings {
            min_distance_km: 8000.0,
            ..Default::default()
        });
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        assert!(c.evaluate_event(UID, &london(9_000), &ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_only_independence() {
        let only_monitor = VelocitySettings {
            min_distance_km: 8000.0,
            monitor_only_min_distance_km: Some(500.0),
            max_kilometers_per_second: None,
        };
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(only_monitor);
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        let alerts = c.evaluate_event(UID, &london(9_000), &ctx).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].summary.ends_with("(monitor only)"));
        assert_eq!(
            alerts[0].notify_merge_key.as_deref(),
            Some("velocity_monitor_only")
        );

        let both = VelocitySettings {
            min_distance_km: 500.0,
            monitor_only_min_distance_km: Some(100.0),
            max_kilometers_per_second: None,
        };
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(both);
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        let alerts = c.evaluate_event(UID, &london(9_000), &ctx).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(
            alerts
                .iter()
                .filter(|a| a.notify_merge_key.as_deref() == Some("velocity"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_baseline_always_advances() {
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings {
            min_distance_km: 500.0,
            ..Default::default()
        });
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        assert_eq!(c.evaluate_event(UID, &london(9_000), &ctx).await.unwrap().len(), 1);
        // Same place again: measured against London, not Milton
        assert!(c.evaluate_event(UID, &london(20_000), &ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_coordinates_leave_baseline() {
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings {
            min_distance_km: 500.0,
            ..Default::default()
        });
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        let no_geo = NormalizedEvent::at_millis(ActionType::LoginSuccess, 5_000).with_uid(UID);
        assert!(c.evaluate_event(UID, &no_geo, &ctx).await.unwrap().is_empty());
        assert_eq!(c.evaluate_event(UID, &london(9_000), &ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_speed_requirement() {
        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings {
            min_distance_km: 500.0,
            monitor_only_min_distance_km: None,
            max_kilometers_per_second: Some(0.2),
        });
        c.evaluate_event(UID, &milton(0), &ctx).await.unwrap();
        // 7740 km over a full day is about 0.09 km/s
        assert!(c
            .evaluate_event(UID, &london(86_400_000), &ctx)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_store_unavailable_propagates() {
        let store = Arc::new(InMemoryStateStore::new());
        let ctx = EvaluationContext::new("test", store.clone());
        let c = criterion(VelocitySettings::default());
        store.set_unavailable(true);
        let err = c.evaluate_event(UID, &milton(0), &ctx).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_pane_events_evaluated_in_time_order() {
        use crate::abusewatch::window::{PaneTiming, WindowBounds};

        let ctx = EvaluationContext::in_memory("test");
        let c = criterion(VelocitySettings {
            min_distance_km: 500.0,
            ..Default::default()
        });
        let events: Vec<Arc<NormalizedEvent>> =
            vec![Arc::new(london(9_000)), Arc::new(milton(0))];
        let pane = Pane::new(
            UID,
            WindowBounds::global(),
            0,
            PaneTiming::Early,
            events.into(),
            0,
        );
        let alerts = c.evaluate_pane(&pane, &ctx).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metadata_value(meta::SOURCEADDRESS), Some("81.2.69.192"));
    }

    #[test]
    fn test_pane_split_into_ordered_event_inputs() {
        use crate::abusewatch::criteria::{Criterion, CriterionInput};
        use crate::abusewatch::window::{PaneMode, PaneTiming, WindowBounds};

        let events: Vec<Arc<NormalizedEvent>> = vec![
            Arc::new(milton(0)),
            Arc::new(milton(18_000)),
            Arc::new(london(9_000)),
        ];
        // First event already seen by the previous pane
        let pane = Pane::new(
            UID,
            WindowBounds::global(),
            1,
            PaneTiming::Final,
            events.into(),
            1,
        );
        let c = Criterion::Velocity(criterion(VelocitySettings::default()));
        assert_eq!(c.pane_mode(), PaneMode::Discarding);

        let times: Vec<i64> = c
            .pane_inputs(&pane)
            .into_iter()
            .map(|input| match input {
                CriterionInput::Event { key, event } => {
                    assert_eq!(key, UID);
                    event.event_time_millis()
                }
                other => panic!("unexpected input {:?}", other),
            })
            .collect();
        assert_eq!(times, vec![9_000, 18_000]);
    }
}
