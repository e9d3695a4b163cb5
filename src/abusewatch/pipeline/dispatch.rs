//! Criterion evaluation with state retries, and alert fan-out to sinks

use super::metrics::PipelineMetrics;
use crate::abusewatch::alert::{Alert, AlertSink, EscalatingSink, EscalationPolicy};
use crate::abusewatch::criteria::{Criterion, CriterionInput, EvaluationContext};
use crate::abusewatch::error::DetectionResult;
use log::{error, warn};
use std::sync::Arc;
use std::time::Duration;

const RETRY_BASE_BACKOFF_MS: u64 = 10;

/// Evaluate a criterion, retrying while the state store is unavailable.
///
/// Retryable errors that outlast `max_retries` and fatal errors are returned.
/// Any other failure is logged, counted, and treated as "no alert".
pub(crate) async fn evaluate_with_retry(
    criterion: &Criterion,
    input: CriterionInput<'_>,
    ctx: &EvaluationContext,
    max_retries: u32,
    metrics: &PipelineMetrics,
) -> DetectionResult<Vec<Alert>> {
    let mut attempt = 0u32;
    loop {
        match criterion.evaluate(input, ctx).await {
            Ok(alerts) => return Ok(alerts),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                metrics.record_state_retry();
                let backoff = RETRY_BASE_BACKOFF_MS << (attempt - 1).min(6);
                warn!(
                    "Criterion '{}': {} (retry {}/{} in {}ms)",
                    criterion.tag(),
                    e,
                    attempt,
                    max_retries,
                    backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) if e.is_retryable() || e.is_fatal() => {
                error!("Criterion '{}' failed: {}", criterion.tag(), e);
                return Err(e);
            }
            Err(e) => {
                metrics.record_evaluation_error();
                warn!("Criterion '{}' skipped input: {}", criterion.tag(), e);
                return Ok(Vec::new());
            }
        }
    }
}

/// Validates alerts and forwards them to the sinks.
///
/// Primary sinks receive every alert; notification sinks only those whose
/// detector is enabled for escalation.
pub(crate) struct AlertDispatch {
    primary: Vec<Arc<dyn AlertSink>>,
    notification: Vec<Arc<EscalatingSink>>,
    metrics: Arc<PipelineMetrics>,
}

impl AlertDispatch {
    pub fn new(
        policy: &EscalationPolicy,
        primary: Vec<Arc<dyn AlertSink>>,
        notification: Vec<Arc<dyn AlertSink>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let notification = notification
            .into_iter()
            .map(|sink| Arc::new(EscalatingSink::new(policy.clone(), sink)))
            .collect();
        Self {
            primary,
            notification,
            metrics,
        }
    }

    /// A schema violation stops dispatch before anything reaches a sink
    pub async fn dispatch(&self, alerts: Vec<Alert>) -> DetectionResult<()> {
        for alert in &alerts {
            alert.validate()?;
        }
        self.metrics.record_alerts(alerts.len() as u64);
        for alert in alerts {
            for sink in &self.primary {
                sink.emit(alert.clone()).await?;
            }
            for sink in &self.notification {
                sink.emit(alert.clone()).await?;
            }
        }
        Ok(())
    }

    /// Alerts escalation kept from the notification sinks
    pub fn suppressed(&self) -> u64 {
        self.notification
            .first()
            .map(|sink| sink.suppressed())
            .unwrap_or(0)
    }

    pub async fn close(&self) -> DetectionResult<()> {
        for sink in &self.primary {
            sink.close().await?;
        }
        for sink in &self.notification {
            sink.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::alert::{AlertBuilder, CollectingSink, Severity};
    use crate::abusewatch::criteria::{AlertProfile, VelocityCriterion, VelocitySettings};
    use crate::abusewatch::error::DetectionError;
    use crate::abusewatch::event::{ActionType, GeoPoint, NormalizedEvent};
    use crate::abusewatch::state::{InMemoryStateStore, StateStore};

    #[tokio::test]
    async fn test_dispatch_applies_escalation() {
        let primary = Arc::new(CollectingSink::new());
        let notify = Arc::new(CollectingSink::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let dispatch = AlertDispatch::new(
            &EscalationPolicy::default().with_category("quiet", false),
            vec![primary.clone() as Arc<dyn AlertSink>],
            vec![notify.clone() as Arc<dyn AlertSink>],
            Arc::clone(&metrics),
        );

        let loud = AlertBuilder::new()
            .category("customs")
            .subcategory("loud")
            .severity(Severity::Info)
            .summary("s")
            .build()
            .unwrap();
        let mut quiet = loud.clone();
        quiet.subcategory = "quiet".to_string();

        dispatch.dispatch(vec![loud, quiet]).await.unwrap();
        assert_eq!(primary.len(), 2);
        assert_eq!(notify.len(), 1);
        assert_eq!(dispatch.suppressed(), 1);
        assert_eq!(metrics.alerts_emitted(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_malformed_alert() {
        let sink = Arc::new(CollectingSink::new());
        let dispatch = AlertDispatch::new(
            &EscalationPolicy::default(),
            vec![sink.clone() as Arc<dyn AlertSink>],
            Vec::new(),
            Arc::new(PipelineMetrics::new()),
        );
        let mut alert = AlertBuilder::new()
            .category("customs")
            .severity(Severity::Info)
            .summary("s")
            .build()
            .unwrap();
        alert.summary.clear();

        let result = dispatch.dispatch(vec![alert]).await;
        assert!(matches!(result, Err(DetectionError::AlertSchema { .. })));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_error() {
        let store = Arc::new(InMemoryStateStore::new());
        store.set_unavailable(true);
        let ctx = EvaluationContext::new("test", store.clone() as Arc<dyn StateStore>);
        let metrics = PipelineMetrics::new();
        let criterion = Criterion::Velocity(VelocityCriterion::new(
            AlertProfile::new("velocity", "customs", Severity::Info),
            VelocitySettings::default(),
        ));
        let event = NormalizedEvent::at_millis(ActionType::LoginSuccess, 0)
            .with_uid("uid-1")
            .with_geo(GeoPoint::new("Milton", "US", 47.2513, -122.5154));

        let result = evaluate_with_retry(
            &criterion,
            CriterionInput::Event {
                key: "uid-1",
                event: &event,
            },
            &ctx,
            2,
            &metrics,
        )
        .await;
        assert!(matches!(result, Err(DetectionError::StateUnavailable { .. })));
        assert_eq!(metrics.snapshot(0).state_retries, 2);
    }
}
