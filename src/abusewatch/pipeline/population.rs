//! Population evaluator for statistical detectors
//!
//! Collects every partition's panes for a window into one `WindowAggregate`
//! and evaluates it exactly once, after all partitions have acknowledged a
//! watermark at or past the window end. Windows still pending when the
//! partitions stop (drain or cancel) are evaluated on the way out.

use super::detector::Detector;
use super::dispatch::{evaluate_with_retry, AlertDispatch};
use super::metrics::PipelineMetrics;
use super::partition::PartitionReport;
use crate::abusewatch::aggregation::WindowAggregate;
use crate::abusewatch::criteria::{CriterionInput, EvaluationContext};
use crate::abusewatch::error::DetectionResult;
use crate::abusewatch::side_input::{NatSnapshot, SideInput};
use crate::abusewatch::window::{Pane, WindowBounds};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct PopulationEvaluator {
    detectors: Arc<Vec<Detector>>,
    reports: mpsc::UnboundedReceiver<PartitionReport>,
    pending: BTreeMap<(WindowBounds, usize), WindowAggregate>,
    /// Last watermark acknowledged by each partition
    acks: Vec<Option<i64>>,
    /// Windows ending at or before this were already evaluated
    horizon: Option<i64>,
    nat: Option<SideInput<NatSnapshot>>,
    ctx: EvaluationContext,
    dispatch: Arc<AlertDispatch>,
    metrics: Arc<PipelineMetrics>,
    max_state_retries: u32,
}

impl PopulationEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partitions: usize,
        detectors: Arc<Vec<Detector>>,
        reports: mpsc::UnboundedReceiver<PartitionReport>,
        nat: Option<SideInput<NatSnapshot>>,
        ctx: EvaluationContext,
        dispatch: Arc<AlertDispatch>,
        metrics: Arc<PipelineMetrics>,
        max_state_retries: u32,
    ) -> Self {
        Self {
            detectors,
            reports,
            pending: BTreeMap::new(),
            acks: vec![None; partitions],
            horizon: None,
            nat,
            ctx,
            dispatch,
            metrics,
            max_state_retries,
        }
    }

    /// Runs until every partition has dropped its report sender
    pub async fn run(mut self) -> DetectionResult<()> {
        while let Some(report) = self.reports.recv().await {
            match report {
                PartitionReport::Population { detector, pane } => self.collect(detector, pane),
                PartitionReport::WatermarkAck {
                    partition,
                    watermark_ms,
                } => self.acknowledge(partition, watermark_ms).await?,
            }
        }

        let remaining: Vec<(WindowBounds, usize)> = self.pending.keys().copied().collect();
        for slot in remaining {
            self.evaluate(slot).await?;
        }
        Ok(())
    }

    fn collect(&mut self, detector: usize, pane: Pane) {
        let bounds = pane.bounds();
        if self.horizon.is_some_and(|h| bounds.end_ms <= h) {
            debug!(
                "Ignoring late population pane for '{}' in evaluated window {}",
                pane.key(),
                bounds
            );
            return;
        }
        self.pending
            .entry((bounds, detector))
            .or_insert_with(|| WindowAggregate::new(bounds))
            .merge(pane);
    }

    async fn acknowledge(&mut self, partition: usize, watermark_ms: i64) -> DetectionResult<()> {
        if let Some(ack) = self.acks.get_mut(partition) {
            *ack = Some(ack.map_or(watermark_ms, |a| a.max(watermark_ms)));
        }

        let Some(horizon) = self.acks.iter().copied().min().flatten() else {
            return Ok(());
        };
        if self.horizon.is_some_and(|h| horizon <= h) {
            return Ok(());
        }
        self.horizon = Some(horizon);

        let ready: Vec<(WindowBounds, usize)> = self
            .pending
            .keys()
            .copied()
            .filter(|(bounds, _)| bounds.end_ms <= horizon)
            .collect();
        for slot in ready {
            self.evaluate(slot).await?;
        }
        Ok(())
    }

    async fn evaluate(&mut self, slot: (WindowBounds, usize)) -> DetectionResult<()> {
        let Some(aggregate) = self.pending.remove(&slot) else {
            return Ok(());
        };
        let Some(detector) = self.detectors.get(slot.1) else {
            return Ok(());
        };

        let nat = match (&self.nat, detector.nat_detector()) {
            _ if !detector.criterion().reads_nat() => Arc::new(NatSnapshot::default()),
            (Some(side_input), _) => side_input.snapshot().await?,
            (None, Some(nat)) => Arc::new(nat.detect(aggregate.events().map(|e| e.as_ref()))),
            (None, None) => Arc::new(NatSnapshot::default()),
        };

        let alerts = evaluate_with_retry(
            detector.criterion(),
            CriterionInput::Population {
                aggregate: &aggregate,
                nat: &nat,
            },
            &self.ctx,
            self.max_state_retries,
            &self.metrics,
        )
        .await?;
        self.metrics.record_window_evaluated();
        debug!(
            "'{}' evaluated window {} over {} keys: {} alerts",
            detector.id(),
            aggregate.bounds(),
            aggregate.key_count(),
            alerts.len()
        );
        self.dispatch.dispatch(alerts).await
    }
}
