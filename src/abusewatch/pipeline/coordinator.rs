//! Pipeline driver
//!
//! `PipelineCoordinator` builds the configured detectors, spawns one worker
//! task per partition plus the population evaluator, and routes submitted
//! events to partitions by key.
//!
//! ## Lifecycle
//!
//! 1. `start(config, resources)` validates the configuration, loads static
//!    lists once, and spawns the workers
//! 2. `submit(event)` fans the event out to every detector that selects it
//!    and advances the watermark from event time
//! 3. `drain()` (or `cancel()`) flushes final panes for all open windows,
//!    evaluates pending population windows, closes the sinks, and returns
//!    the metrics or the first fatal error

use super::detector::Detector;
use super::dispatch::AlertDispatch;
use super::metrics::{PipelineMetrics, PipelineMetricsSnapshot};
use super::partition::{PartitionMessage, PartitionReceiver, PartitionShared};
use super::population::PopulationEvaluator;
use super::router::HashRouter;
use super::shutdown::ShutdownCoordinator;
use super::PipelineResources;
use crate::abusewatch::config::PipelineConfig;
use crate::abusewatch::criteria::EvaluationContext;
use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::event::{NormalizedEvent, SharedEvent};
use crate::abusewatch::window::WatermarkManager;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct PipelineCoordinator {
    detectors: Arc<Vec<Detector>>,
    router: HashRouter,
    senders: Vec<mpsc::Sender<PartitionMessage>>,
    partitions: Vec<JoinHandle<DetectionResult<()>>>,
    population: JoinHandle<DetectionResult<()>>,
    watermarks: WatermarkManager,
    dispatch: Arc<AlertDispatch>,
    metrics: Arc<PipelineMetrics>,
    shutdown: ShutdownCoordinator,
}

impl PipelineCoordinator {
    /// Build detectors and spawn partition workers on the current runtime
    pub async fn start(config: PipelineConfig, resources: PipelineResources) -> DetectionResult<Self> {
        config.validate()?;
        let detectors = config
            .detectors
            .iter()
            .map(|d| d.build())
            .collect::<DetectionResult<Vec<_>>>()?;
        if detectors.is_empty() {
            warn!("Pipeline '{}' started without detectors", config.monitored_resource);
        }
        let detectors = Arc::new(detectors);

        let metrics = Arc::new(PipelineMetrics::new());
        let dispatch = Arc::new(AlertDispatch::new(
            &config.escalation,
            resources.sinks,
            resources.notification_sinks,
            Arc::clone(&metrics),
        ));
        let ctx = EvaluationContext::new(config.monitored_resource.clone(), resources.state)
            .with_flagged_accounts(resources.flagged);

        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let shared = PartitionShared {
            detectors: Arc::clone(&detectors),
            ctx: ctx.clone(),
            dispatch: Arc::clone(&dispatch),
            metrics: Arc::clone(&metrics),
            reports: report_tx,
            max_state_retries: config.max_state_retries,
        };

        let mut senders = Vec::with_capacity(config.partitions);
        let mut partitions = Vec::with_capacity(config.partitions);
        for partition_id in 0..config.partitions {
            let (tx, rx) = mpsc::channel(config.channel_capacity);
            let receiver = PartitionReceiver::new(
                partition_id,
                shared.clone(),
                rx,
                resources.shutdown.subscribe(),
            );
            senders.push(tx);
            partitions.push(tokio::spawn(receiver.run()));
        }
        // Only partitions hold report senders, so the evaluator stops after they all do
        drop(shared);

        let population = tokio::spawn(
            PopulationEvaluator::new(
                config.partitions,
                Arc::clone(&detectors),
                report_rx,
                resources.nat,
                ctx,
                Arc::clone(&dispatch),
                Arc::clone(&metrics),
                config.max_state_retries,
            )
            .run(),
        );

        info!(
            "Pipeline '{}' started: {} detectors across {} partitions",
            config.monitored_resource,
            detectors.len(),
            config.partitions
        );

        Ok(Self {
            detectors,
            router: HashRouter::new(config.partitions),
            senders,
            partitions,
            population,
            watermarks: WatermarkManager::new(config.watermark.to_watermark_config()),
            dispatch,
            metrics,
            shutdown: resources.shutdown,
        })
    }

    /// Route an event to every detector that selects it.
    ///
    /// Waits while a partition queue is full.
    pub async fn submit(&mut self, event: NormalizedEvent) -> DetectionResult<()> {
        self.metrics.record_received();
        let event: SharedEvent = Arc::new(event);

        let mut routed = 0u64;
        for index in 0..self.detectors.len() {
            let Some(key) = self.detectors[index].accepts(&event) else {
                continue;
            };
            let partition = self.router.route(&key);
            self.send(
                partition,
                PartitionMessage::Event {
                    detector: index,
                    key,
                    event: Arc::clone(&event),
                },
            )
            .await?;
            routed += 1;
        }
        if routed == 0 {
            self.metrics.record_ignored();
        } else {
            self.metrics.record_routed(routed);
        }

        if let Some(watermark_ms) = self.watermarks.observe(event.timestamp) {
            self.broadcast_watermark(watermark_ms).await?;
        }
        Ok(())
    }

    /// Declare that no event before `watermark` is still to come
    pub async fn advance_watermark(&mut self, watermark: DateTime<Utc>) -> DetectionResult<()> {
        let watermark_ms = watermark.timestamp_millis();
        if self.watermarks.advance_to(watermark_ms) {
            self.broadcast_watermark(watermark_ms).await?;
        }
        Ok(())
    }

    pub fn current_watermark(&self) -> Option<DateTime<Utc>> {
        self.watermarks.current_watermark()
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot(self.dispatch.suppressed())
    }

    pub fn detector_ids(&self) -> Vec<&str> {
        self.detectors.iter().map(Detector::id).collect()
    }

    pub fn partitions(&self) -> usize {
        self.router.num_partitions()
    }

    /// Handle for cancelling the pipeline from elsewhere
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Flush every open window, evaluate pending populations and close the sinks
    pub async fn drain(self) -> DetectionResult<PipelineMetricsSnapshot> {
        let Self {
            senders,
            partitions,
            population,
            dispatch,
            metrics,
            ..
        } = self;
        drop(senders);

        let mut first_error = None;
        let results = join_all(partitions.into_iter().map(join)).await;
        for (partition_id, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                error!("Partition {} failed: {}", partition_id, e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = join(population).await {
            error!("Population evaluation failed: {}", e);
            first_error.get_or_insert(e);
        }
        if let Err(e) = dispatch.close().await {
            error!("Closing alert sinks failed: {}", e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                let snapshot = metrics.snapshot(dispatch.suppressed());
                info!(
                    "Pipeline drained: {} events, {} alerts ({} suppressed)",
                    snapshot.events_received, snapshot.alerts_emitted, snapshot.alerts_suppressed
                );
                Ok(snapshot)
            }
        }
    }

    /// Broadcast a cancel, then drain
    pub async fn cancel(self) -> DetectionResult<PipelineMetricsSnapshot> {
        self.shutdown.cancel();
        self.drain().await
    }

    async fn broadcast_watermark(&self, watermark_ms: i64) -> DetectionResult<()> {
        for partition in 0..self.senders.len() {
            self.send(partition, PartitionMessage::Watermark(watermark_ms))
                .await?;
        }
        Ok(())
    }

    async fn send(&self, partition: usize, message: PartitionMessage) -> DetectionResult<()> {
        self.senders[partition].send(message).await.map_err(|_| {
            DetectionError::closed(format!("partition {} is no longer running", partition))
        })
    }
}

async fn join(handle: JoinHandle<DetectionResult<()>>) -> DetectionResult<()> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(DetectionError::closed(format!("worker task failed: {}", e))),
    }
}
