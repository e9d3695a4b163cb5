//! Partition worker
//!
//! Each partition owns the window state for its share of the key space:
//! one `WindowManager` and one `FiredGuard` per windowed detector. Nothing
//! window-related is shared between partitions; the only shared resources
//! are the state store (behind per-key locks), the sinks and the metrics.
//!
//! ## Message flow
//!
//! - `Event`: event criteria evaluate immediately; windowed criteria add the
//!   event to their window and evaluate whatever panes it triggers
//! - `Watermark`: closes windows behind the watermark, then acknowledges it
//!   to the population evaluator
//!
//! Population (statistical) panes are not evaluated here. They are reported
//! to the population evaluator, which sees every partition's share of a
//! window before deciding.
//!
//! When the queue closes (drain) or a cancel arrives, the worker processes
//! what is already queued, flushes final panes for every open window and exits.

use super::detector::Detector;
use super::dispatch::{evaluate_with_retry, AlertDispatch};
use super::metrics::PipelineMetrics;
use super::shutdown::ShutdownSignal;
use crate::abusewatch::criteria::{CriterionInput, EvaluationContext, FiredGuard, InputKind};
use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::event::SharedEvent;
use crate::abusewatch::window::{Pane, WindowManager};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Work routed to a partition
#[derive(Debug)]
pub enum PartitionMessage {
    Event {
        detector: usize,
        key: String,
        event: SharedEvent,
    },
    Watermark(i64),
}

/// Sent from partitions to the population evaluator
#[derive(Debug)]
pub enum PartitionReport {
    Population {
        detector: usize,
        pane: Pane,
    },
    WatermarkAck {
        partition: usize,
        watermark_ms: i64,
    },
}

/// Collaborators shared by every partition
#[derive(Clone)]
pub(crate) struct PartitionShared {
    pub detectors: Arc<Vec<Detector>>,
    pub ctx: EvaluationContext,
    pub dispatch: Arc<AlertDispatch>,
    pub metrics: Arc<PipelineMetrics>,
    pub reports: mpsc::UnboundedSender<PartitionReport>,
    pub max_state_retries: u32,
}

pub struct PartitionReceiver {
    partition_id: usize,
    shared: PartitionShared,
    /// Indexed by detector; `None` for event criteria
    windows: Vec<Option<WindowManager>>,
    fired: Vec<FiredGuard>,
    receiver: mpsc::Receiver<PartitionMessage>,
    shutdown: broadcast::Receiver<ShutdownSignal>,
}

impl PartitionReceiver {
    pub(crate) fn new(
        partition_id: usize,
        shared: PartitionShared,
        receiver: mpsc::Receiver<PartitionMessage>,
        shutdown: broadcast::Receiver<ShutdownSignal>,
    ) -> Self {
        let windows = shared
            .detectors
            .iter()
            .map(|d| {
                d.window().map(|window| {
                    WindowManager::from_config(window).with_pane_mode(d.criterion().pane_mode())
                })
            })
            .collect();
        let fired = shared.detectors.iter().map(|_| FiredGuard::new()).collect();
        debug!(
            "Partition {}: created with {} detectors",
            partition_id,
            shared.detectors.len()
        );
        Self {
            partition_id,
            shared,
            windows,
            fired,
            receiver,
            shutdown,
        }
    }

    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    /// Process messages until the queue closes, then flush
    pub async fn run(mut self) -> DetectionResult<()> {
        let mut listening = true;
        loop {
            let message = tokio::select! {
                message = self.receiver.recv() => message,
                signal = self.shutdown.recv(), if listening => {
                    listening = false;
                    match signal {
                        Ok(signal) => info!(
                            "Partition {}: {} received, flushing open windows",
                            self.partition_id, signal
                        ),
                        Err(broadcast::error::RecvError::Lagged(_)) => info!(
                            "Partition {}: shutdown received, flushing open windows",
                            self.partition_id
                        ),
                        Err(broadcast::error::RecvError::Closed) => continue,
                    }
                    self.receiver.close();
                    continue;
                }
            };
            match message {
                Some(message) => self.handle(message).await?,
                None => break,
            }
        }

        self.flush().await?;
        debug!("Partition {}: stopped", self.partition_id);
        Ok(())
    }

    async fn handle(&mut self, message: PartitionMessage) -> DetectionResult<()> {
        match message {
            PartitionMessage::Event {
                detector,
                key,
                event,
            } => self.handle_event(detector, key, event).await,
            PartitionMessage::Watermark(watermark_ms) => self.handle_watermark(watermark_ms).await,
        }
    }

    async fn handle_event(
        &mut self,
        detector: usize,
        key: String,
        event: SharedEvent,
    ) -> DetectionResult<()> {
        let detectors = Arc::clone(&self.shared.detectors);
        let Some(entry) = detectors.get(detector) else {
            return Err(DetectionError::config(format!(
                "partition {} received unknown detector {}",
                self.partition_id, detector
            )));
        };

        match self.windows.get_mut(detector).and_then(Option::as_mut) {
            Some(manager) => {
                let dropped_before = manager.late_dropped();
                let panes = manager.add(&key, event);
                let dropped = manager.late_dropped() - dropped_before;
                if dropped > 0 {
                    self.shared.metrics.record_late_dropped(dropped);
                }
                self.handle_panes(detector, entry, panes).await
            }
            None => {
                let alerts = evaluate_with_retry(
                    entry.criterion(),
                    CriterionInput::Event {
                        key: &key,
                        event: &event,
                    },
                    &self.shared.ctx,
                    self.shared.max_state_retries,
                    &self.shared.metrics,
                )
                .await?;
                self.shared.dispatch.dispatch(alerts).await
            }
        }
    }

    async fn handle_watermark(&mut self, watermark_ms: i64) -> DetectionResult<()> {
        let detectors = Arc::clone(&self.shared.detectors);
        for (index, entry) in detectors.iter().enumerate() {
            let Some(manager) = self.windows.get_mut(index).and_then(Option::as_mut) else {
                continue;
            };
            let advance = manager.advance_watermark(watermark_ms);
            for bounds in &advance.expired {
                self.fired[index].forget_window(*bounds);
            }
            self.handle_panes(index, entry, advance.panes).await?;
        }

        self.report(PartitionReport::WatermarkAck {
            partition: self.partition_id,
            watermark_ms,
        })
    }

    async fn handle_panes(
        &mut self,
        index: usize,
        detector: &Detector,
        panes: Vec<Pane>,
    ) -> DetectionResult<()> {
        if panes.is_empty() {
            return Ok(());
        }
        self.shared.metrics.record_panes(panes.len() as u64);

        let criterion = detector.criterion();
        for pane in panes {
            if criterion.input_kind() == InputKind::Population {
                self.report(PartitionReport::Population {
                    detector: index,
                    pane,
                })?;
                continue;
            }

            let once = criterion.fires_once_per_window();
            if once && self.fired[index].has_fired(pane.key(), pane.bounds()) {
                debug!(
                    "Partition {}: '{}' already fired for {} in {}",
                    self.partition_id,
                    detector.id(),
                    pane.key(),
                    pane.bounds()
                );
                continue;
            }

            for input in criterion.pane_inputs(&pane) {
                let alerts = evaluate_with_retry(
                    criterion,
                    input,
                    &self.shared.ctx,
                    self.shared.max_state_retries,
                    &self.shared.metrics,
                )
                .await?;
                if once && !alerts.is_empty() {
                    self.fired[index].mark(pane.key(), pane.bounds());
                }
                self.shared.dispatch.dispatch(alerts).await?;
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> DetectionResult<()> {
        let detectors = Arc::clone(&self.shared.detectors);
        for (index, entry) in detectors.iter().enumerate() {
            let Some(manager) = self.windows.get_mut(index).and_then(Option::as_mut) else {
                continue;
            };
            let panes = manager.flush();
            self.handle_panes(index, entry, panes).await?;
            self.fired[index] = FiredGuard::new();
        }
        Ok(())
    }

    fn report(&self, report: PartitionReport) -> DetectionResult<()> {
        self.shared.reports.send(report).map_err(|_| {
            DetectionError::closed(format!(
                "partition {}: population evaluator stopped",
                self.partition_id
            ))
        })
    }
}
