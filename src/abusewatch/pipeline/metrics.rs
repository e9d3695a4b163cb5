//! Pipeline-wide counters
//!
//! Shared by the coordinator and every partition worker; all updates are
//! relaxed atomic increments.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    events_received: AtomicU64,
    events_ignored: AtomicU64,
    messages_routed: AtomicU64,
    late_dropped: AtomicU64,
    panes_emitted: AtomicU64,
    windows_evaluated: AtomicU64,
    alerts_emitted: AtomicU64,
    state_retries: AtomicU64,
    evaluation_errors: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// No detector selected the event
    pub fn record_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_routed(&self, count: u64) {
        self.messages_routed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_late_dropped(&self, count: u64) {
        self.late_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_panes(&self, count: u64) {
        self.panes_emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// A population window was evaluated by a statistical detector
    pub fn record_window_evaluated(&self) {
        self.windows_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alerts(&self, count: u64) {
        self.alerts_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_state_retry(&self) {
        self.state_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_error(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted.load(Ordering::Relaxed)
    }

    /// Point-in-time copy; `alerts_suppressed` is supplied by the escalation layer
    pub fn snapshot(&self, alerts_suppressed: u64) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            late_dropped: self.late_dropped.load(Ordering::Relaxed),
            panes_emitted: self.panes_emitted.load(Ordering::Relaxed),
            windows_evaluated: self.windows_evaluated.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_suppressed,
            state_retries: self.state_retries.load(Ordering::Relaxed),
            evaluation_errors: self.evaluation_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub events_received: u64,
    pub events_ignored: u64,
    /// Keyed messages delivered to partitions; one event may fan out to several detectors
    pub messages_routed: u64,
    pub late_dropped: u64,
    pub panes_emitted: u64,
    pub windows_evaluated: u64,
    /// Alerts produced by criteria, including those escalation later suppressed
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub state_retries: u64,
    pub evaluation_errors: u64,
}

impl PipelineMetricsSnapshot {
    /// Alerts escalated to the notification sinks
    pub fn alerts_delivered(&self) -> u64 {
        self.alerts_emitted.saturating_sub(self.alerts_suppressed)
    }
}
