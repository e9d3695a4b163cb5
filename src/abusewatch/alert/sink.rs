//! Alert sinks
//!
//! The core performs no network I/O; sinks hand alerts to whatever formatting or
//! notification layer the embedding application provides.

use super::escalation::EscalationPolicy;
use super::record::Alert;
use crate::abusewatch::error::{DetectionError, DetectionResult};
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Destination for emitted alerts
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn emit(&self, alert: Alert) -> DetectionResult<()>;

    /// Called once when the pipeline drains
    async fn close(&self) -> DetectionResult<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Keeps every alert in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the alerts collected so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn alerts_for(&self, subcategory: &str) -> Vec<Alert> {
        self.alerts()
            .into_iter()
            .filter(|a| a.subcategory == subcategory)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertSink for CollectingSink {
    async fn emit(&self, alert: Alert) -> DetectionResult<()> {
        let mut alerts = self
            .alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        alerts.push(alert);
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

/// Forwards alerts into a bounded tokio channel
pub struct ChannelSink {
    sender: mpsc::Sender<Alert>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Alert>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    async fn emit(&self, alert: Alert) -> DetectionResult<()> {
        self.sender
            .send(alert)
            .await
            .map_err(|_| DetectionError::closed("alert channel receiver dropped"))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Forwards only alerts whose detector is enabled for escalation
pub struct EscalatingSink {
    policy: EscalationPolicy,
    inner: Arc<dyn AlertSink>,
    suppressed: AtomicU64,
}

impl EscalatingSink {
    pub fn new(policy: EscalationPolicy, inner: Arc<dyn AlertSink>) -> Self {
        Self {
            policy,
            inner,
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AlertSink for EscalatingSink {
    async fn emit(&self, alert: Alert) -> DetectionResult<()> {
        if self.policy.is_enabled(&alert.subcategory) {
            return self.inner.emit(alert).await;
        }
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Escalation disabled for '{}', not forwarding alert {}",
            alert.subcategory, alert.id
        );
        Ok(())
    }

    async fn close(&self) -> DetectionResult<()> {
        self.inner.close().await
    }

    fn name(&self) -> &str {
        "escalating"
    }
}
