//! Partitioned pipeline execution
//!
//! ## Components
//!
//! - `PipelineCoordinator`: routes events, drives watermarks, drains
//! - `HashRouter`: key to partition assignment
//! - `PartitionReceiver`: per-partition window state and criterion evaluation
//! - `Detector`: a compiled detector configuration
//! - `PipelineMetrics`: shared counters
//! - `ShutdownCoordinator`: pipeline-wide cancel

pub mod coordinator;
pub mod detector;
mod dispatch;
pub mod metrics;
pub mod partition;
mod population;
pub mod router;
pub mod shutdown;

pub use coordinator::PipelineCoordinator;
pub use detector::Detector;
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use partition::PartitionReceiver;
pub use router::HashRouter;
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

use crate::abusewatch::alert::AlertSink;
use crate::abusewatch::lists::FlaggedAccounts;
use crate::abusewatch::side_input::{NatSnapshot, SideInput};
use crate::abusewatch::state::{InMemoryStateStore, StateStore};
use std::sync::Arc;

/// External collaborators a pipeline runs against
pub struct PipelineResources {
    pub state: Arc<dyn StateStore>,
    /// Receive every alert
    pub sinks: Vec<Arc<dyn AlertSink>>,
    /// Receive alerts of detectors enabled for escalation
    pub notification_sinks: Vec<Arc<dyn AlertSink>>,
    /// Shared NAT snapshot; when absent, statistical detectors with NAT
    /// detection derive one from each window
    pub nat: Option<SideInput<NatSnapshot>>,
    pub flagged: FlaggedAccounts,
    pub shutdown: ShutdownCoordinator,
}

impl PipelineResources {
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self {
            state,
            sinks: Vec::new(),
            notification_sinks: Vec::new(),
            nat: None,
            flagged: FlaggedAccounts::new(),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStateStore::new()))
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.notification_sinks.push(sink);
        self
    }

    pub fn with_nat_side_input(mut self, nat: SideInput<NatSnapshot>) -> Self {
        self.nat = Some(nat);
        self
    }

    pub fn with_flagged_accounts(mut self, flagged: FlaggedAccounts) -> Self {
        self.flagged = flagged;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }
}
