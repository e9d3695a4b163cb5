//! # abusewatch
//!
//! Windowed, keyed abuse detection over a stream of normalized security events.
//!
//! Events are grouped by a detector-specific key over event-time windows, counted,
//! and handed to one of five criterion families which decide whether the group
//! constitutes abuse:
//!
//! - **Threshold**: a key's count in a window meets an absolute limit
//! - **Statistical threshold**: a key's count strictly exceeds a multiple of the
//!   window's population mean
//! - **Velocity**: consecutive events for one identity are geographically implausible
//! - **Distributed correlation**: one identity acts through many distinct secondary values
//! - **Integrity comparators**: point-wise checks against persisted state or static lists
//!
//! A per-window summary detector reports action counts for each closed window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use abusewatch::{
//!     CollectingSink, DetectorConfig, NormalizedEvent, PipelineConfig, PipelineCoordinator,
//!     PipelineResources,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new("test")
//!     .with_detector(DetectorConfig::source_login_failure(10, 600));
//!
//! let sink = Arc::new(CollectingSink::new());
//! let resources = PipelineResources::in_memory().with_sink(sink.clone());
//! let mut pipeline = PipelineCoordinator::start(config, resources).await?;
//!
//! pipeline.submit(NormalizedEvent::at_millis("loginFailure", 0).with_source_address("10.0.0.1")).await?;
//! let metrics = pipeline.drain().await?;
//! println!("alerts: {} ({:?})", sink.alerts().len(), metrics);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::derivable_impls)]
#![allow(clippy::collapsible_if)]

pub mod abusewatch;

// Re-export main API at crate root for easy access
pub use abusewatch::{
    aggregation::{KeyExtractor, KeyedCounter, WindowAggregate},
    alert::{
        Alert, AlertBuilder, AlertSample, AlertSink, ChannelSink, CollectingSink, EscalatingSink,
        EscalationPolicy, Severity,
    },
    config::{DetectorConfig, PipelineConfig, WindowConfig},
    criteria::{
        Criterion, DistributedCorrelationCriterion, IntegrityComparator,
        StatisticalThresholdCriterion, SummaryCriterion, ThresholdCriterion, VelocityCriterion,
    },
    error::{DetectionError, DetectionResult},
    event::{ActionType, EventField, GeoPoint, NormalizedEvent},
    init_logging,
    lists::{FlaggedAccounts, StaticList},
    pipeline::{
        PipelineCoordinator, PipelineMetrics, PipelineMetricsSnapshot, PipelineResources,
        ShutdownCoordinator,
    },
    side_input::{NatDetector, NatSnapshot, SideInput},
    state::{InMemoryStateStore, StateStore},
    window::{Pane, PaneTiming, WatermarkManager, WindowBounds, WindowManager},
};
