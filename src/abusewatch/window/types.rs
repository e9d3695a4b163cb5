//! Window and pane value types
//!
//! Panes are immutable. A later pane for the same (key, window) is a superset of
//! every earlier one; nothing is ever edited in place.

use crate::abusewatch::event::SharedEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Half-open event-time interval `[start_ms, end_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl WindowBounds {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// The single unbounded window
    pub fn global() -> Self {
        Self {
            start_ms: i64::MIN,
            end_ms: i64::MAX,
        }
    }

    pub fn is_global(&self) -> bool {
        self.start_ms == i64::MIN && self.end_ms == i64::MAX
    }

    pub fn contains(&self, event_time_ms: i64) -> bool {
        event_time_ms >= self.start_ms && event_time_ms < self.end_ms
    }

    /// Last timestamp that still belongs to the window
    pub fn max_timestamp(&self) -> i64 {
        self.end_ms.saturating_sub(1)
    }

    /// `max_timestamp` rendered as RFC 3339 with millisecond precision
    pub fn max_timestamp_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.max_timestamp())
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "[global]")
        } else {
            write!(f, "[{}, {})", self.start_ms, self.end_ms)
        }
    }
}

/// Why a pane was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneTiming {
    /// Count-driven pane before the window closed
    Early,
    /// Watermark passed the window end
    OnTime,
    /// Element arrived after the window closed but within allowed lateness
    Late,
    /// Flushed on drain or cancel
    Final,
}

/// What a window keeps for a key once a pane has been cut
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneMode {
    /// Every pane carries all events seen for the key in the window
    #[default]
    Accumulating,
    /// Events are released once emitted; each pane carries only its new events
    Discarding,
}

/// One emitted aggregation result for a (key, window).
///
/// Panes from an accumulating window carry every event seen so far; panes from
/// a discarding window carry only the events added since the previous pane.
#[derive(Debug, Clone)]
pub struct Pane {
    key: String,
    bounds: WindowBounds,
    index: u64,
    timing: PaneTiming,
    events: Arc<[SharedEvent]>,
    /// Offset of the first event not present in the previous pane
    first_new: usize,
}

impl Pane {
    pub fn new(
        key: impl Into<String>,
        bounds: WindowBounds,
        index: u64,
        timing: PaneTiming,
        events: Arc<[SharedEvent]>,
        first_new: usize,
    ) -> Self {
        let first_new = first_new.min(events.len());
        Self {
            key: key.into(),
            bounds,
            index,
            timing,
            events,
            first_new,
        }
    }

    /// Build a standalone first pane, mostly useful for evaluating criteria directly
    pub fn single(
        key: impl Into<String>,
        bounds: WindowBounds,
        events: Vec<SharedEvent>,
    ) -> Self {
        Self::new(key, bounds, 0, PaneTiming::OnTime, events.into(), 0)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bounds(&self) -> WindowBounds {
        self.bounds
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timing(&self) -> PaneTiming {
        self.timing
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// Every event accumulated for this (key, window), in arrival order
    pub fn events(&self) -> &[SharedEvent] {
        &self.events
    }

    /// Events that were not part of the previous pane
    pub fn new_events(&self) -> &[SharedEvent] {
        &self.events[self.first_new..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::event::{ActionType, NormalizedEvent};

    #[test]
    fn test_bounds_max_timestamp_format() {
        let bounds = WindowBounds::new(0, 60_000);
        assert_eq!(bounds.max_timestamp(), 59_999);
        assert_eq!(bounds.max_timestamp_rfc3339(), "1970-01-01T00:00:59.999Z");
        assert!(bounds.contains(0));
        assert!(!bounds.contains(60_000));
    }

    #[test]
    fn test_global_bounds_display() {
        assert_eq!(WindowBounds::global().to_string(), "[global]");
        assert_eq!(WindowBounds::new(0, 10).to_string(), "[0, 10)");
    }

    #[test]
    fn test_pane_new_events() {
        let events: Vec<SharedEvent> = (0..4)
            .map(|i| Arc::new(NormalizedEvent::at_millis(ActionType::LoginFailure, i)))
            .collect();
        let pane = Pane::new(
            "k",
            WindowBounds::global(),
            1,
            PaneTiming::Early,
            events.into(),
            3,
        );
        assert_eq!(pane.count(), 4);
        assert_eq!(pane.new_events().len(), 1);
        assert_eq!(pane.new_events()[0].event_time_millis(), 3);
    }
}
