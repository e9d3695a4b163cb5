//! Watermark tracking for event-time window closing
//!
//! The coordinator holds one manager driven by observed event times and
//! broadcasts each advance to the partitions.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Configuration for watermark management
#[derive(Debug, Clone)]
pub struct WatermarkConfig {
    /// How far event time may run ahead of the watermark
    pub max_out_of_orderness: Duration,

    /// Minimum step before an event-driven advance is reported
    pub min_advance: Duration,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            max_out_of_orderness: Duration::from_secs(0),
            min_advance: Duration::from_secs(1),
        }
    }
}

/// Event-time watermark driven by observed events
///
/// The watermark only ever moves forward. `-1` in the atomic means no
/// watermark has been established yet.
pub struct WatermarkManager {
    /// Current watermark (milliseconds since epoch), -1 when unset
    current_watermark: AtomicI64,

    /// Highest event time observed
    max_event_time: AtomicI64,

    config: WatermarkConfig,
}

impl WatermarkManager {
    pub fn new(config: WatermarkConfig) -> Self {
        Self {
            current_watermark: AtomicI64::new(-1),
            max_event_time: AtomicI64::new(-1),
            config,
        }
    }

    /// Observe an event time and advance the watermark to
    /// `max_event_time - max_out_of_orderness` if that moves it by at least
    /// `min_advance`.
    ///
    /// Returns the new watermark when it was advanced
    pub fn observe(&self, event_time: DateTime<Utc>) -> Option<i64> {
        let event_time_millis = event_time.timestamp_millis();
        let max_seen = self
            .max_event_time
            .fetch_max(event_time_millis, Ordering::Relaxed)
            .max(event_time_millis);

        let lag = self.config.max_out_of_orderness.as_millis() as i64;
        let candidate = max_seen.saturating_sub(lag);
        let current = self.current_watermark.load(Ordering::Relaxed);

        if current == -1 {
            self.current_watermark.store(candidate, Ordering::Relaxed);
            return Some(candidate);
        }

        let min_advance = self.config.min_advance.as_millis() as i64;
        if candidate >= current.saturating_add(min_advance.max(1)) {
            self.current_watermark.store(candidate, Ordering::Relaxed);
            return Some(candidate);
        }
        None
    }

    /// Current watermark in milliseconds, `None` before the first advance
    pub fn current_millis(&self) -> Option<i64> {
        match self.current_watermark.load(Ordering::Relaxed) {
            -1 => None,
            wm => Some(wm),
        }
    }

    pub fn current_watermark(&self) -> Option<DateTime<Utc>> {
        self.current_millis()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Force the watermark forward. Earlier values are ignored.
    ///
    /// Returns true if the watermark moved
    pub fn advance_to(&self, watermark_millis: i64) -> bool {
        let previous = self
            .current_watermark
            .fetch_max(watermark_millis, Ordering::Relaxed);
        previous < watermark_millis
    }
}

impl Default for WatermarkManager {
    fn default() -> Self {
        Self::new(WatermarkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn test_watermark_starts_unset() {
        let wm = WatermarkManager::default();
        assert!(wm.current_watermark().is_none());
        assert_eq!(wm.observe(at(1_000)), Some(1_000));
        assert_eq!(wm.current_watermark(), Some(at(1_000)));
    }

    #[test]
    fn test_observe_applies_out_of_orderness() {
        let config = WatermarkConfig {
            max_out_of_orderness: Duration::from_secs(10),
            min_advance: Duration::from_millis(100),
        };
        let wm = WatermarkManager::new(config);

        assert_eq!(wm.observe(at(60_000)), Some(50_000));
        // Within min_advance
        assert_eq!(wm.observe(at(60_050)), None);
        // Out of order event never moves the watermark back
        assert_eq!(wm.observe(at(20_000)), None);
        assert_eq!(wm.current_millis(), Some(50_000));
        assert_eq!(wm.observe(at(61_000)), Some(51_000));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let wm = WatermarkManager::default();
        assert!(wm.advance_to(5_000));
        assert!(!wm.advance_to(1_000));
        assert!(!wm.advance_to(5_000));
        assert_eq!(wm.current_millis(), Some(5_000));
    }
}
