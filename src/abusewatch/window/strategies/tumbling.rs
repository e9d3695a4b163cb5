//! Tumbling Window Strategy
//!
//! Non-overlapping fixed-size windows that advance by their full size.
//!
//! Example: 10-minute tumbling windows
//! ```text
//! [00:00-10:00) [10:00-20:00) [20:00-30:00)
//! ```

use super::WindowStrategy;
use crate::abusewatch::window::types::WindowBounds;

/// Fixed-size, epoch-aligned windows
#[derive(Debug, Clone)]
pub struct TumblingWindowStrategy {
    /// Window size in milliseconds
    window_size_ms: i64,

    /// Lateness tolerated after the watermark passes the window end
    allowed_lateness_ms: i64,
}

impl TumblingWindowStrategy {
    /// # Example
    /// ```rust,ignore
    /// let strategy = TumblingWindowStrategy::new(600_000, 0);
    /// ```
    pub fn new(window_size_ms: i64, allowed_lateness_ms: i64) -> Self {
        Self {
            window_size_ms: window_size_ms.max(1),
            allowed_lateness_ms: allowed_lateness_ms.max(0),
        }
    }

    pub fn window_size_ms(&self) -> i64 {
        self.window_size_ms
    }
}

impl WindowStrategy for TumblingWindowStrategy {
    fn assign(&self, event_time_ms: i64) -> WindowBounds {
        // Align to window boundaries; div_euclid keeps pre-epoch times aligned too
        let window_index = event_time_ms.div_euclid(self.window_size_ms);
        let start = window_index.saturating_mul(self.window_size_ms);
        WindowBounds::new(start, start.saturating_add(self.window_size_ms))
    }

    fn closes_on_watermark(&self) -> bool {
        true
    }

    fn allowed_lateness_ms(&self) -> i64 {
        self.allowed_lateness_ms
    }

    fn name(&self) -> &'static str {
        "tumbling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tumbling_window_alignment() {
        let strategy = TumblingWindowStrategy::new(60_000, 0);
        assert_eq!(strategy.assign(0), WindowBounds::new(0, 60_000));
        assert_eq!(strategy.assign(59_999), WindowBounds::new(0, 60_000));
        assert_eq!(strategy.assign(60_000), WindowBounds::new(60_000, 120_000));
    }

    #[test]
    fn test_tumbling_window_negative_time() {
        let strategy = TumblingWindowStrategy::new(1_000, 0);
        assert_eq!(strategy.assign(-1), WindowBounds::new(-1_000, 0));
    }

    #[test]
    fn test_tumbling_window_properties() {
        let strategy = TumblingWindowStrategy::new(600_000, 5_000);
        assert!(strategy.closes_on_watermark());
        assert_eq!(strategy.allowed_lateness_ms(), 5_000);
        assert_eq!(strategy.early_fire_count(), None);
        assert_eq!(strategy.window_size_ms(), 600_000);
    }
}
