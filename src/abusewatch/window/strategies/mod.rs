//! Window assignment strategies

pub mod global;
pub mod tumbling;

pub use global::GlobalWindowStrategy;
pub use tumbling::TumblingWindowStrategy;

use super::types::WindowBounds;

/// Strategy trait for assigning events to windows.
///
/// Implementations:
/// - TumblingWindowStrategy: fixed-size windows closed by the watermark
/// - GlobalWindowStrategy: one unbounded window with count-driven early panes
pub trait WindowStrategy: Send + Sync {
    /// Window an event with the given event time belongs to
    fn assign(&self, event_time_ms: i64) -> WindowBounds;

    /// Whether watermark progress closes windows of this strategy
    fn closes_on_watermark(&self) -> bool;

    /// How long after close a window still accepts late events
    fn allowed_lateness_ms(&self) -> i64 {
        0
    }

    /// Number of new elements since the last pane that triggers an early pane
    fn early_fire_count(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str;
}
