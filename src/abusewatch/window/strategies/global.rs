//! Global Window Strategy
//!
//! A single unbounded window per key. It is never closed by the watermark;
//! panes are produced every `early_fire_count` new elements and once more when
//! the pipeline drains.

use super::WindowStrategy;
use crate::abusewatch::window::types::WindowBounds;

#[derive(Debug, Clone)]
pub struct GlobalWindowStrategy {
    early_fire_count: usize,
}

impl GlobalWindowStrategy {
    pub fn new(early_fire_count: usize) -> Self {
        Self {
            early_fire_count: early_fire_count.max(1),
        }
    }
}

impl WindowStrategy for GlobalWindowStrategy {
    fn assign(&self, _event_time_ms: i64) -> WindowBounds {
        WindowBounds::global()
    }

    fn closes_on_watermark(&self) -> bool {
        false
    }

    fn early_fire_count(&self) -> Option<usize> {
        Some(self.early_fire_count)
    }

    fn name(&self) -> &'static str {
        "global"
    }
}
