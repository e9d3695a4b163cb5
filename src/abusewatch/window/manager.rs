//! Window Manager
//!
//! Assigns keyed events to windows and decides when panes are cut.
//!
//! ## Pane triggers
//!
//! - **Early**: a global window accumulated `early_fire_count` new elements
//! - **OnTime**: the watermark passed a fixed window's end
//! - **Late**: an element landed in a closed window still within allowed lateness
//! - **Final**: drain or cancel flushed whatever was not yet emitted
//!
//! Elements for a window whose max timestamp plus allowed lateness is already
//! behind the watermark are dropped and counted.

use crate::abusewatch::aggregation::KeyedCounter;
use crate::abusewatch::config::WindowConfig;
use crate::abusewatch::event::SharedEvent;
use crate::abusewatch::window::strategies::{
    GlobalWindowStrategy, TumblingWindowStrategy, WindowStrategy,
};
use crate::abusewatch::window::types::{Pane, PaneMode, PaneTiming, WindowBounds};
use log::debug;
use std::collections::BTreeSet;

/// Result of moving the watermark forward
#[derive(Debug, Default)]
pub struct WindowAdvance {
    /// On-time panes for windows the watermark just closed
    pub panes: Vec<Pane>,
    /// Windows past allowed lateness whose state was released
    pub expired: Vec<WindowBounds>,
}

pub struct WindowManager {
    strategy: Box<dyn WindowStrategy>,
    counter: KeyedCounter,
    /// Windows that already produced their on-time panes
    closed: BTreeSet<WindowBounds>,
    watermark: Option<i64>,
    late_dropped: u64,
}

impl WindowManager {
    pub fn new(strategy: Box<dyn WindowStrategy>) -> Self {
        Self {
            strategy,
            counter: KeyedCounter::new(),
            closed: BTreeSet::new(),
            watermark: None,
            late_dropped: 0,
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        let strategy: Box<dyn WindowStrategy> = match config {
            WindowConfig::Fixed {
                size_secs,
                allowed_lateness_secs,
            } => Box::new(TumblingWindowStrategy::new(
                secs_to_millis(*size_secs),
                secs_to_millis(*allowed_lateness_secs),
            )),
            WindowConfig::Global { early_fire_count } => {
                Box::new(GlobalWindowStrategy::new(*early_fire_count))
            }
        };
        Self::new(strategy)
    }

    /// Switch how slots keep events after a pane. Any buffered state is dropped.
    pub fn with_pane_mode(mut self, mode: PaneMode) -> Self {
        self.counter = KeyedCounter::with_mode(mode);
        self
    }

    pub fn pane_mode(&self) -> PaneMode {
        self.counter.mode()
    }

    /// Add a keyed event. Returns the panes it triggered (at most one).
    pub fn add(&mut self, key: &str, event: SharedEvent) -> Vec<Pane> {
        let event_time = event.event_time_millis();
        let bounds = self.strategy.assign(event_time);

        let past_end = self.strategy.closes_on_watermark()
            && self.watermark.is_some_and(|wm| wm >= bounds.end_ms);

        if past_end && self.is_expired(bounds) {
            self.late_dropped += 1;
            debug!(
                "Dropping late event at {} for key '{}' in closed window {}",
                event_time, key, bounds
            );
            return Vec::new();
        }

        let pending = self.counter.add(bounds, key, event);

        if past_end {
            let timing = if self.closed.insert(bounds) {
                PaneTiming::OnTime
            } else {
                PaneTiming::Late
            };
            return self.counter.emit(bounds, key, timing).into_iter().collect();
        }

        match self.strategy.early_fire_count() {
            Some(n) if pending >= n => self
                .counter
                .emit(bounds, key, PaneTiming::Early)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Move the watermark forward, closing and expiring windows behind it.
    /// A watermark at or behind the current one is ignored.
    pub fn advance_watermark(&mut self, watermark_ms: i64) -> WindowAdvance {
        if self.watermark.is_some_and(|wm| watermark_ms <= wm) {
            return WindowAdvance::default();
        }
        self.watermark = Some(watermark_ms);

        let mut advance = WindowAdvance::default();
        if !self.strategy.closes_on_watermark() {
            return advance;
        }

        for bounds in self.counter.windows() {
            if bounds.end_ms <= watermark_ms && self.closed.insert(bounds) {
                advance
                    .panes
                    .extend(self.counter.emit_window(bounds, PaneTiming::OnTime));
            }
            if self.is_expired(bounds) {
                self.counter.remove_window(bounds);
                self.closed.remove(&bounds);
                advance.expired.push(bounds);
            }
        }
        // Windows closed while empty of state
        let expired: Vec<WindowBounds> = self
            .closed
            .iter()
            .copied()
            .filter(|b| self.is_expired(*b))
            .collect();
        for bounds in expired {
            self.closed.remove(&bounds);
        }
        advance
    }

    /// Flush a final pane for every slot with unemitted state and reset.
    pub fn flush(&mut self) -> Vec<Pane> {
        let panes = self.counter.emit_pending(PaneTiming::Final);
        self.counter.clear();
        self.closed.clear();
        panes
    }

    pub fn late_dropped(&self) -> u64 {
        self.late_dropped
    }

    pub fn open_windows(&self) -> usize {
        self.counter.window_count()
    }

    /// Events held for panes not yet cut (accumulating windows also hold emitted ones)
    pub fn buffered_events(&self) -> usize {
        self.counter.buffered_events()
    }

    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn is_expired(&self, bounds: WindowBounds) -> bool {
        match self.watermark {
            Some(wm) if self.strategy.closes_on_watermark() => {
                bounds
                    .max_timestamp()
                    .saturating_add(self.strategy.allowed_lateness_ms())
                    < wm
            }
            _ => false,
        }
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
}
