//! Per-window, per-key event accumulation
//!
//! The counter keeps the full contributing-event list for every (window, key)
//! slot together with the bookkeeping needed to cut accumulating panes:
//! the next pane index and how many events the last pane already carried.
//! In discarding mode a slot hands its events over to the pane it cuts and
//! keeps only the pane index, so an unbounded global window stays bounded
//! by the early-fire count.

use crate::abusewatch::event::SharedEvent;
use crate::abusewatch::window::{Pane, PaneMode, PaneTiming, WindowBounds};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct KeySlot {
    events: Vec<SharedEvent>,
    next_pane_index: u64,
    emitted_len: usize,
}

impl KeySlot {
    fn pending(&self) -> usize {
        self.events.len() - self.emitted_len
    }

    fn cut_pane(
        &mut self,
        key: &str,
        bounds: WindowBounds,
        timing: PaneTiming,
        mode: PaneMode,
    ) -> Pane {
        let index = self.next_pane_index;
        self.next_pane_index += 1;
        match mode {
            PaneMode::Accumulating => {
                let pane = Pane::new(
                    key,
                    bounds,
                    index,
                    timing,
                    self.events.as_slice().into(),
                    self.emitted_len,
                );
                self.emitted_len = self.events.len();
                pane
            }
            PaneMode::Discarding => {
                let events = std::mem::take(&mut self.events);
                self.emitted_len = 0;
                Pane::new(key, bounds, index, timing, events.into(), 0)
            }
        }
    }
}

/// Running count and event list per key within each open window
#[derive(Debug, Default)]
pub struct KeyedCounter {
    windows: BTreeMap<WindowBounds, BTreeMap<String, KeySlot>>,
    mode: PaneMode,
}

impl KeyedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: PaneMode) -> Self {
        Self {
            windows: BTreeMap::new(),
            mode,
        }
    }

    pub fn mode(&self) -> PaneMode {
        self.mode
    }

    /// Append an event to a (window, key) slot.
    ///
    /// Returns the number of events added since the slot's last pane
    pub fn add(&mut self, bounds: WindowBounds, key: &str, event: SharedEvent) -> usize {
        let slot = self
            .windows
            .entry(bounds)
            .or_default()
            .entry(key.to_string())
            .or_default();
        slot.events.push(event);
        slot.pending()
    }

    pub fn count(&self, bounds: WindowBounds, key: &str) -> usize {
        self.slot(bounds, key).map(|s| s.events.len()).unwrap_or(0)
    }

    pub fn pending(&self, bounds: WindowBounds, key: &str) -> usize {
        self.slot(bounds, key).map(KeySlot::pending).unwrap_or(0)
    }

    /// Events currently held across every slot
    pub fn buffered_events(&self) -> usize {
        self.windows
            .values()
            .flat_map(BTreeMap::values)
            .map(|slot| slot.events.len())
            .sum()
    }

    /// Cut the next pane for one (window, key) slot
    pub fn emit(&mut self, bounds: WindowBounds, key: &str, timing: PaneTiming) -> Option<Pane> {
        let mode = self.mode;
        self.windows
            .get_mut(&bounds)
            .and_then(|keys| keys.get_mut(key))
            .map(|slot| slot.cut_pane(key, bounds, timing, mode))
    }

    /// Cut a pane for every key in a window
    pub fn emit_window(&mut self, bounds: WindowBounds, timing: PaneTiming) -> Vec<Pane> {
        let mode = self.mode;
        match self.windows.get_mut(&bounds) {
            Some(keys) => keys
                .iter_mut()
                .map(|(key, slot)| slot.cut_pane(key, bounds, timing, mode))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cut a pane for every slot that has not yet been emitted or has grown since
    pub fn emit_pending(&mut self, timing: PaneTiming) -> Vec<Pane> {
        let mode = self.mode;
        let mut panes = Vec::new();
        for (bounds, keys) in self.windows.iter_mut() {
            for (key, slot) in keys.iter_mut() {
                if slot.pending() > 0 || slot.next_pane_index == 0 {
                    panes.push(slot.cut_pane(key, *bounds, timing, mode));
                }
            }
        }
        panes
    }

    /// Windows currently holding at least one key, in start order
    pub fn windows(&self) -> Vec<WindowBounds> {
        self.windows.keys().copied().collect()
    }

    /// Drop a window and all of its key slots
    pub fn remove_window(&mut self, bounds: WindowBounds) -> bool {
        self.windows.remove(&bounds).is_some()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn key_count(&self, bounds: WindowBounds) -> usize {
        self.windows.get(&bounds).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every slot. The pane mode is kept.
    pub fn clear(&mut self) {
        self.windows.clear();
    }

    fn slot(&self, bounds: WindowBounds, key: &str) -> Option<&KeySlot> {
        self.windows.get(&bounds).and_then(|keys| keys.get(key))
    }
}
