//! Population view of one window across all keys
//!
//! Panes for a window arrive from every partition; since each key lives in
//! exactly one partition, merging is a union keyed by the window key.

use crate::abusewatch::event::SharedEvent;
use crate::abusewatch::window::{Pane, WindowBounds};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct WindowAggregate {
    bounds: WindowBounds,
    panes: BTreeMap<String, Pane>,
}

impl WindowAggregate {
    pub fn new(bounds: WindowBounds) -> Self {
        Self {
            bounds,
            panes: BTreeMap::new(),
        }
    }

    pub fn from_panes(bounds: WindowBounds, panes: impl IntoIterator<Item = Pane>) -> Self {
        let mut aggregate = Self::new(bounds);
        for pane in panes {
            aggregate.merge(pane);
        }
        aggregate
    }

    /// Merge a pane, keeping the most complete pane seen for its key
    pub fn merge(&mut self, pane: Pane) {
        if pane.bounds() != self.bounds {
            return;
        }
        match self.panes.get(pane.key()) {
            Some(existing) if existing.count() >= pane.count() => {}
            _ => {
                self.panes.insert(pane.key().to_string(), pane);
            }
        }
    }

    pub fn bounds(&self) -> WindowBounds {
        self.bounds
    }

    pub fn key_count(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn count(&self, key: &str) -> usize {
        self.panes.get(key).map(Pane::count).unwrap_or(0)
    }

    /// (key, count) pairs in key order
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.panes.iter().map(|(k, p)| (k.as_str(), p.count()))
    }

    pub fn panes(&self) -> impl Iterator<Item = &Pane> {
        self.panes.values()
    }

    /// Every event in the window regardless of key
    pub fn events(&self) -> impl Iterator<Item = &SharedEvent> {
        self.panes.values().flat_map(|p| p.events().iter())
    }
}
