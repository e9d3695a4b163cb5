//! Per-detector escalation toggles, resolved once at start-up

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which detector tags are escalated to the notification sink.
///
/// ```yaml
/// escalation:
///   default_enabled: false
///   categories:
///     velocity: true
///     source_login_failure: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default = "default_enabled")]
    pub default_enabled: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
}

fn default_enabled() -> bool {
    true
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            default_enabled: true,
            categories: BTreeMap::new(),
        }
    }
}

impl EscalationPolicy {
    /// Escalate nothing unless explicitly enabled
    pub fn deny_by_default() -> Self {
        Self {
            default_enabled: false,
            categories: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>, enabled: bool) -> Self {
        self.categories.insert(category.into(), enabled);
        self
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.categories
            .get(category)
            .copied()
            .unwrap_or(self.default_enabled)
    }
}
