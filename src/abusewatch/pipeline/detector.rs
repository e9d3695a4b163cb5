//! Runnable detector: selection, keying, windowing and one criterion

use crate::abusewatch::aggregation::KeyExtractor;
use crate::abusewatch::config::WindowConfig;
use crate::abusewatch::criteria::{Criterion, InputKind};
use crate::abusewatch::event::{ActionType, NormalizedEvent};
use crate::abusewatch::side_input::NatDetector;

pub struct Detector {
    id: String,
    key: KeyExtractor,
    /// Empty accepts every action
    actions: Vec<ActionType>,
    window: Option<WindowConfig>,
    nat: Option<NatDetector>,
    criterion: Criterion,
}

impl Detector {
    pub fn new(id: impl Into<String>, key: KeyExtractor, criterion: Criterion) -> Self {
        Self {
            id: id.into(),
            key,
            actions: Vec::new(),
            window: None,
            nat: None,
            criterion,
        }
    }

    pub fn with_actions(mut self, actions: Vec<ActionType>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_nat_detector(mut self, nat: NatDetector) -> Self {
        self.nat = Some(nat);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &KeyExtractor {
        &self.key
    }

    /// Window for aggregate criteria; event criteria have none
    pub fn window(&self) -> Option<&WindowConfig> {
        match self.criterion.input_kind() {
            InputKind::Event => None,
            _ => self.window.as_ref(),
        }
    }

    pub fn nat_detector(&self) -> Option<&NatDetector> {
        self.nat.as_ref()
    }

    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    /// Key for an event this detector consumes, `None` if it is not selected
    /// or lacks a key field
    pub fn accepts(&self, event: &NormalizedEvent) -> Option<String> {
        if !self.actions.is_empty() && !self.actions.contains(&event.action) {
            return None;
        }
        self.key.extract(event)
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("id", &self.id)
            .field("key", &self.key.describe())
            .field("actions", &self.actions)
            .field("window", &self.window)
            .field("input", &self.criterion.input_kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::abusewatch::config::DetectorConfig;
    use crate::abusewatch::event::{ActionType, NormalizedEvent};

    #[test]
    fn test_accepts_selected_actions_with_key() {
        let detector = DetectorConfig::source_login_failure(10, 600).build().unwrap();

        let failure =
            NormalizedEvent::at_millis(ActionType::LoginFailure, 0).with_source_address("10.0.0.1");
        assert_eq!(detector.accepts(&failure).as_deref(), Some("10.0.0.1"));

        let success =
            NormalizedEvent::at_millis(ActionType::LoginSuccess, 0).with_source_address("10.0.0.1");
        assert_eq!(detector.accepts(&success), None);

        let keyless = NormalizedEvent::at_millis(ActionType::LoginFailure, 0);
        assert_eq!(detector.accepts(&keyless), None);
    }

    #[test]
    fn test_event_criteria_have_no_window() {
        let detector = DetectorConfig::relay_forward().build().unwrap();
        assert!(detector.window().is_none());
        assert_eq!(detector.id(), "private_relay_forward");

        let windowed = DetectorConfig::password_reset_abuse(5, 600).build().unwrap();
        assert!(windowed.window().is_some());
    }
}
