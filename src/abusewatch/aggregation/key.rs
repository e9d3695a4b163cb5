//! Window key derivation

use crate::abusewatch::event::{EventField, NormalizedEvent};
use serde::{Deserialize, Serialize};

/// Delimiter joining the parts of a composite key
pub const COMPOSITE_KEY_DELIMITER: &str = "+";

/// Derives the grouping key for an event.
///
/// In configuration a single field is written as a string and a composite
/// key as a list:
///
/// ```yaml
/// key: source_address
/// key: [source_address, account_id]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyExtractor {
    Field(EventField),
    Composite(Vec<EventField>),
}

impl KeyExtractor {
    pub fn field(field: EventField) -> Self {
        KeyExtractor::Field(field)
    }

    pub fn composite(fields: impl IntoIterator<Item = EventField>) -> Self {
        KeyExtractor::Composite(fields.into_iter().collect())
    }

    /// Key for the event, or `None` when any contributing field is absent or empty
    pub fn extract(&self, event: &NormalizedEvent) -> Option<String> {
        match self {
            KeyExtractor::Field(field) => non_empty(event.field(*field)).map(str::to_string),
            KeyExtractor::Composite(fields) => {
                if fields.is_empty() {
                    return None;
                }
                let parts = fields
                    .iter()
                    .map(|f| non_empty(event.field(*f)))
                    .collect::<Option<Vec<&str>>>()?;
                Some(parts.join(COMPOSITE_KEY_DELIMITER))
            }
        }
    }

    /// Human readable shape of the key, e.g. `source_address+account_id`
    pub fn describe(&self) -> String {
        match self {
            KeyExtractor::Field(field) => field.as_str().to_string(),
            KeyExtractor::Composite(fields) => fields
                .iter()
                .map(EventField::as_str)
                .collect::<Vec<_>>()
                .join(COMPOSITE_KEY_DELIMITER),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::event::ActionType;

    #[test]
    fn test_single_field_key() {
        let event = NormalizedEvent::at_millis(ActionType::LoginFailure, 0)
            .with_source_address("10.0.0.1");
        let key = KeyExtractor::field(EventField::SourceAddress);
        assert_eq!(key.extract(&event), Some("10.0.0.1".to_string()));
        assert_eq!(KeyExtractor::field(EventField::Uid).extract(&event), None);
    }

    #[test]
    fn test_composite_key() {
        let event = NormalizedEvent::at_millis(ActionType::LoginFailure, 0)
            .with_source_address("10.0.0.1")
            .with_account_id("kirk@mozilla.com");
        let key = KeyExtractor::composite([EventField::SourceAddress, EventField::AccountId]);
        assert_eq!(
            key.extract(&event),
            Some("10.0.0.1+kirk@mozilla.com".to_string())
        );
        assert_eq!(key.describe(), "source_address+account_id");

        let partial = NormalizedEvent::at_millis(ActionType::LoginFailure, 0)
            .with_source_address("10.0.0.1")
            .with_account_id("");
        assert_eq!(key.extract(&partial), None);
    }

    #[test]
    fn test_key_yaml_shapes() {
        let single: KeyExtractor = serde_yaml::from_str("source_address").unwrap();
        assert_eq!(single, KeyExtractor::Field(EventField::SourceAddress));

        let composite: KeyExtractor = serde_yaml::from_str("[uid, city]").unwrap();
        assert_eq!(
            composite,
            KeyExtractor::Composite(vec![EventField::Uid, EventField::City])
        );
    }
}
