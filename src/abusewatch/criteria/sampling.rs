//! Alert evidence: bounded samples and shared-attribute extraction

use crate::abusewatch::alert::{meta, AlertSample};
use crate::abusewatch::event::{EventField, NormalizedEvent, SharedEvent};

/// Maximum number of events carried in an alert sample
pub const MAX_SAMPLE_SIZE: usize = 5;

/// First `MAX_SAMPLE_SIZE` events in original order
pub fn sample_events(events: &[SharedEvent]) -> AlertSample {
    AlertSample {
        events: events
            .iter()
            .take(MAX_SAMPLE_SIZE)
            .map(|e| NormalizedEvent::clone(e))
            .collect(),
        truncated: events.len() > MAX_SAMPLE_SIZE,
    }
}

/// Whether the sample shares one attribute value.
///
/// An empty sample is never unique and a single event always is. Otherwise
/// every value must be present and equal to the first; an absent first value
/// is never unique.
pub fn is_unique(sample: &[NormalizedEvent], field: EventField) -> bool {
    match sample {
        [] => false,
        [_] => true,
        [first, rest @ ..] => match first.field(field) {
            Some(value) => rest.iter().all(|e| e.field(field) == Some(value)),
            None => false,
        },
    }
}

/// The shared value, when the sample is unique on `field` and the value is present
pub fn unique_value(sample: &[NormalizedEvent], field: EventField) -> Option<&str> {
    if is_unique(sample, field) {
        sample.first().and_then(|e| e.field(field))
    } else {
        None
    }
}

/// Metadata for every attribute the whole sample shares, in fixed order.
///
/// City and country are only considered when the source address itself is
/// shared.
pub fn uniqueness_metadata(sample: &[NormalizedEvent]) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    let mut push = |key: &'static str, field: EventField| {
        if let Some(value) = unique_value(sample, field) {
            out.push((key, value.to_string()));
        }
    };

    push(meta::UNIQUE_ACTOR_ACCOUNTID, EventField::AccountId);
    push(meta::UNIQUE_SMS_RECIPIENT, EventField::SmsRecipient);
    push(meta::UNIQUE_EMAIL_RECIPIENT, EventField::EmailRecipient);
    if is_unique(sample, EventField::SourceAddress) {
        push(meta::UNIQUE_SOURCE_ADDRESS, EventField::SourceAddress);
        push(meta::UNIQUE_SOURCE_ADDRESS_CITY, EventField::City);
        push(meta::UNIQUE_SOURCE_ADDRESS_COUNTRY, EventField::Country);
    }
    push(meta::UNIQUE_OBJECT_ACCOUNTID, EventField::DestinationAccountId);
    out
}
