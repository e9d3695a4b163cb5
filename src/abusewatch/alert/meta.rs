//! Metadata keys attached to alerts

use crate::abusewatch::event::EventField;

pub const DETECTOR: &str = "detector";
pub const KEY: &str = "key";
pub const COUNT: &str = "count";
pub const THRESHOLD: &str = "threshold";

pub const SOURCEADDRESS: &str = "sourceaddress";
pub const SOURCEADDRESS_CITY: &str = "sourceaddress_city";
pub const SOURCEADDRESS_COUNTRY: &str = "sourceaddress_country";
pub const SOURCEADDRESS_PREVIOUS: &str = "sourceaddress_previous";
pub const SOURCEADDRESS_PREVIOUS_CITY: &str = "sourceaddress_previous_city";
pub const SOURCEADDRESS_PREVIOUS_COUNTRY: &str = "sourceaddress_previous_country";
pub const EMAIL: &str = "email";
pub const UID: &str = "uid";
pub const ACTION: &str = "action";

pub const UNIQUE_ACTOR_ACCOUNTID: &str = "unique_actor_accountid";
pub const UNIQUE_SMS_RECIPIENT: &str = "unique_sms_recipient";
pub const UNIQUE_EMAIL_RECIPIENT: &str = "unique_email_recipient";
pub const UNIQUE_SOURCE_ADDRESS: &str = "unique_source_address";
pub const UNIQUE_SOURCE_ADDRESS_CITY: &str = "unique_source_address_city";
pub const UNIQUE_SOURCE_ADDRESS_COUNTRY: &str = "unique_source_address_country";
pub const UNIQUE_OBJECT_ACCOUNTID: &str = "unique_object_accountid";

pub const MEAN: &str = "mean";
pub const THRESHOLD_MODIFIER: &str = "threshold_modifier";
pub const WINDOW_TIMESTAMP: &str = "window_timestamp";

pub const KM_DISTANCE: &str = "km_distance";
pub const TIME_DELTA_SECONDS: &str = "time_delta_seconds";

pub const SECONDARY_SAMPLE: &str = "secondary_sample";

pub const REAL_ADDRESS_HASH_EXPECTED: &str = "real_address_hash_expected";
pub const REAL_ADDRESS_HASH_ACTUAL: &str = "real_address_hash_actual";
pub const MESSAGE_ID: &str = "message_id";

/// Well-known metadata key under which a key of the given field is reported
pub fn for_field(field: EventField) -> Option<&'static str> {
    match field {
        EventField::SourceAddress => Some(SOURCEADDRESS),
        EventField::AccountId => Some(EMAIL),
        EventField::Uid => Some(UID),
        EventField::City => Some(SOURCEADDRESS_CITY),
        EventField::Country => Some(SOURCEADDRESS_COUNTRY),
        EventField::MessageId => Some(MESSAGE_ID),
        _ => None,
    }
}
