//! Normalized event model
//!
//! A `NormalizedEvent` is produced by an external parsing layer and is immutable
//! once handed to the pipeline. The core only reads it through typed accessors;
//! it has no knowledge of the raw log format the event came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Shared, immutable handle to an event held by several panes at once
pub type SharedEvent = Arc<NormalizedEvent>;

/// Security-relevant action an event describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    LoginFailure,
    LoginSuccess,
    AccountCreate,
    PasswordReset,
    AccountStatusCheck,
    RelayAddressRegistered,
    RelayForward,
    HttpRequest,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::LoginFailure => "loginFailure",
            ActionType::LoginSuccess => "loginSuccess",
            ActionType::AccountCreate => "accountCreate",
            ActionType::PasswordReset => "passwordReset",
            ActionType::AccountStatusCheck => "accountStatusCheck",
            ActionType::RelayAddressRegistered => "relayAddressRegistered",
            ActionType::RelayForward => "relayForward",
            ActionType::HttpRequest => "httpRequest",
            ActionType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "loginFailure" => ActionType::LoginFailure,
            "loginSuccess" => ActionType::LoginSuccess,
            "accountCreate" => ActionType::AccountCreate,
            "passwordReset" => ActionType::PasswordReset,
            "accountStatusCheck" => ActionType::AccountStatusCheck,
            "relayAddressRegistered" => ActionType::RelayAddressRegistered,
            "relayForward" => ActionType::RelayForward,
            "httpRequest" => ActionType::HttpRequest,
            _ => ActionType::Other(value),
        }
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        ActionType::from(value.to_string())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geolocation resolved for an event's source address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl GeoPoint {
    pub fn new(city: &str, country: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            city: Some(city.to_string()),
            country: Some(country.to_string()),
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// Latitude/longitude pair, only when both are present and finite
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Normalized security event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Actor account identifier (typically an email address)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub geo: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_recipient: Option<String>,
    /// Object account the action was performed against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_hash: Option<String>,
}

impl NormalizedEvent {
    /// Create an event with only the required fields set
    pub fn new(action: impl Into<ActionType>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            action: action.into(),
            source_address: None,
            account_id: None,
            uid: None,
            geo: GeoPoint::default(),
            sms_recipient: None,
            email_recipient: None,
            destination_account_id: None,
            user_agent: None,
            message_id: None,
            address_hash: None,
        }
    }

    /// Convenience constructor from epoch milliseconds
    pub fn at_millis(action: impl Into<ActionType>, millis: i64) -> Self {
        let timestamp = DateTime::from_timestamp_millis(millis).unwrap_or_default();
        Self::new(action, timestamp)
    }

    pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_geo(mut self, geo: GeoPoint) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_sms_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.sms_recipient = Some(recipient.into());
        self
    }

    pub fn with_email_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.email_recipient = Some(recipient.into());
        self
    }

    pub fn with_destination_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.destination_account_id = Some(account_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_address_hash(mut self, hash: impl Into<String>) -> Self {
        self.address_hash = Some(hash.into());
        self
    }

    /// Event time in milliseconds since the epoch
    pub fn event_time_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Typed accessor used by key extraction and uniqueness checks
    pub fn field(&self, field: EventField) -> Option<&str> {
        match field {
            EventField::SourceAddress => self.source_address.as_deref(),
            EventField::AccountId => self.account_id.as_deref(),
            EventField::Uid => self.uid.as_deref(),
            EventField::Action => Some(self.action.as_str()),
            EventField::City => self.geo.city.as_deref(),
            EventField::Country => self.geo.country.as_deref(),
            EventField::SmsRecipient => self.sms_recipient.as_deref(),
            EventField::EmailRecipient => self.email_recipient.as_deref(),
            EventField::DestinationAccountId => self.destination_account_id.as_deref(),
            EventField::UserAgent => self.user_agent.as_deref(),
            EventField::MessageId => self.message_id.as_deref(),
            EventField::AddressHash => self.address_hash.as_deref(),
        }
    }
}

/// String-valued event attributes addressable by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    SourceAddress,
    AccountId,
    Uid,
    Action,
    City,
    Country,
    SmsRecipient,
    EmailRecipient,
    DestinationAccountId,
    UserAgent,
    MessageId,
    AddressHash,
}

impl EventField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventField::SourceAddress => "source_address",
            EventField::AccountId => "account_id",
            EventField::Uid => "uid",
            EventField::Action => "action",
            EventField::City => "city",
            EventField::Country => "country",
            EventField::SmsRecipient => "sms_recipient",
            EventField::EmailRecipient => "email_recipient",
            EventField::DestinationAccountId => "destination_account_id",
            EventField::UserAgent => "user_agent",
            EventField::MessageId => "message_id",
            EventField::AddressHash => "address_hash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_round_trip() {
        for action in [
            ActionType::LoginFailure,
            ActionType::AccountStatusCheck,
            ActionType::RelayForward,
        ] {
            let s: String = action.clone().into();
            assert_eq!(ActionType::from(s), action);
        }
        assert_eq!(
            ActionType::from("devicesList"),
            ActionType::Other("devicesList".to_string())
        );
    }

    #[test]
    fn test_field_accessors() {
        let event = NormalizedEvent::at_millis(ActionType::LoginFailure, 1000)
            .with_source_address("216.160.83.56")
            .with_account_id("spock@mozilla.com")
            .with_geo(GeoPoint::new("Milton", "US", 47.2513, -122.3149));

        assert_eq!(event.field(EventField::SourceAddress), Some("216.160.83.56"));
        assert_eq!(event.field(EventField::City), Some("Milton"));
        assert_eq!(event.field(EventField::Action), Some("loginFailure"));
        assert_eq!(event.field(EventField::Uid), None);
        assert_eq!(event.event_time_millis(), 1000);
    }

    #[test]
    fn test_coordinates_require_both_values() {
        let mut geo = GeoPoint::new("London", "GB", 51.5142, -0.0931);
        assert_eq!(geo.coordinates(), Some((51.5142, -0.0931)));
        geo.longitude = None;
        assert_eq!(geo.coordinates(), None);
    }

    #[test]
    fn test_event_serde() {
        let event = NormalizedEvent::at_millis("loginSuccess", 5000).with_uid("abc");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"action\":\"loginSuccess\""));
        let parsed: NormalizedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
