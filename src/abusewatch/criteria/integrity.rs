//! Point-wise integrity comparators
//!
//! Each comparator looks at one event and raises at most one alert for it.
//! Nothing is windowed, batched or sampled.

use super::{AlertProfile, EvaluationContext};
use crate::abusewatch::alert::{meta, Alert};
use crate::abusewatch::error::DetectionResult;
use crate::abusewatch::event::{ActionType, NormalizedEvent};
use crate::abusewatch::lists::StaticList;
use crate::abusewatch::state::StateCursor;
use log::{debug, info};

/// State store namespace for expected relay address hashes
pub const RELAY_FORWARD_NAMESPACE: &str = "relay_forward";

pub enum IntegrityComparator {
    RelayForward(RelayForwardComparator),
    StatusComparator(StatusComparator),
    ActivityMonitor(ActivityMonitor),
    LoginFailureAtRisk(LoginFailureAtRisk),
}

impl IntegrityComparator {
    pub fn profile(&self) -> &AlertProfile {
        match self {
            IntegrityComparator::RelayForward(c) => &c.profile,
            IntegrityComparator::StatusComparator(c) => &c.profile,
            IntegrityComparator::ActivityMonitor(c) => &c.profile,
            IntegrityComparator::LoginFailureAtRisk(c) => &c.profile,
        }
    }

    pub async fn evaluate(
        &self,
        event: &NormalizedEvent,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Option<Alert>> {
        match self {
            IntegrityComparator::RelayForward(c) => c.evaluate(event, ctx).await,
            IntegrityComparator::StatusComparator(c) => c.evaluate(event, ctx),
            IntegrityComparator::ActivityMonitor(c) => c.evaluate(event, ctx),
            IntegrityComparator::LoginFailureAtRisk(c) => c.evaluate(event, ctx),
        }
    }
}

/// Compares the real-address hash on forwarded mail against the hash recorded
/// when the relay address was registered.
///
/// The expectation is keyed by uid, not by message id: every relay address
/// registered for one uid shares a single expected hash, and every forwarded
/// message for that uid is checked against it. The message id is carried only
/// as alert metadata. A forward for a uid with no registration seeds the
/// expectation without alerting; a mismatch never overwrites it.
pub struct RelayForwardComparator {
    profile: AlertProfile,
}

impl RelayForwardComparator {
    pub fn new(profile: AlertProfile) -> Self {
        info!("Initialized relay forward comparator '{}'", profile.tag);
        Self { profile }
    }

    async fn evaluate(
        &self,
        event: &NormalizedEvent,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Option<Alert>> {
        let (Some(uid), Some(actual)) = (event.uid.as_deref(), event.address_hash.as_deref())
        else {
            return Ok(None);
        };

        let _guard = ctx
            .locks
            .lock(&format!("{}/{}", RELAY_FORWARD_NAMESPACE, uid))
            .await;
        let cursor = StateCursor::new(ctx.state.as_ref(), RELAY_FORWARD_NAMESPACE);

        match event.action {
            ActionType::RelayAddressRegistered => {
                cursor.put(uid, &actual.to_string()).await?;
                Ok(None)
            }
            ActionType::RelayForward => {
                let expected: Option<String> = cursor.get(uid).await?;
                match expected {
                    None => {
                        debug!("'{}': seeding expected hash for {}", self.profile.tag, uid);
                        cursor.put(uid, &actual.to_string()).await?;
                        Ok(None)
                    }
                    Some(expected) if expected == actual => Ok(None),
                    Some(expected) => self
                        .profile
                        .builder()
                        .summary(format!(
                            "{} private relay address hash mismatch for {}",
                            ctx.monitored_resource, uid
                        ))
                        .metadata(meta::UID, uid)
                        .metadata(meta::REAL_ADDRESS_HASH_EXPECTED, expected)
                        .metadata(meta::REAL_ADDRESS_HASH_ACTUAL, actual)
                        .metadata_opt(meta::MESSAGE_ID, event.message_id.as_deref())
                        .build()
                        .map(Some),
                }
            }
            _ => Ok(None),
        }
    }
}

/// Account status checks arriving from a known address.
///
/// The checked account is added to the shared flagged-account set.
pub struct StatusComparator {
    profile: AlertProfile,
    known_addresses: StaticList,
}

impl StatusComparator {
    pub fn new(profile: AlertProfile, known_addresses: StaticList) -> Self {
        info!(
            "Initialized status comparator '{}' with {} known addresses",
            profile.tag,
            known_addresses.len()
        );
        Self {
            profile,
            known_addresses,
        }
    }

    fn evaluate(
        &self,
        event: &NormalizedEvent,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Option<Alert>> {
        if event.action != ActionType::AccountStatusCheck {
            return Ok(None);
        }
        let Some(address) = event
            .source_address
            .as_deref()
            .filter(|a| self.known_addresses.contains(a))
        else {
            return Ok(None);
        };

        if let Some(account) = event.account_id.as_deref() {
            ctx.flagged.flag(account);
        }

        self.profile
            .builder()
            .summary(format!(
                "{} status check comparator indicates known address",
                ctx.monitored_resource
            ))
            .metadata(meta::SOURCEADDRESS, address)
            .metadata_opt(meta::EMAIL, event.account_id.as_deref())
            .build()
            .map(Some)
    }
}

/// Any activity on an account from the monitored list
pub struct ActivityMonitor {
    profile: AlertProfile,
    monitored_accounts: StaticList,
}

impl ActivityMonitor {
    pub fn new(profile: AlertProfile, monitored_accounts: StaticList) -> Self {
        info!(
            "Initialized activity monitor '{}' with {} accounts",
            profile.tag,
            monitored_accounts.len()
        );
        Self {
            profile,
            monitored_accounts,
        }
    }

    fn evaluate(
        &self,
        event: &NormalizedEvent,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Option<Alert>> {
        let Some(account) = event
            .account_id
            .as_deref()
            .filter(|a| self.monitored_accounts.contains(a))
        else {
            return Ok(None);
        };

        self.profile
            .builder()
            .summary(format!(
                "{} activity on monitored account - action {}",
                ctx.monitored_resource, event.action
            ))
            .metadata(meta::EMAIL, account)
            .metadata(meta::ACTION, &event.action)
            .metadata_opt(meta::SOURCEADDRESS, event.source_address.as_deref())
            .build()
            .map(Some)
    }
}

/// Login failures against accounts in the flagged-account set
pub struct LoginFailureAtRisk {
    profile: AlertProfile,
}

impl LoginFailureAtRisk {
    pub fn new(profile: AlertProfile) -> Self {
        info!("Initialized at-risk login failure monitor '{}'", profile.tag);
        Self { profile }
    }

    fn evaluate(
        &self,
        event: &NormalizedEvent,
        ctx: &EvaluationContext,
    ) -> DetectionResult<Option<Alert>> {
        if event.action != ActionType::LoginFailure {
            return Ok(None);
        }
        let Some(account) = event
            .account_id
            .as_deref()
            .filter(|a| ctx.flagged.is_flagged(a))
        else {
            return Ok(None);
        };

        self.profile
            .builder()
            .summary(format!(
                "{} login failure for at risk account, {}",
                ctx.monitored_resource,
                event.source_address.as_deref().unwrap_or("unknown")
            ))
            .metadata(meta::EMAIL, account)
            .metadata_opt(meta::SOURCEADDRESS, event.source_address.as_deref())
            .build()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::alert::Severity;

    fn profile(tag: &str) -> AlertProfile {
        AlertProfile::new(tag, "customs", Severity::Info)
    }

    fn relay(action: ActionType, uid: &str, hash: &str) -> NormalizedEvent {
        NormalizedEvent::at_millis(action, 0)
            .with_uid(uid)
            .with_address_hash(hash)
            .with_message_id("msg-1")
    }

    #[tokio::test]
    async fn test_relay_forward_mismatch() {
        let ctx = EvaluationContext::in_memory("test");
        let c = IntegrityComparator::RelayForward(RelayForwardComparator::new(profile(
            "private_relay_forward",
        )));
        let uid = "00000000000000000000000000000000";

        let registered = relay(ActionType::RelayAddressRegistered, uid, "aaaa");
        assert!(c.evaluate(&registered, &ctx).await.unwrap().is_none());

        let matching = relay(ActionType::RelayForward, uid, "aaaa");
        assert!(c.evaluate(&matching, &ctx).await.unwrap().is_none());

        let mismatched = relay(ActionType::RelayForward, uid, "bbbb");
        let alert = c.evaluate(&mismatched, &ctx).await.unwrap().unwrap();
        assert_eq!(
            alert.summary,
            "test private relay address hash mismatch for 00000000000000000000000000000000"
        );
        assert_eq!(alert.metadata_value(meta::REAL_ADDRESS_HASH_EXPECTED), Some("aaaa"));
        assert_eq!(alert.metadata_value(meta::REAL_ADDRESS_HASH_ACTUAL), Some("bbbb"));
        assert_eq!(alert.metadata_value(meta::MESSAGE_ID), Some("msg-1"));

        // Expectation is not overwritten by the mismatch
        assert!(c.evaluate(&mismatched, &ctx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_relay_forward_seeds_unknown_uid() {
        let ctx = EvaluationContext::in_memory("test");
        let c = IntegrityComparator::RelayForward(RelayForwardComparator::new(profile(
            "private_relay_forward",
        )));
        let first = relay(ActionType::RelayForward, "u1", "cccc");
        assert!(c.evaluate(&first, &ctx).await.unwrap().is_none());
        let second = relay(ActionType::RelayForward, "u1", "dddd");
        assert!(c.evaluate(&second, &ctx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_relay_forward_expectation_shared_across_messages() {
        let ctx = EvaluationContext::in_memory("test");
        let c = IntegrityComparator::RelayForward(RelayForwardComparator::new(profile(
            "private_relay_forward",
        )));
        let registered = relay(ActionType::RelayAddressRegistered, "u2", "aaaa");
        assert!(c.evaluate(&registered, &ctx).await.unwrap().is_none());

        let other_message = relay(ActionType::RelayForward, "u2", "bbbb").with_message_id("msg-2");
        let alert = c.evaluate(&other_message, &ctx).await.unwrap().unwrap();
        assert_eq!(alert.metadata_value(meta::REAL_ADDRESS_HASH_EXPECTED), Some("aaaa"));
        assert_eq!(alert.metadata_value(meta::MESSAGE_ID), Some("msg-2"));
    }

    #[tokio::test]
    async fn test_status_comparator_flags_account() {
        let ctx = EvaluationContext::in_memory("test");
        let status = IntegrityComparator::StatusComparator(StatusComparator::new(
            profile("status_comparator"),
            StaticList::parse("3.3.3.3\n"),
        ));
        let at_risk = IntegrityComparator::LoginFailureAtRisk(LoginFailureAtRisk::new(profile(
            "login_failure_at_risk_account",
        )));

        let failure = NormalizedEvent::at_millis(ActionType::LoginFailure, 0)
            .with_account_id("spock@mozilla.com")
            .with_source_address("10.0.1.11");
        assert!(at_risk.evaluate(&failure, &ctx).await.unwrap().is_none());

        let check = NormalizedEvent::at_millis(ActionType::AccountStatusCheck, 0)
            .with_account_id("spock@mozilla.com")
            .with_source_address("3.3.3.3");
        let alert = status.evaluate(&check, &ctx).await.unwrap().unwrap();
        assert_eq!(alert.summary, "test status check comparator indicates known address");
        assert_eq!(alert.metadata_value(meta::EMAIL), Some("spock@mozilla.com"));
        assert!(ctx.flagged.is_flagged("spock@mozilla.com"));

        let alert = at_risk.evaluate(&failure, &ctx).await.unwrap().unwrap();
        assert_eq!(alert.summary, "test login failure for at risk account, 10.0.1.11");
        assert_eq!(
            alert.notify_merge_key.as_deref(),
            Some("login_failure_at_risk_account")
        );
    }

    #[tokio::test]
    async fn test_activity_monitor() {
        let ctx = EvaluationContext::in_memory("test");
        let monitor = IntegrityComparator::ActivityMonitor(ActivityMonitor::new(
            profile("activity_monitor"),
            StaticList::from_entries(["spock@mozilla.com"]),
        ));

        let event = NormalizedEvent::at_millis(ActionType::LoginSuccess, 0)
            .with_account_id("spock@mozilla.com")
            .with_source_address("127.0.0.1");
        let alert = monitor.evaluate(&event, &ctx).await.unwrap().unwrap();
        assert_eq!(
            alert.summary,
            "test activity on monitored account - action loginSuccess"
        );
        assert_eq!(alert.metadata_value(meta::SOURCEADDRESS), Some("127.0.0.1"));

        let other = NormalizedEvent::at_millis(ActionType::LoginSuccess, 0)
            .with_account_id("kirk@mozilla.com");
        assert!(monitor.evaluate(&other, &ctx).await.unwrap().is_none());
    }
}
