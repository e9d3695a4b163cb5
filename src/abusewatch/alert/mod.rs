//! Alert records, construction and delivery

pub mod builder;
pub mod escalation;
pub mod meta;
pub mod record;
pub mod sink;

pub use builder::AlertBuilder;
pub use escalation::EscalationPolicy;
pub use record::{Alert, AlertSample, Severity};
pub use sink::{AlertSink, ChannelSink, CollectingSink, EscalatingSink};
