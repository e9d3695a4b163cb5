//! Read-only side inputs broadcast to every evaluator
//!
//! A side input only ever exposes complete snapshots. Readers wait until the
//! first snapshot is published and then always see one whole value; a snapshot
//! is replaced atomically, never filled incrementally.

use crate::abusewatch::error::{DetectionError, DetectionResult};
use crate::abusewatch::event::NormalizedEvent;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Reading end of a side input
pub struct SideInput<T> {
    name: String,
    receiver: watch::Receiver<Option<Arc<T>>>,
}

impl<T> Clone for SideInput<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

/// Writing end of a side input
pub struct SideInputPublisher<T> {
    sender: watch::Sender<Option<Arc<T>>>,
}

impl<T: Send + Sync + 'static> SideInputPublisher<T> {
    /// Replace the current snapshot
    pub fn publish(&self, snapshot: T) {
        self.sender.send_replace(Some(Arc::new(snapshot)));
    }
}

impl<T: Send + Sync + 'static> SideInput<T> {
    /// Create an unpublished side input and its publisher
    pub fn channel(name: impl Into<String>) -> (SideInputPublisher<T>, SideInput<T>) {
        let (sender, receiver) = watch::channel(None);
        (
            SideInputPublisher { sender },
            SideInput {
                name: name.into(),
                receiver,
            },
        )
    }

    /// A side input with a single, already complete snapshot
    pub fn fixed(name: impl Into<String>, snapshot: T) -> Self {
        let (_, receiver) = watch::channel(Some(Arc::new(snapshot)));
        SideInput {
            name: name.into(),
            receiver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for a complete snapshot.
    ///
    /// Fails if the publisher is dropped before anything was published.
    pub async fn snapshot(&self) -> DetectionResult<Arc<T>> {
        let mut receiver = self.receiver.clone();
        loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(snapshot) = current {
                return Ok(snapshot);
            }
            receiver
                .changed()
                .await
                .map_err(|_| DetectionError::SideInputUnavailable {
                    name: self.name.clone(),
                })?;
        }
    }

    /// Current snapshot without waiting
    pub fn try_snapshot(&self) -> Option<Arc<T>> {
        self.receiver.borrow().clone()
    }
}

/// Source addresses that likely front many legitimate clients
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NatSnapshot {
    flagged: HashSet<String>,
}

impl NatSnapshot {
    pub fn new(flagged: impl IntoIterator<Item = String>) -> Self {
        Self {
            flagged: flagged.into_iter().collect(),
        }
    }

    pub fn is_nat(&self, address: &str) -> bool {
        self.flagged.contains(address)
    }

    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }
}

/// Flags an address as a shared gateway when it presents at least
/// `min_distinct_user_agents` distinct user agents.
#[derive(Debug, Clone)]
pub struct NatDetector {
    min_distinct_user_agents: usize,
}

impl Default for NatDetector {
    fn default() -> Self {
        Self {
            min_distinct_user_agents: 2,
        }
    }
}

impl NatDetector {
    pub fn new(min_distinct_user_agents: usize) -> Self {
        Self {
            min_distinct_user_agents: min_distinct_user_agents.max(1),
        }
    }

    pub fn detect<'a>(&self, events: impl IntoIterator<Item = &'a NormalizedEvent>) -> NatSnapshot {
        let mut agents: HashMap<&str, HashSet<&str>> = HashMap::new();
        for event in events {
            if let (Some(address), Some(agent)) =
                (event.source_address.as_deref(), event.user_agent.as_deref())
            {
                agents.entry(address).or_default().insert(agent);
            }
        }
        NatSnapshot::new(
            agents
                .into_iter()
                .filter(|(_, ua)| ua.len() >= self.min_distinct_user_agents)
                .map(|(address, _)| address.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abusewatch::event::ActionType;
    use std::time::Duration;

    #[tokio::test]
    async fn test_snapshot_waits_for_publish() {
        let (publisher, input) = SideInput::<NatSnapshot>::channel("nat");
        assert!(input.try_snapshot().is_none());

        let reader = input.clone();
        let task = tokio::spawn(async move { reader.snapshot().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish(NatSnapshot::new(["10.0.0.1".to_string()]));

        let snapshot = task.await.unwrap().unwrap();
        assert!(snapshot.is_nat("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_dropped_publisher_fails() {
        let (publisher, input) = SideInput::<NatSnapshot>::channel("nat");
        drop(publisher);
        let err = input.snapshot().await.unwrap_err();
        assert!(matches!(err, DetectionError::SideInputUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fixed_snapshot() {
        let input = SideInput::fixed("nat", NatSnapshot::default());
        assert!(input.snapshot().await.unwrap().is_empty());
    }

    #[test]
    fn test_nat_detection() {
        let events: Vec<NormalizedEvent> = ["a", "b", "a"]
            .iter()
            .map(|ua| {
                NormalizedEvent::at_millis(ActionType::HttpRequest, 0)
                    .with_source_address("192.168.1.2")
                    .with_user_agent(*ua)
            })
            .chain(std::iter::once(
                NormalizedEvent::at_millis(ActionType::HttpRequest, 0)
                    .with_source_address("10.0.0.1")
                    .with_user_agent("a"),
            ))
            .collect();

        let snapshot = NatDetector::default().detect(events.iter());
        assert!(snapshot.is_nat("192.168.1.2"));
        assert!(!snapshot.is_nat("10.0.0.1"));
        assert_eq!(snapshot.len(), 1);
    }
}
