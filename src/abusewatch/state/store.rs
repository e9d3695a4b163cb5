//! Durable key-value state contract
//!
//! Values are addressed by `namespace/key`. There are no multi-key
//! transactions; callers serialize read-modify-write per key themselves
//! (see `KeyedLocks`). The core never caches a value between evaluations: the
//! store is the only source of truth.

use crate::abusewatch::error::{DetectionError, DetectionResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get(&self, namespace: &str, key: &str) -> DetectionResult<Option<String>>;

    async fn put(&self, namespace: &str, key: &str, value: String) -> DetectionResult<()>;

    /// Remove every key in a namespace. Intended for tests and resets.
    async fn delete_all(&self, namespace: &str) -> DetectionResult<()>;
}

/// Typed JSON view of one namespace
pub struct StateCursor<'a> {
    store: &'a dyn StateStore,
    namespace: &'a str,
}

impl<'a> StateCursor<'a> {
    pub fn new(store: &'a dyn StateStore, namespace: &'a str) -> Self {
        Self { store, namespace }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DetectionResult<Option<T>> {
        match self.store.get(self.namespace, key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DetectionError::state_corrupt(self.namespace, key, e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize + Sync>(&self, key: &str, value: &T) -> DetectionResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.put(self.namespace, key, raw).await
    }
}

/// Process-local store used by tests and single-node deployments
#[derive(Default)]
pub struct InMemoryStateStore {
    namespaces: RwLock<HashMap<String, HashMap<String, String>>>,
    unavailable: AtomicBool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn check_available(&self, namespace: &str, key: &str) -> DetectionResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DetectionError::state_unavailable(
                namespace,
                key,
                "in-memory store marked unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, namespace: &str, key: &str) -> DetectionResult<Option<String>> {
        self.check_available(namespace, key)?;
        Ok(self
            .namespaces
            .read()
            .await
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: String) -> DetectionResult<()> {
        self.check_available(namespace, key)?;
        self.namespaces
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_all(&self, namespace: &str) -> DetectionResult<()> {
        self.check_available(namespace, "*")?;
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }
}
