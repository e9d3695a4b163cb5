//! Durable per-identity state used by the stateful criteria

pub mod locks;
pub mod store;

pub use locks::KeyedLocks;
pub use store::{InMemoryStateStore, StateCursor, StateStore};
