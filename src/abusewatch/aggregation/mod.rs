//! Keyed aggregation of windowed events

pub mod aggregate;
pub mod key;
pub mod keyed_counter;

pub use aggregate::WindowAggregate;
pub use key::{KeyExtractor, COMPOSITE_KEY_DELIMITER};
pub use keyed_counter::KeyedCounter;
