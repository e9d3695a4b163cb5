//! Event-time windowing
//!
//! ## Components
//!
//! - `WatermarkManager`: monotonic "no more data before T" estimate
//! - `WindowStrategy`: assigns events to tumbling or global windows
//! - `WindowManager`: keyed pane emission on top of a strategy
//! - `Pane`, `WindowBounds`, `PaneTiming`, `PaneMode`: immutable value types

pub mod manager;
pub mod strategies;
pub mod types;
pub mod watermark;

pub use manager::{WindowAdvance, WindowManager};
pub use strategies::{GlobalWindowStrategy, TumblingWindowStrategy, WindowStrategy};
pub use types::{Pane, PaneMode, PaneTiming, WindowBounds};
pub use watermark::{WatermarkConfig, WatermarkManager};
