//! # Mapraster Layers
//!
//! Layer decorators built on the core `Layer` capability. The main one,
//! [`RasterizingLayer`], renders a wrapped vector layer to a bitmap after a
//! debounce delay and serves that bitmap until the view leaves the rendered
//! area or the underlying data changes.

pub mod config;
pub mod scheduler;
pub mod disposal;
pub mod rasterizing;
pub mod refresh;

pub use config::{ConfigError, RasterizingConfig};
pub use disposal::GenerationTracker;
pub use rasterizing::{
    create_viewport, BuildError, RasterizeError, RasterizeOutcome, RasterizingLayer, Resolution,
    SkipReason,
};
pub use refresh::{refresh_graphics, GraphicsHost, HostError, RefreshBinding};
pub use scheduler::{DebounceScheduler, ManualScheduler, Task, ThreadScheduler};
