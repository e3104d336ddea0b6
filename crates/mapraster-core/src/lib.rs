//! # Mapraster Core
//!
//! Map primitives shared by every mapraster crate: world geometry, features
//! (including rasterized bitmaps), the `Layer` capability, data-changed
//! notification hubs, and an R-tree backed feature store.

pub mod geometry;
pub mod feature;
pub mod events;
pub mod layer;
pub mod spatial;

pub use events::{DataChanged, DataChangedEvents, DataChangedHandler, SubscriptionId};
pub use feature::{Color, Feature, FeatureId, Geometry, Raster, RenderedGeometry, RenderedResource};
pub use geometry::{BBox, Point};
pub use layer::{Layer, MemoryLayer};
pub use spatial::FeatureStore;
