use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::events::{DataChanged, DataChangedEvents};
use crate::feature::Feature;
use crate::geometry::BBox;
use crate::spatial::FeatureStore;

/// The capability every map layer exposes to the map and to decorators.
///
/// Implementations must be shareable across the render loop and background
/// timers, hence `Send + Sync` with interior mutability.
pub trait Layer: Send + Sync {
    fn name(&self) -> &str;

    /// World extent covered by the layer's data, if known.
    fn envelope(&self) -> Option<BBox>;

    /// Features intersecting `extent`, for drawing at `resolution` (world units per pixel).
    fn features_in_view(&self, extent: &BBox, resolution: f64) -> Vec<Arc<Feature>>;

    /// Notification that the map's visible window moved.
    fn view_changed(&self, major_change: bool, extent: &BBox, resolution: f64);

    /// Cancel in-flight data fetches.
    fn abort_fetch(&self);

    /// Drop any data the layer cached on its own behalf.
    fn clear_cache(&self);

    /// Hub fired when the layer has new content.
    fn data_changed(&self) -> &DataChangedEvents;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// A layer over an in-memory feature set.
#[derive(Debug)]
pub struct MemoryLayer {
    name: String,
    store: FeatureStore,
    events: DataChangedEvents,
    enabled: AtomicBool,
    view_changes: AtomicUsize,
}

impl MemoryLayer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            store: FeatureStore::new(),
            events: DataChangedEvents::new(),
            enabled: AtomicBool::new(true),
            view_changes: AtomicUsize::new(0),
        }
    }

    pub fn with_features(self, features: Vec<Feature>) -> Self {
        self.store.set(features.into_iter().map(Arc::new).collect());
        self
    }

    /// Replace the layer contents and notify subscribers.
    pub fn set_features(&self, features: Vec<Feature>) {
        self.store.set(features.into_iter().map(Arc::new).collect());
        self.events.publish(&DataChanged::new(&self.name));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Number of `view_changed` calls received so far.
    pub fn view_change_count(&self) -> usize {
        self.view_changes.load(Ordering::Acquire)
    }
}

impl Layer for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn envelope(&self) -> Option<BBox> {
        self.store.envelope()
    }

    fn features_in_view(&self, extent: &BBox, resolution: f64) -> Vec<Arc<Feature>> {
        self.store.features_in_view(extent, resolution)
    }

    fn view_changed(&self, _major_change: bool, _extent: &BBox, _resolution: f64) {
        self.view_changes.fetch_add(1, Ordering::AcqRel);
    }

    fn abort_fetch(&self) {}

    fn clear_cache(&self) {}

    fn data_changed(&self) -> &DataChangedEvents {
        &self.events
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}
