use std::sync::{Arc, Mutex, MutexGuard};

use mapraster_core::{Feature, FeatureStore};

/// Two-generation retirement of rasterized features.
///
/// When a new generation is committed the one it replaces is kept in a
/// one-slot retired queue instead of being released at once: a renderer may
/// have fetched it from the store just before the swap. The generation
/// before *that* one is released at the same commit. Releasing drops the
/// tracker's bitmap reference and every renderer resource cached on the
/// feature; the bytes themselves are freed when the last reader lets go.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    retired: Mutex<Vec<Arc<Feature>>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Feature>>> {
        self.retired.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install `next` into `store`, retiring what it held. Returns the number
    /// of features released from the older retired generation.
    ///
    /// The store swaps straight from the old contents to `next`, and the
    /// expired generation is released only once `next` is live.
    pub fn commit(&self, store: &FeatureStore, next: Vec<Arc<Feature>>) -> usize {
        let current = store.replace(next);
        let expired = std::mem::replace(&mut *self.lock(), current);
        release(expired)
    }

    /// Clear `store` and release both the live and the retired generation.
    pub fn release_all(&self, store: &FeatureStore) -> usize {
        let current = store.replace(Vec::new());
        let retired = std::mem::take(&mut *self.lock());
        release(retired) + release(current)
    }

    /// Number of features held in the retired slot.
    pub fn retained(&self) -> usize {
        self.lock().len()
    }
}

fn release(features: Vec<Arc<Feature>>) -> usize {
    let count = features.len();
    for feature in features {
        let resources = feature.rendered().release();
        if let Some(raster) = feature.as_raster() {
            log::trace!(
                "Releasing raster generation ({} bytes, {} rendered resource(s), {} other holder(s))",
                raster.byte_len(),
                resources,
                Arc::strong_count(&feature) - 1
            );
        }
    }
    count
}
