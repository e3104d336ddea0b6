use std::sync::{Arc, RwLock};

use rstar::{RTree, RTreeObject, AABB};

use crate::feature::Feature;
use crate::geometry::BBox;

/// An entry in the R-tree spatial index, referencing a feature by its index.
#[derive(Debug, Clone)]
struct SpatialEntry {
    /// Index into the snapshot's feature vector.
    feature_index: usize,
    /// Bounding box of the feature.
    bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

fn to_aabb(bbox: &BBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min.x, bbox.min.y], [bbox.max.x, bbox.max.y])
}

/// One immutable version of the store contents.
#[derive(Default)]
struct Snapshot {
    features: Vec<Arc<Feature>>,
    tree: RTree<SpatialEntry>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("features", &self.features.len())
            .finish()
    }
}

impl Snapshot {
    fn build(features: Vec<Arc<Feature>>) -> Self {
        let entries = features
            .iter()
            .enumerate()
            .map(|(feature_index, f)| SpatialEntry {
                feature_index,
                bbox: f.bbox(),
            })
            .collect();
        Self {
            features,
            tree: RTree::bulk_load(entries),
        }
    }

    fn collect(&self, mut indices: Vec<usize>) -> Vec<Arc<Feature>> {
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|i| Arc::clone(&self.features[i]))
            .collect()
    }
}

/// Spatially indexed feature cache.
///
/// Contents are replaced wholesale: `set` builds a new snapshot and swaps it
/// in, so a reader sees either the previous contents or the new ones. Readers
/// hold the lock only long enough to clone the snapshot handle.
#[derive(Debug, Default)]
pub struct FeatureStore {
    current: RwLock<Arc<Snapshot>>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn swap(&self, next: Snapshot) -> Arc<Snapshot> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(next))
    }

    /// Replace the contents with `features`.
    pub fn set(&self, features: Vec<Arc<Feature>>) {
        self.swap(Snapshot::build(features));
    }

    /// Install `features` in a single swap and return the previous contents.
    ///
    /// Readers never observe an empty store in between.
    pub fn replace(&self, features: Vec<Arc<Feature>>) -> Vec<Arc<Feature>> {
        let previous = self.swap(Snapshot::build(features));
        match Arc::try_unwrap(previous) {
            Ok(snapshot) => snapshot.features,
            // A reader still holds the old snapshot.
            Err(shared) => shared.features.clone(),
        }
    }

    /// Drop the store's references. Features still held elsewhere stay alive.
    pub fn clear(&self) {
        self.swap(Snapshot::default());
    }

    /// Features whose extent intersects `extent`.
    ///
    /// The resolution is accepted for contract compatibility but not used to
    /// filter: whatever is stored is served at every zoom level.
    pub fn features_in_view(&self, extent: &BBox, _resolution: f64) -> Vec<Arc<Feature>> {
        let snapshot = self.snapshot();
        let indices = snapshot
            .tree
            .locate_in_envelope_intersecting(&to_aabb(extent))
            .map(|e| e.feature_index)
            .collect();
        snapshot.collect(indices)
    }

    /// Every stored feature, in insertion order.
    pub fn features(&self) -> Vec<Arc<Feature>> {
        self.snapshot().features.clone()
    }

    /// Union of all feature extents.
    pub fn envelope(&self) -> Option<BBox> {
        let snapshot = self.snapshot();
        let mut iter = snapshot.features.iter().map(|f| f.bbox());
        let first = iter.next()?;
        Some(iter.fold(first, |acc, b| acc.union(&b)))
    }

    /// Number of stored features.
    pub fn len(&self) -> usize {
        self.snapshot().features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
