use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{BBox, Point};

/// Unique feature identifier.
pub type FeatureId = Uuid;

/// RGBA fill colour for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_rgba(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self {
            r: 128,
            g: 128,
            b: 128,
            a: 255,
        }
    }
}

/// An encoded bitmap together with the world extent it covers.
///
/// The byte buffer is reference counted: cloning a `Raster` (or holding the
/// `Feature` that owns it) keeps the bitmap alive independently of whatever
/// cache handed it out.
#[derive(Clone, PartialEq)]
pub struct Raster {
    data: Arc<[u8]>,
    extent: BBox,
}

impl Raster {
    pub fn new(data: Vec<u8>, extent: BBox) -> Self {
        Self {
            data: data.into(),
            extent,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// A shared handle to the bitmap bytes.
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn extent(&self) -> BBox {
        self.extent
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("bytes", &self.data.len())
            .field("extent", &self.extent)
            .finish()
    }
}

/// Geometry carried by a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    Bounds(BBox),
    Raster(Raster),
}

impl Geometry {
    pub fn bbox(&self) -> BBox {
        match self {
            Geometry::Point(p) => BBox::new(*p, *p),
            Geometry::Bounds(b) => *b,
            Geometry::Raster(r) => r.extent(),
        }
    }
}

/// A renderer-owned resource cached on a feature (decoded image, paint, ...).
pub type RenderedResource = Arc<dyn Any + Send + Sync>;

/// Per-feature cache of renderer resources, keyed by a renderer-chosen style key.
#[derive(Default)]
pub struct RenderedGeometry {
    entries: Mutex<HashMap<u64, RenderedResource>>,
}

impl RenderedGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: u64, resource: RenderedResource) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, resource);
    }

    pub fn get(&self, key: u64) -> Option<RenderedResource> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached resource. Returns how many were released.
    pub fn release(&self) -> usize {
        let drained: Vec<RenderedResource> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, resource)| resource)
            .collect();
        drained.len()
    }
}

impl fmt::Debug for RenderedGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedGeometry")
            .field("entries", &self.len())
            .finish()
    }
}

/// A map feature: geometry plus style and renderer-side caches.
#[derive(Debug)]
pub struct Feature {
    id: FeatureId,
    geometry: Geometry,
    style: Color,
    rendered: RenderedGeometry,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry,
            style: Color::default(),
            rendered: RenderedGeometry::new(),
        }
    }

    /// A feature wrapping a freshly rendered bitmap.
    pub fn raster(data: Vec<u8>, extent: BBox) -> Self {
        Self::new(Geometry::Raster(Raster::new(data, extent)))
    }

    pub fn with_style(mut self, style: Color) -> Self {
        self.style = style;
        self
    }

    pub fn id(&self) -> FeatureId {
        self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn style(&self) -> Color {
        self.style
    }

    pub fn bbox(&self) -> BBox {
        self.geometry.bbox()
    }

    pub fn as_raster(&self) -> Option<&Raster> {
        match &self.geometry {
            Geometry::Raster(r) => Some(r),
            _ => None,
        }
    }

    pub fn rendered(&self) -> &RenderedGeometry {
        &self.rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_feature_bbox() {
        let extent = BBox::from_corners(0.0, 0.0, 10.0, 5.0);
        let feature = Feature::raster(vec![1, 2, 3], extent);
        assert_eq!(feature.bbox(), extent);
        let raster = feature.as_raster().unwrap();
        assert_eq!(raster.data(), &[1, 2, 3]);
        assert_eq!(raster.byte_len(), 3);
    }

    #[test]
    fn test_shared_data_outlives_feature() {
        let feature = Feature::raster(vec![7; 16], BBox::from_corners(0.0, 0.0, 1.0, 1.0));
        let bytes = feature.as_raster().unwrap().shared_data();
        drop(feature);
        assert_eq!(bytes.len(), 16);
        assert_eq!(Arc::strong_count(&bytes), 1);
    }

    #[test]
    fn test_rendered_geometry_release() {
        let feature = Feature::new(Geometry::Point(Point::new(1.0, 1.0)));
        let resource: RenderedResource = Arc::new(String::from("paint"));
        let weak_resource = Arc::downgrade(&resource);
        feature.rendered().insert(1, resource);
        feature.rendered().insert(2, Arc::new(42u32));
        assert_eq!(feature.rendered().len(), 2);
        assert!(feature.rendered().get(1).is_some());

        assert_eq!(feature.rendered().release(), 2);
        assert!(feature.rendered().is_empty());
        assert!(weak_resource.upgrade().is_none());
    }

    #[test]
    fn test_point_geometry_bbox_is_degenerate() {
        let g = Geometry::Point(Point::new(3.0, 4.0));
        let b = g.bbox();
        assert_eq!(b.width(), 0.0);
        assert_eq!(b.centroid(), Point::new(3.0, 4.0));
    }
}
