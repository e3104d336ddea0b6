use serde::{Deserialize, Serialize};

use mapraster_core::{BBox, Point};

/// An immutable rendering window: world centre, resolution and pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Centre of the window in world coordinates.
    center: Point,
    /// World units per pixel.
    resolution: f64,
    /// Width in pixels.
    width: f64,
    /// Height in pixels.
    height: f64,
}

impl Viewport {
    pub fn new(center: Point, resolution: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            resolution,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Pixel dimensions of a canvas large enough for this window.
    pub fn pixel_size(&self) -> (u32, u32) {
        (to_pixels(self.width), to_pixels(self.height))
    }

    /// The world rectangle covered by the window.
    pub fn extent(&self) -> BBox {
        BBox::from_center(
            self.center,
            self.width * self.resolution,
            self.height * self.resolution,
        )
    }

    /// Convert a world point to screen pixels (origin top-left, y down).
    pub fn world_to_screen(&self, world: &Point) -> Point {
        Point::new(
            (world.x - self.center.x) / self.resolution + self.width / 2.0,
            (self.center.y - world.y) / self.resolution + self.height / 2.0,
        )
    }

    /// Convert screen pixels back to a world point.
    pub fn screen_to_world(&self, screen: &Point) -> Point {
        Point::new(
            (screen.x - self.width / 2.0) * self.resolution + self.center.x,
            self.center.y - (screen.y - self.height / 2.0) * self.resolution,
        )
    }
}

fn to_pixels(size: f64) -> u32 {
    if size.is_finite() && size > 0.0 {
        size.ceil().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_from_center_and_resolution() {
        let vp = Viewport::new(Point::new(100.0, 50.0), 2.0, 200.0, 100.0);
        let extent = vp.extent();
        assert_eq!(extent, BBox::from_corners(-100.0, -50.0, 300.0, 150.0));
        assert_eq!(extent.centroid(), vp.center());
    }

    #[test]
    fn test_screen_world_round_trip() {
        let vp = Viewport::new(Point::new(10.0, 10.0), 0.5, 400.0, 300.0);
        let world = Point::new(12.5, 7.0);
        let back = vp.screen_to_world(&vp.world_to_screen(&world));
        assert!(world.distance_to(&back) < 1e-9);

        // Top-left pixel maps to the extent's upper-left corner.
        let top_left = vp.screen_to_world(&Point::new(0.0, 0.0));
        let extent = vp.extent();
        assert!((top_left.x - extent.min.x).abs() < 1e-9);
        assert!((top_left.y - extent.max.y).abs() < 1e-9);
    }

    #[test]
    fn test_pixel_size_rounds_up() {
        let vp = Viewport::new(Point::new(0.0, 0.0), 1.0, 99.2, 10.0);
        assert_eq!(vp.pixel_size(), (100, 10));

        let degenerate = Viewport::new(Point::new(0.0, 0.0), 1.0, f64::NAN, -3.0);
        assert_eq!(degenerate.pixel_size(), (0, 0));
    }
}
