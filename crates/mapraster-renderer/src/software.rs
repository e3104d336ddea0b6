//! CPU renderer that paints feature footprints into an RGBA canvas and
//! encodes it as PNG.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};

use mapraster_core::{BBox, Color, Geometry, Layer, Point};

use crate::renderer::{RenderError, Renderer};
use crate::viewport::Viewport;

/// Side length, in pixels, of the square drawn for a point feature.
const POINT_SIZE: u32 = 3;

/// Default upper bound on canvas area (64 megapixels).
const DEFAULT_MAX_PIXELS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    background: Color,
    max_pixels: u64,
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self {
            background: Color::TRANSPARENT,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    fn canvas(&self, viewport: &Viewport) -> Result<RgbaImage, RenderError> {
        let (width, height) = viewport.pixel_size();
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyViewport {
                width: viewport.width(),
                height: viewport.height(),
            });
        }
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(RenderError::TooLarge {
                width,
                height,
                limit: self.max_pixels,
            });
        }
        Ok(RgbaImage::from_pixel(
            width,
            height,
            Rgba(self.background.to_rgba()),
        ))
    }
}

impl Renderer for SoftwareRenderer {
    fn render_to_bitmap_stream(
        &self,
        viewport: &Viewport,
        layers: &[Arc<dyn Layer>],
    ) -> Result<Vec<u8>, RenderError> {
        let mut canvas = self.canvas(viewport)?;
        let extent = viewport.extent();

        for layer in layers.iter().filter(|l| l.is_enabled()) {
            let features = layer.features_in_view(&extent, viewport.resolution());
            log::trace!(
                "Painting {} feature(s) from layer '{}'",
                features.len(),
                layer.name()
            );
            for feature in features {
                match feature.geometry() {
                    Geometry::Bounds(b) => fill_bbox(&mut canvas, viewport, b, feature.style()),
                    Geometry::Point(p) => {
                        let centre = viewport.world_to_screen(p);
                        let half = f64::from(POINT_SIZE) / 2.0;
                        fill_pixels(
                            &mut canvas,
                            (centre.x - half, centre.y - half),
                            (centre.x + half, centre.y + half),
                            feature.style(),
                        );
                    }
                    // Bitmaps are drawn by the host's compositor, not re-rasterized.
                    Geometry::Raster(_) => {}
                }
            }
        }

        let mut buf = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }
}

fn fill_bbox(canvas: &mut RgbaImage, viewport: &Viewport, bbox: &BBox, color: Color) {
    // World y grows upwards, screen y downwards: max.y maps to the top row.
    let top_left = viewport.world_to_screen(&Point::new(bbox.min.x, bbox.max.y));
    let bottom_right = viewport.world_to_screen(&Point::new(bbox.max.x, bbox.min.y));
    fill_pixels(
        canvas,
        (top_left.x, top_left.y),
        (bottom_right.x, bottom_right.y),
        color,
    );
}

/// Fill the pixels whose centres fall inside the half-open screen rectangle.
fn fill_pixels(canvas: &mut RgbaImage, from: (f64, f64), to: (f64, f64), color: Color) {
    let clamp = |v: f64, max: u32| -> u32 { v.round().clamp(0.0, f64::from(max)) as u32 };
    let (x0, x1) = (clamp(from.0, canvas.width()), clamp(to.0, canvas.width()));
    let (y0, y1) = (clamp(from.1, canvas.height()), clamp(to.1, canvas.height()));
    for y in y0..y1 {
        for x in x0..x1 {
            let dst = canvas.get_pixel_mut(x, y);
            *dst = blend(*dst, color);
        }
    }
}

/// Source-over compositing with straight alpha.
fn blend(dst: Rgba<u8>, src: Color) -> Rgba<u8> {
    match src.a {
        255 => Rgba(src.to_rgba()),
        0 => dst,
        _ => {
            let sa = f32::from(src.a) / 255.0;
            let da = f32::from(dst[3]) / 255.0;
            let out_a = sa + da * (1.0 - sa);
            let channel = |s: u8, d: u8| -> u8 {
                let v = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
                v.round().clamp(0.0, 255.0) as u8
            };
            Rgba([
                channel(src.r, dst[0]),
                channel(src.g, dst[1]),
                channel(src.b, dst[2]),
                (out_a * 255.0).round() as u8,
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapraster_core::{Feature, MemoryLayer};

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    fn layer_with(features: Vec<Feature>) -> Arc<dyn Layer> {
        Arc::new(MemoryLayer::new("test").with_features(features))
    }

    #[test]
    fn test_renders_png_of_viewport_size() {
        let vp = Viewport::new(Point::new(0.0, 0.0), 1.0, 20.0, 10.0);
        let bytes = SoftwareRenderer::new()
            .render_to_bitmap_stream(&vp, &[])
            .unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let img = decode(&bytes);
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_bounds_feature_is_filled() {
        let red = Color::rgba(255, 0, 0, 255);
        // Left half of a 10x10 world window centred on the origin.
        let feature = Feature::new(Geometry::Bounds(BBox::from_corners(-5.0, -5.0, 0.0, 5.0)))
            .with_style(red);
        let vp = Viewport::new(Point::new(0.0, 0.0), 1.0, 10.0, 10.0);
        let bytes = SoftwareRenderer::new()
            .with_background(Color::rgba(255, 255, 255, 255))
            .render_to_bitmap_stream(&vp, &[layer_with(vec![feature])])
            .unwrap();
        let img = decode(&bytes);
        assert_eq!(img.get_pixel(2, 5).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(7, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_disabled_layer_is_skipped() {
        let layer = MemoryLayer::new("hidden").with_features(vec![Feature::new(
            Geometry::Bounds(BBox::from_corners(-5.0, -5.0, 5.0, 5.0)),
        )
        .with_style(Color::rgba(0, 0, 255, 255))]);
        layer.set_enabled(false);
        let layer: Arc<dyn Layer> = Arc::new(layer);
        let vp = Viewport::new(Point::new(0.0, 0.0), 1.0, 10.0, 10.0);
        let img = decode(
            &SoftwareRenderer::new()
                .render_to_bitmap_stream(&vp, &[layer])
                .unwrap(),
        );
        assert_eq!(img.get_pixel(5, 5).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_viewport_is_an_error() {
        let vp = Viewport::new(Point::new(0.0, 0.0), 1.0, 0.0, 10.0);
        let err = SoftwareRenderer::new()
            .render_to_bitmap_stream(&vp, &[])
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyViewport { .. }));
    }

    #[test]
    fn test_pixel_limit() {
        let vp = Viewport::new(Point::new(0.0, 0.0), 1.0, 100.0, 100.0);
        let err = SoftwareRenderer::new()
            .with_max_pixels(1_000)
            .render_to_bitmap_stream(&vp, &[])
            .unwrap_err();
        assert!(matches!(err, RenderError::TooLarge { width: 100, height: 100, .. }));
    }

    #[test]
    fn test_blend_half_alpha_over_opaque() {
        let out = blend(Rgba([0, 0, 0, 255]), Color::rgba(255, 255, 255, 128));
        assert_eq!(out[3], 255);
        assert!((i32::from(out[0]) - 128).abs() <= 1);
    }
}
