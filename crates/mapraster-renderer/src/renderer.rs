use std::sync::Arc;

use thiserror::Error;

use mapraster_core::Layer;

use crate::viewport::Viewport;

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Viewport has no drawable area ({width}x{height} px)")]
    EmptyViewport { width: f64, height: f64 },

    #[error("Viewport of {width}x{height} px exceeds the {limit} pixel limit")]
    TooLarge { width: u32, height: u32, limit: u64 },

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Layer '{layer}' could not be rendered: {message}")]
    Layer { layer: String, message: String },
}

/// Capability that draws layers into an encoded bitmap.
pub trait Renderer: Send + Sync {
    /// Render `layers` as seen through `viewport` and return the encoded image bytes.
    fn render_to_bitmap_stream(
        &self,
        viewport: &Viewport,
        layers: &[Arc<dyn Layer>],
    ) -> Result<Vec<u8>, RenderError>;
}
