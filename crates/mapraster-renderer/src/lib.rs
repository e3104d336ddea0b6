//! # Mapraster Renderer
//!
//! The viewport descriptor used to define a rendering window, the `Renderer`
//! capability that turns layers into encoded bitmaps, and a CPU
//! implementation of it.

pub mod viewport;
pub mod renderer;
pub mod software;

pub use renderer::{RenderError, Renderer};
pub use software::SoftwareRenderer;
pub use viewport::Viewport;
