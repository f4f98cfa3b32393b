//! Delivery implementations.

mod renderer;

pub use renderer::{HttpRenderer, RenderError, RenderJob};
