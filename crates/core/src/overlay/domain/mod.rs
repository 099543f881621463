pub mod canvas;
pub mod overlay_renderer;
pub mod overlay_style;
pub mod presenter;
pub mod transform;
