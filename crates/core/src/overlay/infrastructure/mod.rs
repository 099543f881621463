pub mod bitmap_font;
pub mod image_sequence_presenter;
pub mod raster_canvas;
