pub mod cancellation;
pub mod frame_clock;
pub mod lifecycle;
pub mod lifecycle_controller;
pub mod render_loop;
