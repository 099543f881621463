pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const FACE_MESH_MODEL_NAME: &str = "face_mesh_192.onnx";

/// Preferred capture resolution; devices that reject it keep their default.
pub const IDEAL_CAPTURE_WIDTH: u32 = 1280;
pub const IDEAL_CAPTURE_HEIGHT: u32 = 720;

/// Display refresh cadence the render loop is paced to.
pub const DEFAULT_REFRESH_HZ: f64 = 60.0;

/// How long to wait for the camera's first decoded frame.
pub const FIRST_FRAME_TIMEOUT_SECS: u64 = 10;

/// Accepted render loop rates.
pub const MIN_REFRESH_HZ: f64 = 1.0;
pub const MAX_REFRESH_HZ: f64 = 1000.0;

/// Log lines emitted by ONNX Runtime during session construction that carry
/// no actionable information.
pub const NOISY_ENGINE_INIT_LOGS: &[&str] = &[
    "Some nodes were not assigned to the preferred execution providers",
    "Rerunning with verbose output on a non-minimal build will show node assignments",
    "number of partitions supported by CoreML",
];

pub const STATUS_INITIALIZING: &str = "Initializing AI Model...";
pub const STATUS_ACCESSING_CAMERA: &str = "Accessing Camera...";
pub const STATUS_ACTIVE: &str = "AI Core Online";
pub const MESSAGE_INIT_FAILED: &str =
    "Failed to initialize AI model. Please check your connection.";
pub const MESSAGE_CAMERA_FAILED: &str =
    "Webcam access denied. Please enable camera permissions.";
