pub mod blazeface_locator;
pub mod execution_provider;
pub mod onnx_face_mesh_detector;
