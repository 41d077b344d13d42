pub mod class_names;
pub mod execution_provider;
pub mod onnx_yolo_detector;
