use std::time::Duration;

pub const DEFAULT_MODEL_PATH: &str = "largemodel3.onnx";
pub const DEFAULT_LOG_PATH: &str = "detection_log.csv";

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Pause between frames so capture, inference and rendering don't spin.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Header row of the attendance log, in column order.
pub const LOG_HEADER: [&str; 3] = ["Label", "Date", "Timestamp"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
