use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Thresholds handed to the detector with every frame.
///
/// Both values are expected in `(0, 1]`; see
/// [`SessionConfig::validate`](crate::session::session_config::SessionConfig::validate).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionThresholds {
    pub confidence: f64,
    pub iou: f64,
}

/// Domain interface for the object/face classifier.
///
/// Implementations must label any output scoring below
/// `thresholds.confidence` as [`UNKNOWN_LABEL`](crate::shared::detection::UNKNOWN_LABEL)
/// instead of dropping it, so the box is still drawn.
pub trait ObjectDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        thresholds: &DetectionThresholds,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
