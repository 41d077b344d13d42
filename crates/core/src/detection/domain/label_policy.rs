//! Which detections get a name, and which get written to the log.

use crate::shared::detection::{BoundingBox, Detection, UNKNOWN_LABEL};

/// Builds a detection, replacing the class name with `Unknown` when the
/// score is below `confidence_threshold`.
pub fn labeled_detection(
    bbox: BoundingBox,
    confidence: f64,
    class_name: &str,
    confidence_threshold: f64,
) -> Detection {
    let label = if confidence >= confidence_threshold {
        class_name
    } else {
        UNKNOWN_LABEL
    };
    Detection::new(bbox, confidence, label)
}

/// A detection is logged only when it is confident, named, and non-empty.
pub fn is_loggable(detection: &Detection, confidence_threshold: f64) -> bool {
    detection.confidence >= confidence_threshold
        && !detection.is_unknown()
        && !detection.label.trim().is_empty()
}
