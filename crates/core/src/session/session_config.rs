use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::object_detector::DetectionThresholds;
use crate::shared::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FRAME_DELAY, DEFAULT_IOU_THRESHOLD,
};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("confidence threshold must be in (0, 1], got {0}")]
    ConfidenceThreshold(f64),
    #[error("IoU threshold must be in (0, 1], got {0}")]
    IouThreshold(f64),
}

/// Parameters of one detection session. Fixed once the session starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub device_index: u32,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub frame_delay: Duration,
    /// Seed the dedup tracker from records already logged today.
    pub cross_session_dedup: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            frame_delay: DEFAULT_FRAME_DELAY,
            cross_session_dedup: false,
        }
    }
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !in_unit_interval(self.confidence_threshold) {
            return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
        }
        if !in_unit_interval(self.iou_threshold) {
            return Err(ConfigError::IouThreshold(self.iou_threshold));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> DetectionThresholds {
        DetectionThresholds {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
        }
    }
}
