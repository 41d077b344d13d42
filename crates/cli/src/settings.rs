use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use attendance_core::session::session_config::SessionConfig;
use attendance_core::shared::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FRAME_DELAY, DEFAULT_IOU_THRESHOLD, DEFAULT_LOG_PATH,
    DEFAULT_MODEL_PATH,
};

/// Persisted defaults for `attendance run` and `attendance report`.
///
/// Thresholds are stored as whole percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub log_path: PathBuf,
    pub device_index: u32,
    pub confidence: u32,
    pub iou: u32,
    pub frame_delay_ms: u64,
    pub cross_session_dedup: bool,
}

/// Rounds a threshold to the whole percentage stored on disk, never below 1.
pub fn to_percent(value: f64) -> u32 {
    ((value.clamp(0.0, 1.0) * 100.0).round() as u32).max(1)
}

fn from_percent(value: u32) -> f64 {
    value as f64 / 100.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            device_index: 0,
            confidence: to_percent(DEFAULT_CONFIDENCE_THRESHOLD),
            iou: to_percent(DEFAULT_IOU_THRESHOLD),
            frame_delay_ms: DEFAULT_FRAME_DELAY.as_millis() as u64,
            cross_session_dedup: false,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("AttendanceLogger").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("Could not save settings to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("Could not encode settings: {e}"),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            device_index: self.device_index,
            confidence_threshold: from_percent(self.confidence),
            iou_threshold: from_percent(self.iou),
            frame_delay: Duration::from_millis(self.frame_delay_ms),
            cross_session_dedup: self.cross_session_dedup,
        }
    }
}
