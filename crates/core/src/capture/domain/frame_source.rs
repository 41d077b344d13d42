use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not open capture device {device}: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("capture device is not open")]
    NotOpened,
}

/// What the device reported when it was opened.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureInfo {
    /// Human-readable device locator, e.g. `/dev/video0`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate; 0 when the source has none.
    pub fps: f64,
}

/// Yields successive frames from a capture device.
///
/// `read` blocks until the next frame is available. `Ok(None)` means the
/// stream ended cleanly. `release` must be safe to call more than once and
/// on a source that never opened.
pub trait FrameSource: Send {
    fn open(&mut self, device_index: u32) -> Result<CaptureInfo, CaptureError>;

    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    fn release(&mut self);
}
