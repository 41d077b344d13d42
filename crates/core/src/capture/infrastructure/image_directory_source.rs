use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{CaptureError, CaptureInfo, FrameSource};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays the still images in a directory as if they came from a camera.
///
/// Files are yielded in file-name order; the stream ends after the last
/// one. The device index passed to `open` is ignored.
pub struct ImageDirectorySource {
    dir: PathBuf,
    pending: Vec<PathBuf>,
    next_index: usize,
    opened: bool,
}

impl ImageDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pending: Vec::new(),
            next_index: 0,
            opened: false,
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}

impl FrameSource for ImageDirectorySource {
    fn open(&mut self, _device_index: u32) -> Result<CaptureInfo, CaptureError> {
        let device = self.dir.display().to_string();
        let paths = list_images(&self.dir).map_err(|e| CaptureError::DeviceUnavailable {
            device: device.clone(),
            reason: e.to_string(),
        })?;
        if paths.is_empty() {
            return Err(CaptureError::DeviceUnavailable {
                device,
                reason: "no images found".into(),
            });
        }

        let (width, height) = image::image_dimensions(&paths[0])
            .map_err(|e| CaptureError::Decode(format!("{}: {e}", paths[0].display())))?;

        log::info!("Replaying {} images from {device}", paths.len());
        self.pending = paths;
        self.pending.reverse();
        self.next_index = 0;
        self.opened = true;

        Ok(CaptureInfo {
            device,
            width,
            height,
            fps: 0.0,
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.opened {
            return Err(CaptureError::NotOpened);
        }
        let Some(path) = self.pending.pop() else {
            return Ok(None);
        };
        let img = image::open(&path)
            .map_err(|e| CaptureError::Decode(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let frame = Frame::from_rgb_image(img, self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.pending.clear();
        self.opened = false;
    }
}
