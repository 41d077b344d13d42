use crate::capture::domain::frame_source::{CaptureError, CaptureInfo, FrameSource};
use crate::shared::frame::Frame;

/// Reads a live camera through libavdevice (v4l2, avfoundation or dshow).
///
/// Each decoded picture is converted to RGB24 and wrapped in a [`Frame`].
pub struct FfmpegCameraSource {
    device_override: Option<String>,
    stream: Option<CameraStream>,
}

// Safety: FfmpegCameraSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCameraSource {}

struct CameraStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
}

impl FfmpegCameraSource {
    pub fn new() -> Self {
        Self {
            device_override: None,
            stream: None,
        }
    }

    /// Opens `device` verbatim instead of deriving a locator from the index.
    ///
    /// Required on Windows, where dshow addresses cameras by name
    /// (`video=Integrated Camera`).
    pub fn with_device(device: impl Into<String>) -> Self {
        Self {
            device_override: Some(device.into()),
            stream: None,
        }
    }

    fn locator(&self, device_index: u32) -> Result<String, CaptureError> {
        if let Some(ref device) = self.device_override {
            return Ok(device.clone());
        }
        device_locator(device_index).ok_or_else(|| CaptureError::DeviceUnavailable {
            device: device_index.to_string(),
            reason: format!("{DEVICE_FORMAT} needs an explicit device name"),
        })
    }
}

impl Default for FfmpegCameraSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
const DEVICE_FORMAT: &str = "v4l2";
#[cfg(target_os = "macos")]
const DEVICE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const DEVICE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DEVICE_FORMAT: &str = "v4l2";

/// Maps a numeric camera index to what the platform input format expects.
fn device_locator(device_index: u32) -> Option<String> {
    if cfg!(target_os = "macos") {
        Some(device_index.to_string())
    } else if cfg!(target_os = "windows") {
        None
    } else {
        Some(format!("/dev/video{device_index}"))
    }
}

/// Finds the libavdevice input format registered under `name`.
///
/// Registered names may be comma-separated aliases (`video4linux2,v4l2`).
fn find_input_format(name: &str) -> Option<ffmpeg_next::format::format::Input> {
    ffmpeg_next::device::input::video().find(|fmt| fmt.name().split(',').any(|n| n == name))
}

fn unavailable(device: &str, reason: impl ToString) -> CaptureError {
    CaptureError::DeviceUnavailable {
        device: device.to_string(),
        reason: reason.to_string(),
    }
}

fn open_stream(device: &str) -> Result<(CameraStream, CaptureInfo), CaptureError> {
    ffmpeg_next::init().map_err(|e| unavailable(device, e))?;
    ffmpeg_next::device::register_all();

    let format = find_input_format(DEVICE_FORMAT)
        .ok_or_else(|| unavailable(device, format!("{DEVICE_FORMAT} input not available")))?;

    let ctx = ffmpeg_next::format::open_with(
        &device,
        &ffmpeg_next::format::format::Format::Input(format),
        ffmpeg_next::Dictionary::new(),
    )
    .map_err(|e| unavailable(device, e))?;
    let ictx = match ctx {
        ffmpeg_next::format::context::Context::Input(ictx) => ictx,
        ffmpeg_next::format::context::Context::Output(_) => {
            return Err(unavailable(device, "opened as an output"));
        }
    };

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| unavailable(device, "no video stream"))?;
    let stream_index = stream.index();

    let rate = stream.rate();
    let fps = if rate.denominator() != 0 {
        rate.numerator() as f64 / rate.denominator() as f64
    } else {
        0.0
    };

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| unavailable(device, e))?;
    let decoder = codec_ctx
        .decoder()
        .video()
        .map_err(|e| unavailable(device, e))?;

    let width = decoder.width();
    let height = decoder.height();

    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| unavailable(device, e))?;

    let info = CaptureInfo {
        device: device.to_string(),
        width,
        height,
        fps,
    };
    let camera = CameraStream {
        ictx,
        decoder,
        scaler,
        stream_index,
        width,
        height,
        frame_index: 0,
    };
    Ok((camera, info))
}

impl CameraStream {
    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                return Err(stream_ended());
            };
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }
}

/// A live camera has no natural end; running out of packets means the
/// device went away.
fn stream_ended() -> CaptureError {
    CaptureError::Read("camera stopped delivering frames".into())
}

/// Copies RGB24 rows out of a frame whose stride may include padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}

impl FrameSource for FfmpegCameraSource {
    fn open(&mut self, device_index: u32) -> Result<CaptureInfo, CaptureError> {
        self.release();
        let device = self.locator(device_index)?;
        let (stream, info) = open_stream(&device)?;
        log::info!(
            "Opened camera {} ({}x{} @ {:.1} fps)",
            info.device,
            info.width,
            info.height,
            info.fps
        );
        self.stream = Some(stream);
        Ok(info)
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.stream
            .as_mut()
            .ok_or(CaptureError::NotOpened)?
            .next_frame()
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Released camera");
        }
    }
}
