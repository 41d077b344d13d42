//! Multi-class YOLO detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference, per-class NMS and mapping
//! class indices to names. Outputs scoring below the session's confidence
//! threshold come back labelled `Unknown`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::detection::domain::label_policy::labeled_detection;
use crate::detection::domain::object_detector::{DetectionThresholds, ObjectDetector};
use crate::shared::detection::{BoundingBox, Detection};
use crate::shared::frame::Frame;

use super::class_names::ClassNames;
use super::execution_provider::preferred_execution_providers;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Candidates scoring below this never leave the adapter, even as `Unknown`.
pub const CANDIDATE_FLOOR: f64 = 0.25;

/// Metadata key YOLO exporters use for the class-name mapping.
const NAMES_METADATA_KEY: &str = "names";

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    class_names: ClassNames,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// Class names come from `labels_path` when given, otherwise from the
    /// model's `names` metadata. The input resolution is read from the
    /// model's NCHW input shape, falling back to 640.
    pub fn new(model_path: &Path, labels_path: Option<&Path>) -> Result<Self, DetectorError> {
        let load_err = |reason: String| DetectorError::ModelLoad {
            path: model_path.to_path_buf(),
            reason,
        };

        if !model_path.exists() {
            return Err(load_err("file not found".into()));
        }

        let session = build_session(model_path).map_err(|e| load_err(e.to_string()))?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let class_names = match labels_path {
            Some(path) => ClassNames::from_labels_file(path)?,
            None => names_from_metadata(&session),
        };
        if class_names.is_empty() {
            log::warn!(
                "No class names for {}; detections will be labelled by index",
                model_path.display()
            );
        }

        log::info!(
            "Loaded detector {} ({} classes, input {input_size}px)",
            model_path.display(),
            class_names.len()
        );

        Ok(Self {
            session,
            class_names,
            input_size,
        })
    }
}

fn build_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

fn names_from_metadata(session: &ort::session::Session) -> ClassNames {
    let raw = session
        .metadata()
        .ok()
        .and_then(|meta| meta.custom(NAMES_METADATA_KEY));
    match raw {
        Some(text) => ClassNames::parse_metadata(&text).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed names metadata: {e}");
            ClassNames::default()
        }),
        None => ClassNames::default(),
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        thresholds: &DetectionThresholds,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(DetectorError::UnexpectedOutput("model produced no outputs".into()).into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectorError::UnexpectedOutput("non-contiguous output".into()))?;

        // 3. Parse candidates
        let candidate_floor = thresholds.confidence.min(CANDIDATE_FLOOR);
        let mut candidates = decode_output(data, &shape, candidate_floor)?;
        for c in &mut candidates {
            c.bbox = unletterbox(&c.bbox, scale, pad_x, pad_y, frame.width(), frame.height());
        }

        // 4. NMS
        let kept = nms(&mut candidates, thresholds.iou);

        // 5. Name
        Ok(kept
            .into_iter()
            .map(|c| {
                labeled_detection(
                    c.bbox,
                    c.confidence,
                    &self.class_names.name(c.class_index),
                    thresholds.confidence,
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding filled with 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

/// Maps a box from letterbox space back to frame pixels, clipped to the frame.
fn unletterbox(
    bbox: &BoundingBox,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
    frame_w: u32,
    frame_h: u32,
) -> BoundingBox {
    let map_x = |v: f64| ((v - pad_x as f64) / scale).clamp(0.0, frame_w as f64);
    let map_y = |v: f64| ((v - pad_y as f64) / scale).clamp(0.0, frame_h as f64);
    BoundingBox::new(map_x(bbox.x1), map_y(bbox.y1), map_x(bbox.x2), map_y(bbox.y2))
}

// ---------------------------------------------------------------------------
// Decoding + NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    bbox: BoundingBox,
    confidence: f64,
    class_index: usize,
}

/// Decodes a `[1, 4 + classes, N]` (or `[1, N, 4 + classes]`) output into
/// candidates whose best class score reaches `floor`.
///
/// Row format: `[cx, cy, w, h, score_0, score_1, ...]` in letterbox pixels.
fn decode_output(data: &[f32], shape: &[usize], floor: f64) -> Result<Vec<Candidate>, DetectorError> {
    if shape.len() != 3 {
        return Err(DetectorError::UnexpectedOutput(format!(
            "expected a 3-D output, got shape {shape:?}"
        )));
    }
    // Feature-major unless the last axis is too short to hold a box row.
    let transposed = shape[1] <= shape[2] || shape[2] < 5;
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Err(DetectorError::UnexpectedOutput(format!(
            "output has {num_feats} features per box, need at least 5"
        )));
    }
    if data.len() < num_dets * num_feats {
        return Err(DetectorError::UnexpectedOutput(format!(
            "output holds {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        )));
    }

    let value = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let mut out = Vec::new();
    for i in 0..num_dets {
        let (class_index, confidence) = (4..num_feats)
            .map(|f| (f - 4, value(i, f)))
            .fold((0, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if confidence.is_nan() || confidence < floor {
            continue;
        }

        let cx = value(i, 0);
        let cy = value(i, 1);
        let w = value(i, 2);
        let h = value(i, 3);
        out.push(Candidate {
            bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            confidence,
            class_index,
        });
    }
    Ok(out)
}

/// Greedy per-class NMS: sort by confidence descending, suppress boxes of
/// the same class overlapping a kept box by more than `iou_thresh`.
fn nms(cands: &mut [Candidate], iou_thresh: f64) -> Vec<Candidate> {
    cands.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; cands.len()];

    for i in 0..cands.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(cands[i].clone());
        for j in (i + 1)..cands.len() {
            if suppressed[j] || cands[j].class_index != cands[i].class_index {
                continue;
            }
            if cands[i].bbox.iou(&cands[j].bbox) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
