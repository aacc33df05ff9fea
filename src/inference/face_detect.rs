// Face detection for the restoration pass, using the UltraFace RFB-320
// detector (320x240 input, per-anchor scores and normalised corner boxes).

use super::onnx::{Normalization, OnnxModel, OutputTensor, image_to_tensor};
use crate::error::InferenceError;
use image::{RgbImage, imageops};

/// Well-known cache filename of the detector weights.
pub const DETECTOR_FILENAME: &str = "version-RFB-320.onnx";

/// Default URL for downloading the UltraFace RFB-320 detector.
pub const DEFAULT_DETECTOR_URL: &str = concat!(
    "https://github.com/onnx/models/raw/main/validated/vision/",
    "body_analysis/ultraface/models/version-RFB-320.onnx"
);

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;

/// A detected face in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with `other`.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x_min = self.x1.max(other.x1);
        let y_min = self.y1.max(other.y1);
        let x_max = self.x2.min(other.x2);
        let y_max = self.y2.min(other.y2);

        if x_max <= x_min || y_max <= y_min {
            return 0.0;
        }

        let intersection = (x_max - x_min) * (y_max - y_min);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

pub trait FaceDetector: Send + Sync {
    /// Returns faces sorted by descending score.
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, InferenceError>;
}

pub struct UltraFaceDetector {
    model: OnnxModel,
    score_threshold: f32,
    iou_threshold: f32,
}

impl UltraFaceDetector {
    pub fn new(model: OnnxModel) -> Self {
        UltraFaceDetector {
            model,
            score_threshold: 0.7,
            iou_threshold: 0.3,
        }
    }
}

impl FaceDetector for UltraFaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, InferenceError> {
        let resized = imageops::resize(
            image,
            INPUT_WIDTH,
            INPUT_HEIGHT,
            imageops::FilterType::Triangle,
        );
        let outputs = self
            .model
            .run(image_to_tensor(&resized, Normalization::ULTRAFACE))?;

        // Tell the two outputs apart by their last dimension: [1, N, 2] / [1, N, 4].
        let find = |last_dim: i64| {
            outputs
                .iter()
                .find(|o| o.shape.len() == 3 && o.shape[2] == last_dim)
                .ok_or_else(|| {
                    InferenceError::new(format!(
                        "{}: no output of shape [1, N, {}]",
                        self.model.name(),
                        last_dim
                    ))
                })
        };
        let scores = find(2)?;
        let boxes = find(4)?;

        let candidates = decode_detections(
            scores,
            boxes,
            image.width(),
            image.height(),
            self.score_threshold,
        )?;
        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Turns raw detector outputs into boxes scaled to `width` x `height`.
pub fn decode_detections(
    scores: &OutputTensor,
    boxes: &OutputTensor,
    width: u32,
    height: u32,
    score_threshold: f32,
) -> Result<Vec<FaceBox>, InferenceError> {
    let anchors = scores.data.len() / 2;
    if boxes.data.len() != anchors * 4 {
        return Err(InferenceError::new(format!(
            "Detector output mismatch: {} scores in '{}' vs {} box values in '{}'",
            scores.data.len(),
            scores.name,
            boxes.data.len(),
            boxes.name
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let mut faces = Vec::new();
    for i in 0..anchors {
        // Column 0 is background, column 1 is face.
        let score = scores.data[i * 2 + 1];
        if score <= score_threshold {
            continue;
        }

        let b = &boxes.data[i * 4..i * 4 + 4];
        let face = FaceBox {
            x1: (b[0] * w).clamp(0.0, w),
            y1: (b[1] * h).clamp(0.0, h),
            x2: (b[2] * w).clamp(0.0, w),
            y2: (b[3] * h).clamp(0.0, h),
            score,
        };
        if face.width() >= 1.0 && face.height() >= 1.0 {
            faces.push(face);
        }
    }
    Ok(faces)
}

/// Greedy NMS: keeps the best box and drops any box overlapping a kept one by
/// more than `iou_threshold`.
pub fn non_max_suppression(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
