//! General object detector used as a coarse "is there a dog in frame" gate.
//!
//! Expects an SSD-style network with NHWC float input in [0, 255] and three
//! outputs in this order:
//! - boxes: [1, N, 4] as (ymin, xmin, ymax, xmax), normalized to [0, 1]
//! - classes: [1, N] class ids
//! - scores: [1, N] confidences
//!
//! Any trailing outputs (e.g. a detection count) are ignored. Because boxes
//! are normalized to the stretched input, a box's area is directly its share
//! of the original frame.

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::error::{VisionError, VisionResult};
use crate::model::{InferenceModel, ModelSlot, OrtModel, TensorOutput};
use crate::preprocess::to_nhwc;

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    /// Bounding box area divided by image area.
    pub area_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub input_size: u32,
    /// Detections below this confidence are discarded before NMS.
    pub score_floor: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            input_size: 300,
            score_floor: 0.3,
            iou_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct RawBox {
    class_id: usize,
    score: f32,
    bbox: [f32; 4], // ymin, xmin, ymax, xmax
}

pub struct ObjectDetector {
    slot: ModelSlot,
    labels: Vec<String>,
    settings: DetectorSettings,
}

impl ObjectDetector {
    /// A detector whose model or labels fail to load still works: it just
    /// detects nothing.
    pub fn load(
        model_path: &Path,
        labels_path: &Path,
        settings: DetectorSettings,
        num_threads: usize,
    ) -> Self {
        let slot = ModelSlot::empty("object-detector");
        if slot.load(|| OrtModel::boxed(model_path, num_threads)).is_err() {
            log::warn!(
                "object detector unavailable ({}), object check degrades to empty results",
                model_path.display()
            );
        }
        let labels = load_labels(labels_path).unwrap_or_else(|e| {
            log::warn!("{:#}", e);
            Vec::new()
        });
        Self {
            slot,
            labels,
            settings,
        }
    }

    pub fn with_model(
        model: Box<dyn InferenceModel>,
        labels: Vec<String>,
        settings: DetectorSettings,
    ) -> Self {
        Self {
            slot: ModelSlot::with_model("object-detector", model),
            labels,
            settings,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_loaded()
    }

    /// Detect objects. Failures degrade to an empty result.
    pub fn detect(&self, img: &DynamicImage) -> Vec<DetectedObject> {
        match self.try_detect(img) {
            Ok(objects) => objects,
            Err(e) => {
                log::warn!("object detection failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn try_detect(&self, img: &DynamicImage) -> VisionResult<Vec<DetectedObject>> {
        if !self.slot.is_loaded() {
            return Err(VisionError::ModelUnavailable(
                "object detector not loaded".into(),
            ));
        }
        let input = to_nhwc(img, self.settings.input_size, |v| v as f32)?;
        let outputs = self.slot.infer(input)?;
        decode_ssd(&outputs, &self.labels, &self.settings)
    }

    pub fn close(&self) {
        self.slot.close();
    }
}

/// One label per line; line number is the class id.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading labels {}", path.display()))?;
    Ok(raw.lines().map(|l| l.trim().to_string()).collect())
}

/// Turn raw SSD outputs into labelled objects.
pub fn decode_ssd(
    outputs: &[TensorOutput],
    labels: &[String],
    settings: &DetectorSettings,
) -> VisionResult<Vec<DetectedObject>> {
    let [boxes, classes, scores] = match outputs {
        [b, c, s, ..] => [b, c, s],
        _ => {
            return Err(VisionError::InferenceFailed(format!(
                "expected at least 3 detector outputs, got {}",
                outputs.len()
            )))
        }
    };

    let count = scores.data.len();
    if classes.data.len() < count || boxes.data.len() < count * 4 {
        return Err(VisionError::InferenceFailed(format!(
            "inconsistent detector outputs: {} scores, {} classes, {} box values",
            count,
            classes.data.len(),
            boxes.data.len()
        )));
    }

    let raw: Vec<RawBox> = (0..count)
        .filter(|&i| scores.data[i] >= settings.score_floor)
        .map(|i| {
            let b = &boxes.data[i * 4..i * 4 + 4];
            RawBox {
                class_id: classes.data[i].max(0.0) as usize,
                score: scores.data[i],
                bbox: [
                    b[0].clamp(0.0, 1.0),
                    b[1].clamp(0.0, 1.0),
                    b[2].clamp(0.0, 1.0),
                    b[3].clamp(0.0, 1.0),
                ],
            }
        })
        .collect();

    let kept = nms(&raw, settings.iou_threshold);

    Ok(kept
        .into_iter()
        .map(|d| DetectedObject {
            label: labels
                .get(d.class_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            confidence: d.score,
            area_ratio: box_area(&d.bbox),
        })
        .collect())
}

fn box_area(b: &[f32; 4]) -> f32 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// Class-agnostic non-maximum suppression.
fn nms(detections: &[RawBox], iou_threshold: f32) -> Vec<RawBox> {
    if detections.is_empty() {
        return vec![];
    }

    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; sorted.len()];

    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(sorted[i].clone());

        for j in (i + 1)..sorted.len() {
            if suppressed[j] {
                continue;
            }
            if compute_iou(&sorted[i].bbox, &sorted[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let y1 = a[0].max(b[0]);
    let x1 = a[1].max(b[1]);
    let y2 = a[2].min(b[2]);
    let x2 = a[3].min(b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (box_area(a) + box_area(b) - inter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["person".into(), "Dog".into(), "cat".into()]
    }

    fn outputs(dets: &[([f32; 4], f32, f32)]) -> Vec<TensorOutput> {
        let n = dets.len() as i64;
        vec![
            TensorOutput::new(
                vec![1, n, 4],
                dets.iter().flat_map(|d| d.0).collect(),
            ),
            TensorOutput::new(vec![1, n], dets.iter().map(|d| d.1).collect()),
            TensorOutput::new(vec![1, n], dets.iter().map(|d| d.2).collect()),
            TensorOutput::new(vec![1], vec![n as f32]),
        ]
    }

    #[test]
    fn test_iou() {
        let a = [0.1, 0.1, 0.3, 0.3];
        let b = [0.15, 0.15, 0.35, 0.35];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = [0.8, 0.8, 0.9, 0.9];
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_decode_labels_and_area() {
        let out = outputs(&[([0.0, 0.0, 0.5, 0.5], 1.0, 0.9)]);
        let objects = decode_ssd(&out, &labels(), &DetectorSettings::default()).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].label, "Dog");
        assert_eq!(objects[0].area_ratio, 0.25);
    }

    #[test]
    fn test_decode_drops_low_confidence_and_overlaps() {
        let out = outputs(&[
            ([0.1, 0.1, 0.6, 0.6], 0.0, 0.8),
            ([0.12, 0.12, 0.6, 0.6], 2.0, 0.7),
            ([0.7, 0.7, 0.9, 0.9], 2.0, 0.6),
            ([0.0, 0.0, 1.0, 1.0], 1.0, 0.1),
        ]);
        let objects = decode_ssd(&out, &labels(), &DetectorSettings::default()).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(names, vec!["person", "cat"]);
    }

    #[test]
    fn test_unknown_class_gets_placeholder_label() {
        let out = outputs(&[([0.0, 0.0, 0.1, 0.1], 42.0, 0.9)]);
        let objects = decode_ssd(&out, &labels(), &DetectorSettings::default()).unwrap();
        assert_eq!(objects[0].label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_malformed_outputs_are_errors() {
        let out = vec![TensorOutput::new(vec![1], vec![0.0])];
        assert!(decode_ssd(&out, &labels(), &DetectorSettings::default()).is_err());
    }

    #[test]
    fn test_missing_model_detects_nothing() {
        let detector = ObjectDetector::load(
            Path::new("/nonexistent/detector.onnx"),
            Path::new("/nonexistent/labels.txt"),
            DetectorSettings::default(),
            1,
        );
        let img = DynamicImage::new_rgb8(32, 32);
        assert!(!detector.is_ready());
        assert!(detector.detect(&img).is_empty());
    }
}
