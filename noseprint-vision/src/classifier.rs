use std::path::Path;

use image::DynamicImage;

use crate::error::{VisionError, VisionResult};
use crate::model::{InferenceModel, ModelSlot, OrtModel};
use crate::preprocess::{preprocess, Variant};

/// Classifier output in [0, 1]: 0.0 is strongly nose-like, 1.0 is strongly
/// not a nose. Thresholds downstream depend on this polarity.
pub type NoseScore = f32;

/// Score reported whenever the classifier cannot produce one.
pub const FAIL_CLOSED_SCORE: NoseScore = 1.0;

pub const DEFAULT_THRESHOLD: NoseScore = 0.5;

/// Binary "is this a dog nose" classifier.
pub struct NoseClassifier {
    slot: ModelSlot,
}

impl NoseClassifier {
    /// Load from an ONNX file. A failed load leaves the classifier in a
    /// degraded state where every image scores [`FAIL_CLOSED_SCORE`].
    pub fn load(path: &Path, num_threads: usize) -> Self {
        let slot = ModelSlot::empty("nose-classifier");
        if slot.load(|| OrtModel::boxed(path, num_threads)).is_err() {
            log::warn!(
                "nose classifier unavailable ({}), all images will be rejected",
                path.display()
            );
        }
        Self { slot }
    }

    pub fn with_model(model: Box<dyn InferenceModel>) -> Self {
        Self {
            slot: ModelSlot::with_model("nose-classifier", model),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_loaded()
    }

    /// Raw model score, with failures reported.
    pub fn score(&self, img: &DynamicImage) -> VisionResult<NoseScore> {
        if !self.slot.is_loaded() {
            return Err(VisionError::ModelUnavailable(
                "nose classifier not loaded".into(),
            ));
        }
        let input = preprocess(img, Variant::Classifier)?;
        let outputs = self.slot.infer(input)?;

        // Output is [1, 1], sigmoid already applied by the model
        let score = outputs
            .first()
            .and_then(|t| t.data.first())
            .copied()
            .ok_or_else(|| VisionError::InferenceFailed("empty classifier output".into()))?;
        if score.is_nan() {
            return Err(VisionError::InferenceFailed(
                "classifier produced NaN".into(),
            ));
        }
        Ok(score)
    }

    /// Fail-closed score: any failure is reported as [`FAIL_CLOSED_SCORE`].
    pub fn classify(&self, img: &DynamicImage) -> NoseScore {
        match self.score(img) {
            Ok(score) => score,
            Err(e) => {
                log::warn!("classification failed, rejecting image: {}", e);
                FAIL_CLOSED_SCORE
            }
        }
    }

    /// `(score <= threshold, score)`.
    pub fn is_nose(&self, img: &DynamicImage, threshold: NoseScore) -> (bool, NoseScore) {
        let score = self.classify(img);
        (score <= threshold, score)
    }

    pub fn close(&self) {
        self.slot.close();
    }
}
