//! Full nose validation: the coarse object gate combined with the classifier.

use anyhow::{Context, Result};
use image::DynamicImage;
use noseprint_vision::{
    classifier::DEFAULT_THRESHOLD, DetectedObject, Embedding, EmbeddingExtractor, MediaSource,
    NoseClassifier, NoseScore, ObjectDetector, FAIL_CLOSED_SCORE,
};

use crate::config::Thresholds;

pub const DEFAULT_ATTEMPTS: usize = 2;

/// Passes when any object is labelled as a dog or any object covers at least
/// `min_area_ratio` of the frame. An empty detection set fails.
pub fn object_check(objects: &[DetectedObject], min_area_ratio: f32) -> bool {
    let has_dog_label = objects
        .iter()
        .any(|o| o.label.to_lowercase().contains("dog"));
    let largest = objects
        .iter()
        .map(|o| o.area_ratio)
        .fold(None, |acc: Option<f32>, r| Some(acc.map_or(r, |a| a.max(r))));
    has_dog_label || largest.is_some_and(|r| r >= min_area_ratio)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub score: NoseScore,
    pub object_check: bool,
    pub classifier_check: bool,
}

pub struct NoseValidator<'a> {
    pub media: &'a dyn MediaSource,
    pub classifier: &'a NoseClassifier,
    pub detector: &'a ObjectDetector,
    pub classifier_threshold: NoseScore,
    pub min_area_ratio: f32,
}

impl<'a> NoseValidator<'a> {
    pub fn new(
        media: &'a dyn MediaSource,
        classifier: &'a NoseClassifier,
        detector: &'a ObjectDetector,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            media,
            classifier,
            detector,
            classifier_threshold: thresholds.validator_classifier,
            min_area_ratio: thresholds.min_object_area_ratio,
        }
    }

    /// A detector that fails (or is not loaded) waives the object check; a
    /// detector that runs and finds nothing fails it.
    pub fn check_image(&self, img: &DynamicImage) -> Verdict {
        let (objects, object_ok) = match self.detector.try_detect(img) {
            Ok(objects) => {
                let passed = object_check(&objects, self.min_area_ratio);
                (objects, passed)
            }
            Err(e) => {
                log::warn!("object detection unavailable, skipping object check: {}", e);
                (Vec::new(), true)
            }
        };

        let (is_nose, score) = self.classifier.is_nose(img, DEFAULT_THRESHOLD);
        let classifier_check = is_nose && score <= self.classifier_threshold;

        log::debug!(
            "objects={} object_check={} score={:.3} classifier_check={}",
            objects.len(),
            object_ok,
            score,
            classifier_check
        );

        Verdict {
            accepted: object_ok && classifier_check,
            score,
            object_check: object_ok,
            classifier_check,
        }
    }

    /// `(accepted, score)` for a reference; unreadable images are rejected
    /// with the fail-closed score.
    pub fn validate(&self, reference: &str) -> (bool, NoseScore) {
        match self.media.load(reference) {
            Ok(img) => {
                let verdict = self.check_image(&img);
                (verdict.accepted, verdict.score)
            }
            Err(e) => {
                log::warn!("validate {}: {}", reference, e);
                (false, FAIL_CLOSED_SCORE)
            }
        }
    }

    /// Decode, validate and embed one image. Decode errors are retried up to
    /// `max_attempts` times; a rejection or an embedding failure is final.
    pub fn process_safely(
        &self,
        reference: &str,
        extractor: &EmbeddingExtractor,
        max_attempts: usize,
    ) -> Result<(Embedding, NoseScore)> {
        let mut last_err = None;
        for attempt in 1..=max_attempts.max(1) {
            let img = match self.media.load(reference) {
                Ok(img) => img,
                Err(e) => {
                    log::warn!("{}: attempt {} failed: {}", reference, attempt, e);
                    last_err = Some(e);
                    continue;
                }
            };

            let verdict = self.check_image(&img);
            if !verdict.accepted {
                anyhow::bail!("validation failed (score={:.3})", verdict.score);
            }

            let embedding = extractor
                .try_embed(&img)
                .context("embedding computation failed")?;
            return Ok((embedding, verdict.score));
        }

        Err(match last_err {
            Some(e) => anyhow::Error::new(e).context(format!("processing {}", reference)),
            None => anyhow::anyhow!("unknown processing failure for {}", reference),
        })
    }
}
