use std::path::Path;

use image::DynamicImage;

use crate::error::{VisionError, VisionResult};
use crate::model::{InferenceModel, ModelSlot, OrtModel};
use crate::preprocess::{preprocess, Variant};

/// Length of the nose print produced by the embedding model.
pub const EMBEDDING_DIM: usize = 128;

const NORM_EPSILON: f32 = 1e-12;

/// Nose print feature vector.
///
/// Vectors produced by [`EmbeddingExtractor`] are unit length. Vectors read
/// back from storage are taken as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embedding {
    vector: Vec<f32>,
}

impl Embedding {
    /// L2-normalize a raw model output.
    pub fn normalized(raw: Vec<f32>) -> Self {
        let mut vector = raw;
        l2_normalize(&mut vector);
        Self { vector }
    }

    pub fn from_vec(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.vector
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.vector)
    }

    pub fn distance(&self, other: &Embedding) -> f32 {
        euclidean_distance(&self.vector, &other.vector)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divide every component by `max(norm, 1e-12)`.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v).max(NORM_EPSILON);
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Plain L2 distance over the first `min(a.len(), b.len())` components.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Produces nose prints from images.
pub struct EmbeddingExtractor {
    slot: ModelSlot,
}

impl EmbeddingExtractor {
    pub fn load(path: &Path, num_threads: usize) -> Self {
        let slot = ModelSlot::empty("nose-embedder");
        if slot.load(|| OrtModel::boxed(path, num_threads)).is_err() {
            log::warn!(
                "embedding model unavailable ({}), registration and identification disabled",
                path.display()
            );
        }
        Self { slot }
    }

    pub fn with_model(model: Box<dyn InferenceModel>) -> Self {
        Self {
            slot: ModelSlot::with_model("nose-embedder", model),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_loaded()
    }

    pub fn try_embed(&self, img: &DynamicImage) -> VisionResult<Embedding> {
        if !self.slot.is_loaded() {
            return Err(VisionError::ModelUnavailable(
                "embedding model not loaded".into(),
            ));
        }
        let input = preprocess(img, Variant::Embedding)?;
        let outputs = self.slot.infer(input)?;

        let raw = outputs
            .into_iter()
            .next()
            .map(|t| t.data)
            .ok_or_else(|| VisionError::InferenceFailed("no embedding output".into()))?;
        if raw.len() != EMBEDDING_DIM {
            return Err(VisionError::InferenceFailed(format!(
                "expected {}-dim embedding, got {}",
                EMBEDDING_DIM,
                raw.len()
            )));
        }

        if let Some(i) = raw.iter().position(|v| !v.is_finite()) {
            return Err(VisionError::InferenceFailed(format!(
                "non-finite embedding component at {}: {}",
                i, raw[i]
            )));
        }
        let norm = l2_norm(&raw);
        if !norm.is_finite() {
            return Err(VisionError::InferenceFailed(format!(
                "embedding norm overflowed: {}",
                norm
            )));
        }

        Ok(Embedding::normalized(raw))
    }

    /// `None` on any failure; the caller treats that as a hard stop.
    pub fn embed(&self, img: &DynamicImage) -> Option<Embedding> {
        match self.try_embed(img) {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                log::error!("embedding failed: {}", e);
                None
            }
        }
    }

    pub fn close(&self) {
        self.slot.close();
    }
}
