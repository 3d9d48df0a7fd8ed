#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use image::{Rgb, RgbImage};
use ndarray::Array4;
use noseprint::{
    config::Config, media::FileMedia, model::InferenceModel, model::TensorOutput,
    storage::FileStore, EmbeddingExtractor, NoseApp, NoseClassifier, ObjectDetector,
};
use noseprint_vision::{DetectorSettings, EMBEDDING_DIM};

/// Scores an image by its top-left red value: black is a perfect nose,
/// white is certainly not.
pub struct BrightnessScore;

impl InferenceModel for BrightnessScore {
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        Ok(vec![TensorOutput::new(
            vec![1, 1],
            vec![input[[0, 0, 0, 0]] / 255.0],
        )])
    }
}

/// Always returns the same single output tensor.
pub struct Fixed(pub Vec<f32>);

impl InferenceModel for Fixed {
    fn run(&mut self, _input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        Ok(vec![TensorOutput::new(
            vec![1, self.0.len() as i64],
            self.0.clone(),
        )])
    }
}

/// Embeds the first normalized pixel value into component 0, with a
/// constant 1.0 in component 1.
pub struct PixelEmbedding;

impl InferenceModel for PixelEmbedding {
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        Ok(vec![TensorOutput::new(
            vec![1, EMBEDDING_DIM as i64],
            pixel_embedding_raw(input[[0, 0, 0, 0]]),
        )])
    }
}

pub fn pixel_embedding_raw(value: f32) -> Vec<f32> {
    let mut raw = vec![0.0; EMBEDDING_DIM];
    raw[0] = value;
    raw[1] = 1.0;
    raw
}

pub struct Failing;

impl InferenceModel for Failing {
    fn run(&mut self, _input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        anyhow::bail!("delegate error")
    }
}

/// SSD stub that never finds anything.
pub struct NoObjects;

impl InferenceModel for NoObjects {
    fn run(&mut self, _input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        Ok(vec![
            TensorOutput::new(vec![1, 0, 4], vec![]),
            TensorOutput::new(vec![1, 0], vec![]),
            TensorOutput::new(vec![1, 0], vec![]),
        ])
    }
}

/// SSD stub reporting one box of class 0 covering `side * side` of the frame.
pub struct OneBox(pub f32);

impl InferenceModel for OneBox {
    fn run(&mut self, _input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        Ok(vec![
            TensorOutput::new(vec![1, 1, 4], vec![0.0, 0.0, self.0, self.0]),
            TensorOutput::new(vec![1, 1], vec![0.0]),
            TensorOutput::new(vec![1, 1], vec![0.9]),
        ])
    }
}

pub fn unit(index: usize, sign: f32) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[index] = sign;
    v
}

pub fn app_with(
    dir: &Path,
    classifier: Box<dyn InferenceModel>,
    embedder: Box<dyn InferenceModel>,
) -> Result<NoseApp> {
    app_with_detector(
        dir,
        classifier,
        embedder,
        ObjectDetector::with_model(Box::new(NoObjects), vec![], DetectorSettings::default()),
    )
}

pub fn app_with_detector(
    dir: &Path,
    classifier: Box<dyn InferenceModel>,
    embedder: Box<dyn InferenceModel>,
    detector: ObjectDetector,
) -> Result<NoseApp> {
    let mut config = Config::default();
    config.store_dir = dir.join("store");
    let store = FileStore::open(&config.store_dir)?;
    Ok(NoseApp::from_parts(
        config,
        Box::new(store),
        Box::new(FileMedia::default()),
        NoseClassifier::with_model(classifier),
        EmbeddingExtractor::with_model(embedder),
        detector,
    ))
}

/// Write a solid grey PNG and return its path as a reference.
pub fn grey_image(dir: &Path, name: &str, level: u8) -> String {
    let path = dir.join(name);
    RgbImage::from_pixel(32, 32, Rgb([level, level, level]))
        .save(&path)
        .unwrap();
    path.to_string_lossy().into_owned()
}
