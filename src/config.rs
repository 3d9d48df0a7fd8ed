use anyhow::{Context, Result};
use directories::ProjectDirs;
use noseprint_vision::DetectorSettings;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "noseprint", "noseprint")
}

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("NOSEPRINT_CONFIG_PATH") {
    Some(p) => PathBuf::from(p),
    None => project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("noseprint.toml")),
});

pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| match option_env!("NOSEPRINT_DATA_DIR") {
    Some(p) => PathBuf::from(p),
    None => project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("noseprint-data")),
});

/// Calibrated cutoffs. The two classifier gates (0.5 and 0.20) come from
/// separate call sites and are kept independent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Identification succeeds only when the nearest distance is strictly below this.
    pub match_distance: f32,
    /// Identification query is rejected as "not a nose" above this score.
    pub identify_nose: f32,
    /// Registration images pass when their score is at or below this.
    pub register_nose: f32,
    /// Stricter classifier bound used by the full object + classifier gate.
    pub validator_classifier: f32,
    pub min_object_area_ratio: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            match_distance: 0.75,
            identify_nose: 0.5,
            register_nose: 0.5,
            validator_classifier: 0.20,
            min_object_area_ratio: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier_model: PathBuf,
    pub embedding_model: PathBuf,
    pub detector_model: PathBuf,
    pub detector_labels: PathBuf,
    pub detector_input_size: u32,
    pub detector_score_floor: f32,
    pub store_dir: PathBuf,
    pub capture_dir: PathBuf,
    pub camera: String,
    pub num_threads: usize,
    pub max_image_dimension: u32,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        let models = DATA_DIR.join("models");
        let detector = DetectorSettings::default();
        Self {
            classifier_model: models.join("dog_nose_classifier.onnx"),
            embedding_model: models.join("dog_nose_model.onnx"),
            detector_model: models.join("object_detector.onnx"),
            detector_labels: models.join("object_labels.txt"),
            detector_input_size: detector.input_size,
            detector_score_floor: detector.score_floor,
            store_dir: DATA_DIR.join("store"),
            capture_dir: DATA_DIR.join("captures"),
            camera: "/dev/video0".to_string(),
            num_threads: 2,
            max_image_dimension: noseprint_vision::media::DEFAULT_MAX_DIMENSION,
            thresholds: Thresholds::default(),
        }
    }
}

impl Config {
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            input_size: self.detector_input_size,
            score_floor: self.detector_score_floor,
            ..DetectorSettings::default()
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
