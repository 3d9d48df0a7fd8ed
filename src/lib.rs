pub mod app;
pub mod codec;
pub mod config;
pub mod evaluation;
pub mod matcher;
pub mod profile;
pub mod registration;
pub mod storage;
pub mod validation;

// Re-export vision types for convenience
pub use noseprint_vision::{
    classifier, detector, embedding, media, model, preprocess, video, Embedding,
    EmbeddingExtractor, NoseClassifier, NoseScore, ObjectDetector, VisionError,
};

pub use app::NoseApp;
pub use matcher::MatchOutcome;
pub use profile::{DogDetails, DogProfile};
