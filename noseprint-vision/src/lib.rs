pub mod classifier;
pub mod detector;
pub mod embedding;
pub mod error;
pub mod media;
pub mod model;
pub mod preprocess;
pub mod video;

// Re-export commonly used types
pub use classifier::{NoseClassifier, NoseScore, FAIL_CLOSED_SCORE};
pub use detector::{DetectedObject, DetectorSettings, ObjectDetector};
pub use embedding::{Embedding, EmbeddingExtractor, EMBEDDING_DIM};
pub use error::{VisionError, VisionResult};
pub use media::{FileMedia, MediaSource};
pub use model::{InferenceModel, ModelSlot, OrtModel, TensorOutput};
pub use video::Camera;
