use thiserror::Error;

/// Failure kinds surfaced by the vision components.
///
/// Callers never see a distinction between a model that was never loaded
/// and one that failed at runtime beyond the variant itself; the public
/// scoring APIs fold all of these into their fail-closed or absent results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisionError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

pub type VisionResult<T> = std::result::Result<T, VisionError>;
