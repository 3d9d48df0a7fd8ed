use std::path::Path;

use anyhow::Result;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageDecoder, ImageReader};

use crate::error::{VisionError, VisionResult};

/// Longest side, in pixels, of images handed to the pipeline.
pub const DEFAULT_MAX_DIMENSION: u32 = 1200;

/// Supplies decoded, upright, size-bounded rasters for an image reference.
pub trait MediaSource: Send + Sync {
    fn load(&self, reference: &str) -> VisionResult<DynamicImage>;
}

/// Reads images from the local filesystem; references are paths.
#[derive(Debug, Clone)]
pub struct FileMedia {
    max_dimension: u32,
}

impl Default for FileMedia {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl FileMedia {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    fn decode(path: &Path) -> Result<DynamicImage> {
        let mut decoder = ImageReader::open(path)?
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut img = DynamicImage::from_decoder(decoder)?;
        img.apply_orientation(orientation);
        Ok(img)
    }
}

impl MediaSource for FileMedia {
    fn load(&self, reference: &str) -> VisionResult<DynamicImage> {
        let img = Self::decode(Path::new(reference)).map_err(|e| {
            log::warn!("failed to decode {}: {:#}", reference, e);
            VisionError::DecodeFailed(format!("{}: {:#}", reference, e))
        })?;
        Ok(bound_dimensions(img, self.max_dimension))
    }
}

/// Downsample, keeping aspect ratio, so neither side exceeds `max_dimension`.
pub fn bound_dimensions(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width.max(height) <= max_dimension {
        return img;
    }
    log::debug!(
        "downsampling {}x{} to fit {}px",
        width,
        height,
        max_dimension
    );
    img.resize(max_dimension, max_dimension, FilterType::Triangle)
}
