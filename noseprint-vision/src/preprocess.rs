use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::error::{VisionError, VisionResult};

/// Side length of the square input both nose models expect.
pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

const HALF_RANGE: f32 = 127.5;

/// Which model the tensor is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Raw 0..255 floats. The classifier rescales internally.
    Classifier,
    /// `(v - 127.5) / 127.5`, i.e. [-1, 1].
    Embedding,
}

impl Variant {
    #[inline]
    fn transform(self, v: u8) -> f32 {
        match self {
            Variant::Classifier => v as f32,
            Variant::Embedding => (v as f32 - HALF_RANGE) / HALF_RANGE,
        }
    }
}

/// Stretch `img` to 224x224 and lay it out as a `[1, 224, 224, 3]` tensor.
pub fn preprocess(img: &DynamicImage, variant: Variant) -> VisionResult<Array4<f32>> {
    to_nhwc(img, INPUT_SIZE, |v| variant.transform(v))
}

/// Bilinear resize to `size`x`size` ignoring aspect ratio, then NHWC layout
/// with `map` applied per channel value.
pub(crate) fn to_nhwc(
    img: &DynamicImage,
    size: u32,
    map: impl Fn(u8) -> f32,
) -> VisionResult<Array4<f32>> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::DecodeFailed(format!(
            "image has zero dimension ({}x{})",
            width, height
        )));
    }

    let resized = img
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    // RGB8 raw buffer is already row-major HWC
    let input_data: Vec<f32> = resized.as_raw().iter().map(|&v| map(v)).collect();

    Array4::from_shape_vec((1, size as usize, size as usize, CHANNELS), input_data)
        .map_err(|e| VisionError::DecodeFailed(format!("tensor shape: {}", e)))
}
