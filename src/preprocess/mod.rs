//! Per-model image preprocessing.
//!
//! The supported model families expect structurally different inputs, so each
//! one owns its preprocessor and there is no shared pipeline:
//!
//! - [`ImageProcessor`]: RGB, resized and mean/std normalized, `[1, 3, H, W]`
//! - [`GrayscalePreprocessor`]: 48x48 luminance scaled to `[-1, 1]`, `[1, 48, 48, 1]`

pub mod grayscale;
pub mod image_processor;

pub use grayscale::GrayscalePreprocessor;
pub use image_processor::{ImageProcessor, ImageProcessorConfig};

use crate::decode::DecodedImage;
use image::imageops::FilterType;
use ndarray::Array4;
use thiserror::Error;

/// A batched model input tensor (always batch size 1)
pub type InputTensor = Array4<f32>;

/// Errors that can occur while preparing an image for a model
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Invalid preprocessor configuration: {0}")]
    InvalidConfig(String),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Maps a decoded image to the exact tensor one model expects
pub trait Preprocessor: Send + Sync {
    /// Shape of the produced tensor
    fn input_shape(&self) -> [usize; 4];

    /// Build the input tensor for one image
    fn preprocess(&self, image: &DecodedImage) -> Result<InputTensor, PreprocessError>;
}

/// Reject images a resize cannot work with
pub(crate) fn ensure_not_empty(image: &DecodedImage) -> Result<(), PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }
    Ok(())
}

/// Map a PIL resample code (as stored in processor configs) to a resize filter
pub fn filter_from_pil_code(code: u8) -> Result<FilterType, PreprocessError> {
    match code {
        0 => Ok(FilterType::Nearest),
        1 => Ok(FilterType::Lanczos3),
        2 => Ok(FilterType::Triangle),
        3 => Ok(FilterType::CatmullRom),
        other => Err(PreprocessError::InvalidConfig(format!(
            "Unsupported resample filter code: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_filter_codes() {
        assert_eq!(filter_from_pil_code(0).unwrap(), FilterType::Nearest);
        assert_eq!(filter_from_pil_code(2).unwrap(), FilterType::Triangle);
        assert_eq!(filter_from_pil_code(3).unwrap(), FilterType::CatmullRom);
        assert!(matches!(
            filter_from_pil_code(4),
            Err(PreprocessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_image_rejected() {
        let image = DecodedImage::new(DynamicImage::ImageRgb8(RgbImage::new(0, 5)));
        assert!(matches!(
            ensure_not_empty(&image),
            Err(PreprocessError::EmptyImage { width: 0, height: 5 })
        ));
    }
}
