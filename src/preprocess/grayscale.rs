//! Grayscale 48x48 preprocessing for the compact CNN.
//!
//! The CNN was trained on FER-style inputs: single-channel luminance, 48x48,
//! scaled to `[0, 1]` and then shifted to `[-1, 1]`. Any deviation (another
//! luminance formula, another resize filter, other constants) silently degrades
//! accuracy, so every step here is fixed.

use super::{ensure_not_empty, InputTensor, PreprocessError, Preprocessor};
use crate::decode::DecodedImage;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

/// Side length of the square model input
pub const INPUT_SIZE: u32 = 48;

/// Resize filter used to reach [`INPUT_SIZE`] (bicubic, a = -0.5)
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Pixel scale applied before the signed rescale
const PIXEL_SCALE: f32 = 255.0;

/// ITU-R 601-2 luma in 16.16 fixed point, rounded.
///
/// Same integer transform as PIL's `convert("L")`, so it reproduces the
/// grayscale images the model was trained on exactly.
pub fn luma_601(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(u32::from);
    ((r * 19595 + g * 38470 + b * 7471 + 0x8000) >> 16) as u8
}

/// Convert any decoded image to single-channel luminance (alpha ignored)
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
        _ => {
            let rgb = image.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                Luma([luma_601(rgb.get_pixel(x, y).0)])
            })
        }
    }
}

/// Map an 8-bit pixel to the `[-1, 1]` range the CNN expects
#[inline]
pub fn signed_scale(pixel: u8) -> f32 {
    (pixel as f32 / PIXEL_SCALE - 0.5) * 2.0
}

/// Preprocessor for the compact CNN variant
#[derive(Debug, Clone, Default)]
pub struct GrayscalePreprocessor;

impl GrayscalePreprocessor {
    pub fn new() -> Self {
        Self
    }
}

impl Preprocessor for GrayscalePreprocessor {
    fn input_shape(&self) -> [usize; 4] {
        [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 1]
    }

    fn preprocess(&self, image: &DecodedImage) -> Result<InputTensor, PreprocessError> {
        ensure_not_empty(image)?;

        let gray = to_grayscale(image.as_dynamic());
        let resized = if gray.dimensions() == (INPUT_SIZE, INPUT_SIZE) {
            gray
        } else {
            imageops::resize(&gray, INPUT_SIZE, INPUT_SIZE, RESIZE_FILTER)
        };

        // NHWC with a single channel
        let data: Vec<f32> = resized.pixels().map(|p| signed_scale(p.0[0])).collect();
        Ok(InputTensor::from_shape_vec(self.input_shape(), data)?)
    }
}
