//! Transformer image processor.
//!
//! Reproduces the resize/crop/rescale/normalize steps described by a model's
//! `preprocessor_config.json`, so the tensor matches the configuration the
//! transformer was trained with.

use super::{ensure_not_empty, filter_from_pil_code, InputTensor, PreprocessError, Preprocessor};
use crate::decode::DecodedImage;
use image::imageops::{self, FilterType};
use serde::Deserialize;
use std::path::Path;

/// Target resolution as stored in processor configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProcessorSize {
    HeightWidth { height: u32, width: u32 },
    /// Aspect-preserving: the shorter side is scaled to this length
    ShortestEdge { shortest_edge: u32 },
    Square(u32),
}

impl ProcessorSize {
    /// (height, width) for sizes that name both sides
    pub fn fixed_height_width(&self) -> Option<(u32, u32)> {
        match *self {
            ProcessorSize::HeightWidth { height, width } => Some((height, width)),
            ProcessorSize::Square(side) => Some((side, side)),
            ProcessorSize::ShortestEdge { .. } => None,
        }
    }
}

/// Subset of a HuggingFace `preprocessor_config.json` used for inference
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageProcessorConfig {
    pub do_resize: bool,
    pub size: ProcessorSize,
    /// PIL resample code (2 = bilinear)
    pub resample: u8,
    pub do_center_crop: bool,
    pub crop_size: Option<ProcessorSize>,
    pub do_rescale: bool,
    pub rescale_factor: f32,
    pub do_normalize: bool,
    pub image_mean: Vec<f32>,
    pub image_std: Vec<f32>,
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: ProcessorSize::HeightWidth {
                height: 224,
                width: 224,
            },
            resample: 2,
            do_center_crop: false,
            crop_size: None,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: vec![0.5, 0.5, 0.5],
            image_std: vec![0.5, 0.5, 0.5],
        }
    }
}

impl ImageProcessorConfig {
    /// Load from a `preprocessor_config.json` file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read processor config {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse processor config {:?}", path))
    }
}

/// Resize step before the optional center crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resize {
    /// Stretch to exactly this size
    Exact { height: u32, width: u32 },
    /// Scale the shorter side to this length, keeping the aspect ratio
    ShortestEdge(u32),
}

impl Resize {
    /// (width, height) an image of the given size is resized to
    fn target(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            Resize::Exact { height, width } => (width, height),
            Resize::ShortestEdge(edge) => shortest_edge_dims(width, height, edge),
        }
    }
}

/// (width, height) after scaling the shorter side to `edge`.
///
/// The longer side is floored, as the HuggingFace processors do.
pub fn shortest_edge_dims(width: u32, height: u32, edge: u32) -> (u32, u32) {
    let scale_long = |long: u32, short: u32| {
        ((u64::from(long) * u64::from(edge)) / u64::from(short.max(1))).max(1) as u32
    };
    if width <= height {
        (edge, scale_long(height, width))
    } else {
        (scale_long(width, height), edge)
    }
}

/// Validated processor ready to turn images into `[1, 3, H, W]` tensors
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    height: u32,
    width: u32,
    resize: Resize,
    filter: Option<FilterType>,
    /// (height, width) of the center crop
    crop: Option<(u32, u32)>,
    scale: f32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageProcessor {
    /// Validate a processor configuration
    ///
    /// # Errors
    ///
    /// Returns [`PreprocessError::InvalidConfig`] when a size is zero, the
    /// resample code is unknown, a `shortest_edge` resize has no fixed crop,
    /// the crop does not fit the resized image, mean/std do not have 3
    /// entries, or any std is not strictly positive.
    pub fn new(config: &ImageProcessorConfig) -> Result<Self, PreprocessError> {
        let resize = match config.size {
            ProcessorSize::HeightWidth { height, width } => Resize::Exact { height, width },
            ProcessorSize::Square(side) => Resize::Exact {
                height: side,
                width: side,
            },
            ProcessorSize::ShortestEdge { shortest_edge } => Resize::ShortestEdge(shortest_edge),
        };
        let resize_is_empty = match resize {
            Resize::Exact { height, width } => height == 0 || width == 0,
            Resize::ShortestEdge(edge) => edge == 0,
        };
        if resize_is_empty {
            return Err(PreprocessError::InvalidConfig(format!(
                "Target size must be non-zero, got {:?}",
                config.size
            )));
        }

        let crop = if config.do_center_crop {
            let crop = config
                .crop_size
                .and_then(|size| size.fixed_height_width())
                .ok_or_else(|| {
                    PreprocessError::InvalidConfig(
                        "do_center_crop needs crop_size as {height, width} or an integer"
                            .to_string(),
                    )
                })?;
            if crop.0 == 0 || crop.1 == 0 {
                return Err(PreprocessError::InvalidConfig(format!(
                    "Crop size must be non-zero, got {}x{}",
                    crop.1, crop.0
                )));
            }
            Some(crop)
        } else {
            None
        };

        let (height, width) = match (crop, resize) {
            (Some(crop), _) => crop,
            (None, Resize::Exact { height, width }) => (height, width),
            (None, Resize::ShortestEdge(_)) => {
                return Err(PreprocessError::InvalidConfig(
                    "shortest_edge resizing keeps the aspect ratio; a fixed input needs do_center_crop with crop_size"
                        .to_string(),
                ))
            }
        };

        let filter = if config.do_resize {
            let fits = match resize {
                Resize::Exact {
                    height: resized_h,
                    width: resized_w,
                } => height <= resized_h && width <= resized_w,
                Resize::ShortestEdge(edge) => height <= edge && width <= edge,
            };
            if !fits {
                return Err(PreprocessError::InvalidConfig(format!(
                    "Crop {}x{} does not fit inside resize target {:?}",
                    width, height, config.size
                )));
            }
            Some(filter_from_pil_code(config.resample)?)
        } else {
            None
        };

        let scale = if config.do_rescale {
            if config.rescale_factor <= 0.0 || !config.rescale_factor.is_finite() {
                return Err(PreprocessError::InvalidConfig(format!(
                    "Rescale factor must be positive, got {}",
                    config.rescale_factor
                )));
            }
            config.rescale_factor
        } else {
            1.0
        };

        let (mean, std) = if config.do_normalize {
            let mean: [f32; 3] = config.image_mean.as_slice().try_into().map_err(|_| {
                PreprocessError::InvalidConfig(format!(
                    "image_mean must have 3 elements, got {}",
                    config.image_mean.len()
                ))
            })?;
            let std: [f32; 3] = config.image_std.as_slice().try_into().map_err(|_| {
                PreprocessError::InvalidConfig(format!(
                    "image_std must have 3 elements, got {}",
                    config.image_std.len()
                ))
            })?;
            if let Some((i, s)) = std.iter().enumerate().find(|(_, s)| **s <= 0.0) {
                return Err(PreprocessError::InvalidConfig(format!(
                    "image_std at index {} must be greater than 0, got {}",
                    i, s
                )));
            }
            (mean, std)
        } else {
            ([0.0; 3], [1.0; 3])
        };

        Ok(Self {
            height,
            width,
            resize,
            filter,
            crop,
            scale,
            mean,
            std,
        })
    }

    /// Expected (height, width) of the model input
    pub fn resolution(&self) -> (u32, u32) {
        (self.height, self.width)
    }
}

impl Preprocessor for ImageProcessor {
    fn input_shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }

    fn preprocess(&self, image: &DecodedImage) -> Result<InputTensor, PreprocessError> {
        ensure_not_empty(image)?;

        let rgb = image.as_dynamic().to_rgb8();
        let rgb = match self.filter {
            Some(filter) => {
                let (w, h) = self.resize.target(rgb.width(), rgb.height());
                if rgb.dimensions() == (w, h) {
                    rgb
                } else {
                    imageops::resize(&rgb, w, h, filter)
                }
            }
            None => rgb,
        };

        let rgb = match self.crop {
            Some((crop_h, crop_w)) if rgb.width() >= crop_w && rgb.height() >= crop_h => {
                let left = (rgb.width() - crop_w) / 2;
                let top = (rgb.height() - crop_h) / 2;
                imageops::crop_imm(&rgb, left, top, crop_w, crop_h).to_image()
            }
            _ => rgb,
        };

        // Only reachable with resizing disabled
        if rgb.dimensions() != (self.width, self.height) {
            return Err(PreprocessError::InvalidConfig(format!(
                "Image is {}x{} after resizing and cropping (model expects {}x{})",
                rgb.width(),
                rgb.height(),
                self.width,
                self.height
            )));
        }

        let tensor = InputTensor::from_shape_fn(self.input_shape(), |(_, c, y, x)| {
            let value = rgb.get_pixel(x as u32, y as u32).0[c] as f32 * self.scale;
            (value - self.mean[c]) / self.std[c]
        });

        Ok(tensor)
    }
}
