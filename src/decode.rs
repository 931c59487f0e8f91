//! Image payload decoding.
//!
//! Clients send images as base64 strings, optionally wrapped in a data URI
//! (`data:image/png;base64,<data>`). Decoding only materializes the pixels;
//! resizing and color conversion belong to the per-model preprocessors.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

/// Errors that can occur while decoding an image payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image payload is empty")]
    Empty,

    #[error("Cannot identify image data: {0}")]
    Image(#[from] image::ImageError),
}

/// An image decoded into memory, owned for the duration of one request
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    image: DynamicImage,
}

impl DecodedImage {
    /// Wrap an already decoded image
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Get the underlying pixel buffer
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of color channels (including alpha)
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Strip an optional data URI prefix.
///
/// Everything up to and including the first comma is dropped. The prefix is
/// not validated.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Decode a base64 image payload into an in-memory pixel buffer
pub fn decode(payload: &str) -> Result<DecodedImage, DecodeError> {
    let data = strip_data_uri(payload);

    // Line-wrapped base64 is common in data URIs
    let bytes = if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)?
    } else {
        STANDARD.decode(data)?
    };

    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let image = image::load_from_memory(&bytes)?;

    tracing::debug!(
        "Decoded image: {}x{} ({:?}, {} bytes)",
        image.width(),
        image.height(),
        image.color(),
        bytes.len()
    );

    Ok(DecodedImage::new(image))
}
